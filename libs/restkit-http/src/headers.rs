use crate::error::RestError;
use http::header::{HeaderMap, HeaderName, HeaderValue};

/// Case-insensitive header collection carried by requests and responses
///
/// Setting a header replaces every previous value under that name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    inner: HeaderMap,
}

impl HttpHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value of `name`
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.insert(name, value);
    }

    /// Parse `name` and `value`, then replace the header
    ///
    /// # Errors
    /// Returns `RestError::InvalidHeaderName` or `RestError::InvalidHeaderValue`
    /// when either part is not valid on the wire.
    pub fn try_set(&mut self, name: &str, value: &str) -> Result<(), RestError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.inner.insert(name, value);
        Ok(())
    }

    /// Header value as text; `None` if absent or not visible ASCII
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        self.inner.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.inner.iter()
    }

    #[must_use]
    pub fn raw(&self) -> &HeaderMap {
        &self.inner
    }

    pub fn raw_mut(&mut self) -> &mut HeaderMap {
        &mut self.inner
    }

    #[must_use]
    pub fn into_inner(self) -> HeaderMap {
        self.inner
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HeaderMap> for HttpHeaders {
    fn from(inner: HeaderMap) -> Self {
        Self { inner }
    }
}

impl<'a> IntoIterator for &'a HttpHeaders {
    type Item = (&'a HeaderName, &'a HeaderValue);
    type IntoIter = http::header::Iter<'a, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
