use std::fmt;

/// Location of a value inside the structure being (de)serialized
///
/// Tracks the logical field names (`path`) and the wire names
/// (`serialized_path`) side by side. The two diverge when a property is
/// renamed or flattened. Paths are immutable; extending one returns a new
/// instance. They only feed diagnostics and never take part in equality of
/// data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyPath {
    path: Vec<String>,
    serialized_path: Vec<String>,
}

impl PropertyPath {
    /// Create a path; the serialized path defaults to the logical one
    #[must_use]
    pub fn new(path: Vec<String>, serialized_path: Option<Vec<String>>) -> Self {
        let serialized_path = serialized_path.unwrap_or_else(|| path.clone());
        Self {
            path,
            serialized_path,
        }
    }

    /// Empty path used for top-level values
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path whose logical and serialized segments are identical
    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(segments.into_iter().map(Into::into).collect(), None)
    }

    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    #[must_use]
    pub fn serialized_path(&self) -> &[String] {
        &self.serialized_path
    }

    /// Extend by one property; `serialized_name` defaults to `name`
    #[must_use]
    pub fn concat(&self, name: &str, serialized_name: Option<&str>) -> Self {
        let mut path = self.path.clone();
        path.push(name.to_owned());
        let mut serialized_path = self.serialized_path.clone();
        serialized_path.push(serialized_name.unwrap_or(name).to_owned());
        Self {
            path,
            serialized_path,
        }
    }

    /// Extend by one property whose wire name is a dotted (flattened) name
    ///
    /// The serialized path grows by every segment of `serialized_name`.
    #[must_use]
    pub fn path_string_concat(&self, name: &str, serialized_name: &str) -> Self {
        let mut path = self.path.clone();
        path.push(name.to_owned());
        let mut serialized_path = self.serialized_path.clone();
        serialized_path.extend(split_serialized_name(serialized_name));
        Self {
            path,
            serialized_path,
        }
    }

    /// Wire-side rendering, segments joined by `.`
    #[must_use]
    pub fn serialized_string(&self) -> String {
        self.serialized_path.join(".")
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path.join("."))
    }
}

/// Split a flattened wire name on `.`
///
/// A segment ending in `\` escapes the dot that follows it, so `a\.b.c`
/// yields `["a.b", "c"]`.
#[must_use]
pub fn split_serialized_name(name: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut partial = String::new();
    for word in name.split('.') {
        if let Some(stripped) = word.strip_suffix('\\') {
            partial.push_str(stripped);
            partial.push('.');
        } else {
            partial.push_str(word);
            segments.push(std::mem::take(&mut partial));
        }
    }
    if !partial.is_empty() {
        segments.push(partial);
    }
    segments
}
