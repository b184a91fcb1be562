//! Credentials that sign outgoing requests

use crate::error::RestError;
use crate::web_resource::WebResource;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use std::fmt;

/// Signs a request before it leaves the pipeline
///
/// Called once per attempt by the signing policy, so implementations that
/// refresh tokens see every retry.
#[async_trait]
pub trait ServiceClientCredentials: Send + Sync {
    /// Return the signed request
    async fn sign_request(&self, request: WebResource) -> Result<WebResource, RestError>;
}

fn signing_error(message: &str) -> RestError {
    RestError::Signing(message.into())
}

fn authorization(value: &str) -> Result<HeaderValue, RestError> {
    let mut value = HeaderValue::from_str(value)?;
    value.set_sensitive(true);
    Ok(value)
}

/// `Authorization: <scheme> <token>`
#[derive(Clone)]
pub struct TokenCredentials {
    token: String,
    scheme: String,
}

impl TokenCredentials {
    pub const DEFAULT_SCHEME: &'static str = "Bearer";

    /// # Errors
    /// Returns `RestError::Signing` if `token` is empty.
    pub fn new(token: impl Into<String>) -> Result<Self, RestError> {
        Self::with_scheme(token, Self::DEFAULT_SCHEME)
    }

    /// # Errors
    /// Returns `RestError::Signing` if `token` is empty.
    pub fn with_scheme(
        token: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Result<Self, RestError> {
        let token = token.into();
        if token.is_empty() {
            return Err(signing_error("token cannot be empty"));
        }
        Ok(Self {
            token,
            scheme: scheme.into(),
        })
    }
}

impl fmt::Debug for TokenCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCredentials")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServiceClientCredentials for TokenCredentials {
    async fn sign_request(&self, mut request: WebResource) -> Result<WebResource, RestError> {
        let value = authorization(&format!("{} {}", self.scheme, self.token))?;
        request.headers.set(AUTHORIZATION, value);
        Ok(request)
    }
}

/// `Authorization: Basic base64(user:password)`
#[derive(Clone)]
pub struct BasicAuthenticationCredentials {
    user_name: String,
    password: String,
}

impl BasicAuthenticationCredentials {
    #[must_use]
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicAuthenticationCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthenticationCredentials")
            .field("user_name", &self.user_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServiceClientCredentials for BasicAuthenticationCredentials {
    async fn sign_request(&self, mut request: WebResource) -> Result<WebResource, RestError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.user_name, self.password));
        request
            .headers
            .set(AUTHORIZATION, authorization(&format!("Basic {encoded}"))?);
        Ok(request)
    }
}

/// Fixed API keys sent as headers and/or query parameters
#[derive(Clone, Default)]
pub struct ApiKeyCredentials {
    headers: Vec<(HeaderName, HeaderValue)>,
    query: Vec<(String, String)>,
}

impl ApiKeyCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns an error if `name` or `value` is not a valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, RestError> {
        let mut value = HeaderValue::from_str(value)?;
        value.set_sensitive(true);
        self.headers.push((HeaderName::try_from(name)?, value));
        Ok(self)
    }

    #[must_use]
    pub fn with_query_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

impl fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();
        let query: Vec<&str> = self.query.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("ApiKeyCredentials")
            .field("headers", &headers)
            .field("query", &query)
            .finish()
    }
}

#[async_trait]
impl ServiceClientCredentials for ApiKeyCredentials {
    async fn sign_request(&self, mut request: WebResource) -> Result<WebResource, RestError> {
        if self.headers.is_empty() && self.query.is_empty() {
            return Err(signing_error(
                "at least one header or query parameter is required",
            ));
        }
        for (name, value) in &self.headers {
            request.headers.set(name.clone(), value.clone());
        }
        if !self.query.is_empty() {
            let mut pairs = request.url.query_pairs_mut();
            for (name, value) in &self.query {
                pairs.append_pair(name, value);
            }
        }
        Ok(request)
    }
}
