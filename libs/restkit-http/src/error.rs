use restkit_spec::SerializationError;
use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Boxed error used for sources the pipeline does not interpret
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors surfaced by the policy pipeline and the transports
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RestError {
    /// Payload failed spec validation, or the spec itself is broken
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// URL could not be parsed or resolved
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Operation arguments do not fit the operation spec
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Transport failure, with the system error code when one is known
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        code: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// TLS configuration error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Single request attempt timed out in the transport
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The request's abort signal fired
    #[error("The request was aborted")]
    Aborted,

    /// A retried request failed; `inner_error` holds the previous attempt's failure
    #[error("Request failed after {attempt} attempt(s): {source}")]
    Attempt {
        attempt: u32,
        #[source]
        source: Box<RestError>,
        inner_error: Option<Box<RestError>>,
    },

    /// Server answered 429 and the throttling handler gave up
    #[error("Request throttled by the server (retry after {retry_after:?})")]
    Throttled { retry_after: Option<Duration> },

    /// Credentials failed to sign the request
    #[error("Request signing failed: {0}")]
    Signing(#[source] BoxError),

    /// Response body could not be read
    #[error("Failed to read response body: {0}")]
    Body(#[source] BoxError),
}

impl RestError {
    /// Transport error carrying the system code found in `err`'s source chain
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        let source = err.into();
        let code = io_error_code(source.as_ref()).map(str::to_owned);
        Self::Transport {
            message: error_chain_message(source.as_ref()),
            code,
            source: Some(source),
        }
    }

    /// Transport error with an explicit system code, e.g. `ECONNRESET`
    pub fn transport_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            code: Some(code.into()),
            source: None,
        }
    }

    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    /// System error code of the underlying failure, looking through retry wrappers
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transport { code, .. } => code.as_deref(),
            Self::Timeout(_) => Some("ETIMEDOUT"),
            Self::Attempt { source, .. } => source.code(),
            _ => None,
        }
    }

    /// True when the failure came from the request's abort signal
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        match self {
            Self::Aborted => true,
            Self::Attempt { source, .. } => source.is_aborted(),
            _ => false,
        }
    }

    /// True for failures of the exchange itself, which the retry policies may retry
    ///
    /// Validation, configuration and signing errors are not transport failures.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout(_) | Self::Body(_) => true,
            Self::Attempt { source, .. } => source.is_transport_failure(),
            _ => false,
        }
    }

    /// Failure of the previous attempt, if this error wraps a retried request
    #[must_use]
    pub fn inner_error(&self) -> Option<&RestError> {
        match self {
            Self::Attempt { inner_error, .. } => inner_error.as_deref(),
            _ => None,
        }
    }
}

impl From<hyper::Error> for RestError {
    fn from(err: hyper::Error) -> Self {
        RestError::transport(err)
    }
}

impl From<hyper_util::client::legacy::Error> for RestError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        RestError::transport(err)
    }
}

/// Node-style system error code for an I/O failure kind
#[must_use]
pub fn system_error_code(kind: std::io::ErrorKind) -> Option<&'static str> {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::ConnectionReset => Some("ECONNRESET"),
        ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        ErrorKind::NotFound => Some("ENOENT"),
        ErrorKind::BrokenPipe => Some("EPIPE"),
        ErrorKind::NotConnected => Some("ENOTCONN"),
        ErrorKind::AddrInUse => Some("EADDRINUSE"),
        ErrorKind::AddrNotAvailable => Some("EADDRNOTAVAIL"),
        ErrorKind::PermissionDenied => Some("EACCES"),
        _ => None,
    }
}

fn io_error_code(err: &(dyn StdError + 'static)) -> Option<&'static str> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return system_error_code(io.kind());
        }
        current = err.source();
    }
    None
}

fn error_chain_message(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut current = err.source();
    while let Some(err) = current {
        parts.push(err.to_string());
        current = err.source();
    }
    parts.join(": ")
}
