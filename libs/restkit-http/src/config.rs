use std::time::Duration;

/// Product token sent when the caller does not configure a user agent
pub const DEFAULT_USER_AGENT: &str = concat!("restkit-http/", env!("CARGO_PKG_VERSION"));

/// Default header carrying the generated client request id
pub const DEFAULT_CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// User agent with the platform appended, e.g. `restkit-http/0.2.8 (linux; x86_64)`
#[must_use]
pub fn default_user_agent() -> String {
    format!(
        "{DEFAULT_USER_AGENT} ({}; {})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Exponential retry configuration
///
/// The first retry waits `initial_retry_delay`; later retries grow the delay
/// exponentially with jitter, capped at `maximum_retry_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialRetryConfig {
    /// Total attempts including the first one (default: 3)
    pub maximum_attempts: u32,
    /// Delay before the first retry (default: 30s)
    pub initial_retry_delay: Duration,
    /// Upper bound for any delay (default: 90s)
    pub maximum_retry_delay: Duration,
}

impl Default for ExponentialRetryConfig {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_retry_delay: Duration::from_secs(30),
            maximum_retry_delay: Duration::from_secs(90),
        }
    }
}

impl ExponentialRetryConfig {
    #[must_use]
    pub fn new(maximum_attempts: u32, initial_retry_delay: Duration) -> Self {
        Self {
            maximum_attempts,
            initial_retry_delay,
            ..Default::default()
        }
    }

    /// Millisecond delays for tests
    #[must_use]
    pub fn fast() -> Self {
        Self {
            maximum_attempts: 3,
            initial_retry_delay: Duration::from_millis(1),
            maximum_retry_delay: Duration::from_millis(20),
        }
    }

    #[must_use]
    pub fn with_maximum_retry_delay(mut self, delay: Duration) -> Self {
        self.maximum_retry_delay = delay;
        self
    }
}

/// Redirect following configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectConfig {
    /// Redirects to follow before returning the redirect response as-is
    /// (default: 20, `0` means no cap)
    pub maximum_redirections: usize,

    /// Strip `Authorization`, `Cookie` and `Proxy-Authorization` when the
    /// redirect leaves the original origin (default: true)
    pub strip_sensitive_headers: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            maximum_redirections: 20,
            strip_sensitive_headers: true,
        }
    }
}

impl RedirectConfig {
    #[must_use]
    pub fn with_maximum_redirections(maximum_redirections: usize) -> Self {
        Self {
            maximum_redirections,
            ..Default::default()
        }
    }
}

/// Resource provider auto-registration configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpRegistrationConfig {
    /// Wait between registration status polls (default: 30s)
    pub retry_timeout: Duration,

    /// Give up after this many status polls; `None` polls until registered
    pub max_polls: Option<usize>,
}

impl Default for RpRegistrationConfig {
    fn default() -> Self {
        Self {
            retry_timeout: Duration::from_secs(30),
            max_polls: None,
        }
    }
}

impl RpRegistrationConfig {
    #[must_use]
    pub fn with_max_polls(mut self, max_polls: usize) -> Self {
        self.max_polls = Some(max_polls);
        self
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP, for local mock servers
    AllowInsecureHttp,
}

/// Configuration of the default hyper transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperClientConfig {
    /// Timeout for requests that do not set their own (default: none)
    pub request_timeout: Option<Duration>,

    /// Close pooled connections idle for longer than this (default: 90s)
    pub pool_idle_timeout: Option<Duration>,

    /// Idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,

    pub tls_roots: TlsRootConfig,

    pub transport: TransportSecurity,
}

impl Default for HyperClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            tls_roots: TlsRootConfig::default(),
            transport: TransportSecurity::TlsOnly,
        }
    }
}

impl HyperClientConfig {
    /// Plain HTTP allowed and a short timeout, for tests against mock servers
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(10)),
            transport: TransportSecurity::AllowInsecureHttp,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn allow_insecure_http(mut self) -> Self {
        self.transport = TransportSecurity::AllowInsecureHttp;
        self
    }
}
