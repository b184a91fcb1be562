use super::{PolicyFuture, SharedPolicyFactory, layer_factory, send_next};
use crate::config::ExponentialRetryConfig;
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use http::StatusCode;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

/// Future returned by a [`DelayFn`]
pub type DelayFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Injectable sleep used between attempts
pub type DelayFn = Arc<dyn Fn(Duration) -> DelayFuture + Send + Sync>;

/// Error codes the system error policy never retries
const NON_RETRIABLE_CODES: [&str; 5] = [
    "ETIMEDOUT",
    "ESOCKETTIMEDOUT",
    "ECONNREFUSED",
    "ECONNRESET",
    "ENOENT",
];

/// `tokio::time::sleep` as a [`DelayFn`]
#[must_use]
pub fn tokio_delay() -> DelayFn {
    Arc::new(|duration: Duration| -> DelayFuture { Box::pin(tokio::time::sleep(duration)) })
}

/// Which failures a [`RetryLayer`] retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMode {
    /// Transport failures and 408/5xx responses other than 501 and 505
    Exponential,
    /// Transport failures only, except the codes in `NON_RETRIABLE_CODES`
    SystemError,
}

/// Status codes that count as a failed attempt for [`RetryMode::Exponential`]
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    let code = status.as_u16();
    (code >= 500 || code == 408) && code != 501 && code != 505
}

/// Delay before retry number `retry_count` (1-based)
///
/// The first retry waits exactly `initial_retry_delay`. Later retries wait
/// `initial + (2^retry_count - 1) * delta`, where `delta` is drawn from
/// `[0.8, 1.2] * initial` by `random` in `[0, 1)`, capped at `maximum_retry_delay`.
#[must_use]
pub fn next_retry_delay(config: &ExponentialRetryConfig, retry_count: u32, random: f64) -> Duration {
    // Anything beyond a day is a misconfiguration
    const MAX_DELAY_SECS: f64 = 86400.0;

    let initial = config.initial_retry_delay.as_secs_f64();
    let max = config.maximum_retry_delay.as_secs_f64().min(MAX_DELAY_SECS);
    if retry_count <= 1 {
        return Duration::from_secs_f64(initial.min(max));
    }

    let random = if random.is_finite() {
        random.clamp(0.0, 1.0)
    } else {
        0.5
    };
    let exponent = i32::try_from(retry_count).unwrap_or(i32::MAX);
    let delta = initial * 0.8 + random * initial * 0.4;
    let increment = (2f64.powi(exponent) - 1.0) * delta;
    let delay = initial + increment;

    let clamped = if delay.is_finite() {
        delay.min(max).max(0.0)
    } else {
        max
    };
    Duration::from_secs_f64(clamped)
}

/// Tower layer re-sending failed requests with capped exponential backoff
#[derive(Clone)]
pub struct RetryLayer {
    config: ExponentialRetryConfig,
    mode: RetryMode,
    delay: DelayFn,
}

impl RetryLayer {
    #[must_use]
    pub fn exponential(config: ExponentialRetryConfig) -> Self {
        Self {
            config,
            mode: RetryMode::Exponential,
            delay: tokio_delay(),
        }
    }

    #[must_use]
    pub fn system_error(config: ExponentialRetryConfig) -> Self {
        Self {
            config,
            mode: RetryMode::SystemError,
            delay: tokio_delay(),
        }
    }

    /// Replace the sleep between attempts, e.g. to record delays in tests
    #[must_use]
    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }
}

impl fmt::Debug for RetryLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryLayer")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
            mode: self.mode,
            delay: self.delay.clone(),
        }
    }
}

/// Service that implements the retry loop
///
/// Every attempt sends a fresh clone of the caller's request. Failed
/// transport attempts are wrapped in `RestError::Attempt`, each chaining the
/// previous one as its inner error. Aborted requests are never retried, and
/// errors that did not come from the exchange are returned unchanged.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: ExponentialRetryConfig,
    mode: RetryMode,
    delay: DelayFn,
}

impl<S> Service<WebResource> for RetryService<S>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = HttpOperationResponse;
    type Error = RestError;
    type Future = PolicyFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: WebResource) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        let mode = self.mode;
        let delay = self.delay.clone();

        Box::pin(async move {
            let maximum_attempts = config.maximum_attempts.max(1);
            let mut previous: Option<RestError> = None;
            let mut attempt: u32 = 0;

            loop {
                attempt += 1;
                match send_next(&inner, request.clone()).await {
                    Ok(response) => {
                        let failed = mode == RetryMode::Exponential
                            && is_retryable_status(response.status);
                        if !failed || attempt >= maximum_attempts || request.is_aborted() {
                            return Ok(response);
                        }
                        tracing::debug!(
                            retry = attempt,
                            status = response.status.as_u16(),
                            method = %request.method,
                            "Retrying request after status code"
                        );
                    }
                    Err(err) if err.is_aborted() || !err.is_transport_failure() => {
                        return Err(err);
                    }
                    Err(err) => {
                        let wrapped = RestError::Attempt {
                            attempt,
                            source: Box::new(err),
                            inner_error: previous.take().map(Box::new),
                        };
                        let retriable = match mode {
                            RetryMode::Exponential => true,
                            RetryMode::SystemError => wrapped
                                .code()
                                .is_none_or(|code| !NON_RETRIABLE_CODES.contains(&code)),
                        };
                        if !retriable || attempt >= maximum_attempts || request.is_aborted() {
                            return Err(wrapped);
                        }
                        tracing::debug!(
                            retry = attempt,
                            error = %wrapped,
                            method = %request.method,
                            "Retrying request after transport error"
                        );
                        previous = Some(wrapped);
                    }
                }

                let backoff = next_retry_delay(&config, attempt, rand::rng().random_range(0.0..1.0));
                tracing::debug!(
                    retry = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Waiting before next attempt"
                );
                delay(backoff).await;
            }
        })
    }
}

/// Factory for [`RetryLayer::exponential`]
#[must_use]
pub fn exponential_retry_policy(config: ExponentialRetryConfig) -> SharedPolicyFactory {
    layer_factory(RetryLayer::exponential(config))
}

/// Factory for [`RetryLayer::system_error`]
#[must_use]
pub fn system_error_retry_policy(config: ExponentialRetryConfig) -> SharedPolicyFactory {
    layer_factory(RetryLayer::system_error(config))
}
