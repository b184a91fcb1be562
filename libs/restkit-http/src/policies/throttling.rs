use super::{
    DelayFn, PolicyFuture, PolicyService, SharedPolicyFactory, layer_factory, send_next,
    tokio_delay,
};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use async_trait::async_trait;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneService;
use tower::{Layer, Service};

/// Decides what happens to a `429 Too Many Requests` response
#[async_trait]
pub trait ThrottlingHandler: Send + Sync {
    /// `next` is the rest of the chain; `response` is the 429 it produced
    async fn handle(
        &self,
        next: PolicyService,
        response: HttpOperationResponse,
    ) -> Result<HttpOperationResponse, RestError>;
}

/// Fails with [`RestError::Throttled`]
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectThrottled;

#[async_trait]
impl ThrottlingHandler for RejectThrottled {
    async fn handle(
        &self,
        _next: PolicyService,
        response: HttpOperationResponse,
    ) -> Result<HttpOperationResponse, RestError> {
        Err(RestError::Throttled {
            retry_after: response.retry_after(),
        })
    }
}

/// Waits for `Retry-After` and resends the request once
///
/// Responses without a usable `Retry-After` header are returned as they are.
#[derive(Clone)]
pub struct RetryAfterHandler {
    delay: DelayFn,
}

impl RetryAfterHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            delay: tokio_delay(),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for RetryAfterHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RetryAfterHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAfterHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl ThrottlingHandler for RetryAfterHandler {
    async fn handle(
        &self,
        next: PolicyService,
        response: HttpOperationResponse,
    ) -> Result<HttpOperationResponse, RestError> {
        let Some(wait) = response.retry_after() else {
            return Ok(response);
        };
        tracing::debug!(
            retry_after_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "Throttled, waiting before resending"
        );
        (self.delay)(wait).await;
        send_next(&next, response.request).await
    }
}

/// Tower layer routing 429 responses to a [`ThrottlingHandler`]
#[derive(Clone)]
pub struct ThrottlingLayer {
    handler: Arc<dyn ThrottlingHandler>,
}

impl ThrottlingLayer {
    #[must_use]
    pub fn new(handler: Arc<dyn ThrottlingHandler>) -> Self {
        Self { handler }
    }
}

impl Default for ThrottlingLayer {
    fn default() -> Self {
        Self::new(Arc::new(RejectThrottled))
    }
}

impl fmt::Debug for ThrottlingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottlingLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for ThrottlingLayer {
    type Service = ThrottlingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottlingService {
            inner,
            handler: self.handler.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ThrottlingService<S> {
    inner: S,
    handler: Arc<dyn ThrottlingHandler>,
}

impl<S> Service<WebResource> for ThrottlingService<S>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = HttpOperationResponse;
    type Error = RestError;
    type Future = PolicyFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: WebResource) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let handler = self.handler.clone();

        Box::pin(async move {
            let response = send_next(&inner, request).await?;
            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            handler.handle(BoxCloneService::new(inner), response).await
        })
    }
}

/// Factory for [`ThrottlingLayer`]; `None` installs [`RejectThrottled`]
#[must_use]
pub fn throttling_retry_policy(handler: Option<Arc<dyn ThrottlingHandler>>) -> SharedPolicyFactory {
    layer_factory(handler.map_or_else(ThrottlingLayer::default, ThrottlingLayer::new))
}
