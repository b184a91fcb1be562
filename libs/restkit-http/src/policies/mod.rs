//! Request policies and the factories that assemble them into a chain
//!
//! Every policy is a tower `Layer`/`Service` pair over [`WebResource`] →
//! [`HttpOperationResponse`]. A [`RequestPolicyFactory`] turns the next
//! service of the chain into a new outer service; the pipeline applies the
//! factories innermost-first for every send, so no policy state is shared
//! between concurrent requests.

mod log;
mod redirect;
mod request_id;
mod retry;
mod rp_registration;
mod serialization;
mod signing;
mod throttling;
mod user_agent;

pub use log::{LogLayer, LogService, log_policy};
pub use redirect::{RedirectLayer, RedirectService, redirect_policy};
pub use request_id::{RequestIdLayer, RequestIdService, generate_client_request_id_policy};
pub use retry::{
    DelayFn, DelayFuture, RetryLayer, RetryMode, RetryService, exponential_retry_policy, is_retryable_status,
    next_retry_delay, system_error_retry_policy, tokio_delay,
};
pub use rp_registration::{RpRegistrationLayer, RpRegistrationService, rp_registration_policy};
pub use serialization::{SerializationLayer, SerializationService, serialization_policy};
pub use signing::{SigningLayer, SigningService, signing_policy};
pub use throttling::{
    RejectThrottled, RetryAfterHandler, ThrottlingHandler, ThrottlingLayer, ThrottlingService,
    throttling_retry_policy,
};
pub use user_agent::{UserAgentLayer, UserAgentService, user_agent_policy};

use crate::client::HttpClient;
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use restkit_spec::LogSink;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::{BoxCloneService, Oneshot};
use tower::{Layer, Service, ServiceExt};

/// Type-erased link of the policy chain
pub type PolicyService = BoxCloneService<WebResource, HttpOperationResponse, RestError>;

/// Future returned by the policy services
pub type PolicyFuture =
    Pin<Box<dyn Future<Output = Result<HttpOperationResponse, RestError>> + Send>>;

/// Shared handle to a policy factory
pub type SharedPolicyFactory = Arc<dyn RequestPolicyFactory>;

/// Options handed to every factory when a chain is built
#[derive(Clone, Default)]
pub struct RequestPolicyOptions {
    /// Pipeline-wide log sink; policies fall back to `tracing` without one
    pub log: Option<LogSink>,
}

impl RequestPolicyOptions {
    #[must_use]
    pub fn with_log(log: LogSink) -> Self {
        Self { log: Some(log) }
    }
}

impl fmt::Debug for RequestPolicyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPolicyOptions")
            .field("log", &self.log.is_some())
            .finish()
    }
}

/// Builds one policy around the next service of the chain
///
/// Closures of the shape `Fn(PolicyService, &RequestPolicyOptions) -> PolicyService`
/// implement this trait, which is how third-party middleware is plugged in.
pub trait RequestPolicyFactory: Send + Sync {
    fn create(&self, next: PolicyService, options: &RequestPolicyOptions) -> PolicyService;
}

impl<F> RequestPolicyFactory for F
where
    F: Fn(PolicyService, &RequestPolicyOptions) -> PolicyService + Send + Sync,
{
    fn create(&self, next: PolicyService, options: &RequestPolicyOptions) -> PolicyService {
        self(next, options)
    }
}

/// Factory applying a tower layer
#[derive(Clone)]
pub struct LayerFactory<L> {
    layer: L,
}

impl<L> RequestPolicyFactory for LayerFactory<L>
where
    L: Layer<PolicyService> + Send + Sync,
    L::Service: Service<WebResource, Response = HttpOperationResponse, Error = RestError>
        + Clone
        + Send
        + 'static,
    <L::Service as Service<WebResource>>::Future: Send + 'static,
{
    fn create(&self, next: PolicyService, _options: &RequestPolicyOptions) -> PolicyService {
        BoxCloneService::new(self.layer.layer(next))
    }
}

/// Wrap any policy layer as a shareable factory
pub fn layer_factory<L>(layer: L) -> SharedPolicyFactory
where
    L: Layer<PolicyService> + Send + Sync + 'static,
    L::Service: Service<WebResource, Response = HttpOperationResponse, Error = RestError>
        + Clone
        + Send
        + 'static,
    <L::Service as Service<WebResource>>::Future: Send + 'static,
{
    Arc::new(LayerFactory { layer })
}

/// Innermost link: hands the request to the transport
#[derive(Clone)]
pub struct TransportService {
    client: Arc<dyn HttpClient>,
}

impl TransportService {
    #[must_use]
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

impl Service<WebResource> for TransportService {
    type Response = HttpOperationResponse;
    type Error = RestError;
    type Future = PolicyFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: WebResource) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move { client.send_request(request).await })
    }
}

/// Send one request through a fresh clone of `inner`
///
/// Policies that call the next link more than once go through this so every
/// call gets its own readiness check. The returned future owns its clone.
pub(crate) fn send_next<S>(inner: &S, request: WebResource) -> Oneshot<S, WebResource>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError> + Clone,
{
    inner.clone().oneshot(request)
}

/// Send `message` to the sink, or to `tracing` at info level
pub(crate) fn emit(sink: Option<&LogSink>, message: &str) {
    match sink {
        Some(sink) => sink(message),
        None => tracing::info!(target: "restkit_http::log", "{message}"),
    }
}
