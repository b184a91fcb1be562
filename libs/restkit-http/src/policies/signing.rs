use super::{PolicyFuture, SharedPolicyFactory, layer_factory, send_next};
use crate::credentials::ServiceClientCredentials;
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer handing every request to the credentials before sending it
#[derive(Clone)]
pub struct SigningLayer {
    credentials: Arc<dyn ServiceClientCredentials>,
}

impl SigningLayer {
    #[must_use]
    pub fn new(credentials: Arc<dyn ServiceClientCredentials>) -> Self {
        Self { credentials }
    }
}

impl fmt::Debug for SigningLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for SigningLayer {
    type Service = SigningService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SigningService {
            inner,
            credentials: self.credentials.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SigningService<S> {
    inner: S,
    credentials: Arc<dyn ServiceClientCredentials>,
}

impl<S> Service<WebResource> for SigningService<S>
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
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let credentials = self.credentials.clone();

        Box::pin(async move {
            let signed = credentials.sign_request(request).await?;
            send_next(&inner, signed).await
        })
    }
}

/// Factory for [`SigningLayer`]
#[must_use]
pub fn signing_policy(credentials: Arc<dyn ServiceClientCredentials>) -> SharedPolicyFactory {
    layer_factory(SigningLayer::new(credentials))
}
