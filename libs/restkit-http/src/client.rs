use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use async_trait::async_trait;
use std::sync::Arc;

/// Transport capability at the bottom of every policy chain
///
/// Implementations own the connection handling. They must honor the
/// request's abort signal and timeout, and report progress when the
/// request asks for it.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Send `request` and return the response with its body still unread
    /// unless the transport chose to buffer it.
    async fn send_request(&self, request: WebResource) -> Result<HttpOperationResponse, RestError>;
}

#[async_trait]
impl<T> HttpClient for Arc<T>
where
    T: HttpClient + ?Sized,
{
    async fn send_request(&self, request: WebResource) -> Result<HttpOperationResponse, RestError> {
        (**self).send_request(request).await
    }
}
