use super::{PolicyFuture, SharedPolicyFactory, layer_factory};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use http::HeaderValue;
use http::header::HeaderName;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Tower layer stamping a fresh UUID into the client request id header
#[derive(Clone, Debug)]
pub struct RequestIdLayer {
    header_name: HeaderName,
}

impl RequestIdLayer {
    #[must_use]
    pub fn new(header_name: HeaderName) -> Self {
        Self { header_name }
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService {
            inner,
            header_name: self.header_name.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RequestIdService<S> {
    inner: S,
    header_name: HeaderName,
}

impl<S> Service<WebResource> for RequestIdService<S>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError>,
    S::Future: Send + 'static,
{
    type Response = HttpOperationResponse;
    type Error = RestError;
    type Future = PolicyFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: WebResource) -> Self::Future {
        let id = Uuid::new_v4().hyphenated().to_string();
        match HeaderValue::from_str(&id) {
            Ok(value) => {
                request.headers.set(self.header_name.clone(), value);
                Box::pin(self.inner.call(request))
            }
            Err(e) => Box::pin(std::future::ready(Err(RestError::from(e)))),
        }
    }
}

/// Factory for [`RequestIdLayer`]
#[must_use]
pub fn generate_client_request_id_policy(header_name: HeaderName) -> SharedPolicyFactory {
    layer_factory(RequestIdLayer::new(header_name))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::headers::HttpHeaders;
    use http::StatusCode;
    use tower::ServiceExt;
    use tower::service_fn;

    async fn echo(request: WebResource) -> Result<HttpOperationResponse, RestError> {
        Ok(HttpOperationResponse::buffered(
            request,
            StatusCode::OK,
            HttpHeaders::new(),
            "",
        ))
    }

    #[tokio::test]
    async fn test_stamps_fresh_id_every_call() {
        let name = HeaderName::from_static("x-ms-client-request-id");
        let service = RequestIdLayer::new(name).layer(service_fn(echo));

        let request = WebResource::get("https://example.com/")
            .unwrap()
            .try_with_header("x-ms-client-request-id", "caller-chosen")
            .unwrap();
        let first = service.clone().oneshot(request.clone()).await.unwrap();
        let second = service.oneshot(request).await.unwrap();

        let first_id = first.request.headers.get("x-ms-client-request-id").unwrap();
        let second_id = second.request.headers.get("x-ms-client-request-id").unwrap();
        assert_ne!(first_id, "caller-chosen");
        assert_ne!(first_id, second_id);
        assert!(Uuid::try_parse(first_id).is_ok());
    }
}
