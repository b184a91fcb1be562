use super::{PolicyFuture, SharedPolicyFactory, layer_factory, send_next};
use crate::config::RedirectConfig;
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use http::{Method, header};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use url::Url;

/// Headers removed when a redirect leaves the original origin
const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// Compare scheme, host and port, filling in the scheme's default port
fn is_same_origin(original: &Url, target: &Url) -> bool {
    original.scheme() == target.scheme()
        && original.host_str() == target.host_str()
        && original.port_or_known_default() == target.port_or_known_default()
}

/// Whether `status` with the current method is followed at all
fn is_followed(status: u16, method: &Method) -> bool {
    status == 300 || status == 307 || (status == 303 && method == Method::POST)
}

/// Tower layer following `Location` redirects
///
/// Follows 300 and 307 responses, and 303 responses to POST (re-sent as a
/// bodiless GET). Any other response, or hitting the redirect cap, ends the
/// loop and returns the last response untouched.
#[derive(Clone, Debug, Default)]
pub struct RedirectLayer {
    config: RedirectConfig,
}

impl RedirectLayer {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RedirectLayer {
    type Service = RedirectService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RedirectService {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RedirectService<S> {
    inner: S,
    config: RedirectConfig,
}

impl<S> Service<WebResource> for RedirectService<S>
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
        let config = self.config.clone();

        Box::pin(async move {
            let mut redirects: usize = 0;
            let mut response = send_next(&inner, request).await?;

            loop {
                let status = response.status.as_u16();
                let Some(location) = response.location() else {
                    return Ok(response);
                };
                if !is_followed(status, &response.request.method) {
                    return Ok(response);
                }
                if config.maximum_redirections != 0 && redirects >= config.maximum_redirections {
                    tracing::debug!(
                        redirects = redirects,
                        max_redirections = config.maximum_redirections,
                        "Redirect limit reached"
                    );
                    return Ok(response);
                }

                let current = &response.request;
                let target = current
                    .url
                    .join(location)
                    .map_err(|e| RestError::invalid_url(location, e))?;

                let mut next = current.clone().with_url(target);
                if status == 303 {
                    next.method = Method::GET;
                    next.body = None;
                }
                if config.strip_sensitive_headers && !is_same_origin(&current.url, &next.url) {
                    for header_name in SENSITIVE_HEADERS {
                        if next.headers.remove(header_name.as_str()).is_some() {
                            tracing::debug!(
                                header = %header_name,
                                "Stripped sensitive header on cross-origin redirect"
                            );
                        }
                    }
                }

                redirects += 1;
                tracing::debug!(
                    status = status,
                    redirect = redirects,
                    target_host = next.url.host_str().unwrap_or(""),
                    "Following redirect"
                );
                response = send_next(&inner, next).await?;
            }
        })
    }
}

/// Factory for [`RedirectLayer`]
#[must_use]
pub fn redirect_policy(config: RedirectConfig) -> SharedPolicyFactory {
    layer_factory(RedirectLayer::new(config))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::headers::HttpHeaders;
    use http::StatusCode;
    use std::sync::{Arc, Mutex};
    use tower::{ServiceExt, service_fn};

    /// Answers with `status` and `Location: /step{n+1}` while `n < hops`
    fn redirecting(
        status: StatusCode,
        hops: usize,
        seen: Arc<Mutex<Vec<WebResource>>>,
    ) -> impl Service<WebResource, Response = HttpOperationResponse, Error = RestError, Future = PolicyFuture>
    + Clone
    + Send
    + 'static {
        service_fn(move |request: WebResource| -> PolicyFuture {
            let n = {
                let mut seen = seen.lock().unwrap();
                seen.push(request.clone());
                seen.len()
            };
            Box::pin(async move {
                let mut headers = HttpHeaders::new();
                let status = if n <= hops {
                    headers.try_set("location", &format!("/step{n}")).unwrap();
                    status
                } else {
                    StatusCode::OK
                };
                Ok(HttpOperationResponse::buffered(request, status, headers, ""))
            })
        })
    }

    fn request() -> WebResource {
        WebResource::post("https://example.com/start")
            .unwrap()
            .try_with_header("authorization", "Bearer secret")
            .unwrap()
            .with_text("payload")
    }

    #[tokio::test]
    async fn test_cap_returns_second_response_with_location() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RedirectLayer::new(RedirectConfig::with_maximum_redirections(1))
            .layer(redirecting(StatusCode::MULTIPLE_CHOICES, 3, seen.clone()));
        let response = service.oneshot(request()).await.unwrap();

        assert_eq!(response.status, StatusCode::MULTIPLE_CHOICES);
        assert_eq!(response.location(), Some("/step2"));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(response.request.url.path(), "/step1");
    }

    #[tokio::test]
    async fn test_zero_cap_follows_to_the_end() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RedirectLayer::new(RedirectConfig::with_maximum_redirections(0))
            .layer(redirecting(StatusCode::TEMPORARY_REDIRECT, 3, seen.clone()));
        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(seen.lock().unwrap().len(), 4);
        // 307 keeps method and body
        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.method, Method::POST);
        assert!(last.body.is_some());
    }

    #[tokio::test]
    async fn test_see_other_after_post_becomes_get() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RedirectLayer::default()
            .layer(redirecting(StatusCode::SEE_OTHER, 1, seen.clone()));
        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.request.method, Method::GET);
        assert!(response.request.body.is_none());
        // same origin keeps credentials
        assert!(response.request.headers.contains("authorization"));
    }

    #[tokio::test]
    async fn test_see_other_after_get_is_not_followed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RedirectLayer::default()
            .layer(redirecting(StatusCode::SEE_OTHER, 1, seen.clone()));
        let get = WebResource::get("https://example.com/start").unwrap();
        let response = service.oneshot(get).await.unwrap();
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_redirect_codes_are_not_followed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = RedirectLayer::default()
            .layer(redirecting(StatusCode::MOVED_PERMANENTLY, 1, seen.clone()));
        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn test_cross_origin_strips_credentials() {
        let inner = service_fn(|request: WebResource| -> PolicyFuture {
            Box::pin(async move {
                let mut headers = HttpHeaders::new();
                let status = if request.url.host_str() == Some("example.com") {
                    headers
                        .try_set("location", "https://cdn.example.net/blob")
                        .unwrap();
                    StatusCode::TEMPORARY_REDIRECT
                } else {
                    StatusCode::OK
                };
                Ok(HttpOperationResponse::buffered(request, status, headers, ""))
            })
        });
        let service = RedirectLayer::default().layer(inner);
        let response = service.oneshot(request()).await.unwrap();
        assert_eq!(response.request.url.as_str(), "https://cdn.example.net/blob");
        assert!(!response.request.headers.contains("authorization"));
    }

    #[test]
    fn test_same_origin_uses_default_ports() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com:443/b").unwrap();
        let c = Url::parse("http://example.com/a").unwrap();
        assert!(is_same_origin(&a, &b));
        assert!(!is_same_origin(&a, &c));
    }
}
