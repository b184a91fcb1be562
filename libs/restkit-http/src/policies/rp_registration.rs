//! Automatic resource provider registration
//!
//! Some management APIs answer `409 MissingSubscriptionRegistration` until the
//! subscription is registered with the resource provider that owns the
//! resource. This policy registers the provider, waits until the registration
//! is reported as complete, and replays the original request once.

use super::{DelayFn, PolicyFuture, SharedPolicyFactory, layer_factory, send_next, tokio_delay};
use crate::config::{DEFAULT_CLIENT_REQUEST_ID_HEADER, RpRegistrationConfig};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Method, StatusCode};
use regex::Regex;
use restkit_spec::Value;
use std::fmt;
use std::sync::LazyLock;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};
use url::Url;
use uuid::Uuid;

const MISSING_REGISTRATION_CODE: &str = "MissingSubscriptionRegistration";
const REGISTRATION_API_VERSION: &str = "2016-02-01";

#[allow(clippy::expect_used)] // literal pattern, compiled once
static PROVIDER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*'(.*)'").expect("provider name regex is valid"));
#[allow(clippy::expect_used)] // literal pattern, compiled once
static SUBSCRIPTION_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*/subscriptions/[a-f0-9-]+/").expect("subscription prefix regex is valid")
});

/// Provider name from a `MissingSubscriptionRegistration` error body
fn missing_registration_provider(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    if error.get("code")?.as_str()? != MISSING_REGISTRATION_CODE {
        return None;
    }
    let message = error.get("message")?.as_str()?;
    let captures = PROVIDER_NAME.captures(message)?;
    Some(captures.get(1)?.as_str().to_owned())
}

/// `https://host/subscriptions/<id>/` prefix of a request URL
fn subscription_prefix(url: &Url) -> Option<&str> {
    SUBSCRIPTION_PREFIX
        .find(url.as_str())
        .map(|found| found.as_str())
}

/// Clone of the original request retargeted at `url`, with a fresh request id
fn registration_request(
    original: &WebResource,
    method: Method,
    url: &str,
) -> Result<WebResource, RestError> {
    let url = Url::parse(url).map_err(|e| RestError::invalid_url(url, e))?;
    let mut request = original.clone().with_method(method).with_url(url);
    request.body = None;
    request.operation_spec = None;
    request.headers.set(
        HeaderName::from_static(DEFAULT_CLIENT_REQUEST_ID_HEADER),
        HeaderValue::from_str(&Uuid::new_v4().to_string())?,
    );
    request.headers.set(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    Ok(request)
}

/// Tower layer registering missing resource providers on 409 responses
#[derive(Clone)]
pub struct RpRegistrationLayer {
    config: RpRegistrationConfig,
    delay: DelayFn,
}

impl RpRegistrationLayer {
    #[must_use]
    pub fn new(config: RpRegistrationConfig) -> Self {
        Self {
            config,
            delay: tokio_delay(),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: DelayFn) -> Self {
        self.delay = delay;
        self
    }
}

impl fmt::Debug for RpRegistrationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpRegistrationLayer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for RpRegistrationLayer {
    type Service = RpRegistrationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RpRegistrationService {
            inner,
            config: self.config.clone(),
            delay: self.delay.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RpRegistrationService<S> {
    inner: S,
    config: RpRegistrationConfig,
    delay: DelayFn,
}

impl<S> RpRegistrationService<S>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    /// Register `provider` and poll until it reports `Registered`
    async fn register(
        mut inner: S,
        config: &RpRegistrationConfig,
        delay: &DelayFn,
        original: &WebResource,
        prefix: &str,
        provider: &str,
    ) -> Result<bool, RestError> {
        let register_url =
            format!("{prefix}providers/{provider}/register?api-version={REGISTRATION_API_VERSION}");
        let status_url = format!("{prefix}providers/{provider}?api-version={REGISTRATION_API_VERSION}");

        let response = inner
            .ready()
            .await?
            .call(registration_request(original, Method::POST, &register_url)?)
            .await?;
        if response.status != StatusCode::OK {
            tracing::debug!(
                provider = provider,
                status = response.status.as_u16(),
                "Autoregistration of resource provider failed"
            );
            return Ok(false);
        }

        let mut polls: usize = 0;
        loop {
            let mut status = inner
                .ready()
                .await?
                .call(registration_request(original, Method::GET, &status_url)?)
                .await?;
            let state = status.body_as_json().await?;
            if state.get("registrationState").and_then(Value::as_str) == Some("Registered") {
                tracing::debug!(provider = provider, polls = polls + 1, "Resource provider registered");
                return Ok(true);
            }

            polls += 1;
            if config.max_polls.is_some_and(|max| polls >= max) {
                tracing::warn!(
                    provider = provider,
                    polls = polls,
                    "Resource provider still not registered, giving up"
                );
                return Ok(false);
            }
            delay(config.retry_timeout).await;
        }
    }
}

impl<S> Service<WebResource> for RpRegistrationService<S>
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
        let delay = self.delay.clone();

        Box::pin(async move {
            let mut response = send_next(&inner, request.clone()).await?;
            if response.status != StatusCode::CONFLICT {
                return Ok(response);
            }

            let Ok(body) = response.body_as_text().await else {
                return Ok(response);
            };
            let Some(provider) = missing_registration_provider(&body) else {
                return Ok(response);
            };
            let Some(prefix) = subscription_prefix(&request.url) else {
                tracing::debug!(
                    provider = %provider,
                    "Unable to extract subscription id from request URL"
                );
                return Ok(response);
            };

            match Self::register(inner.clone(), &config, &delay, &request, prefix, &provider).await {
                Ok(true) => {
                    let mut retry = request.clone();
                    let id = HeaderValue::from_str(&Uuid::new_v4().to_string())?;
                    retry
                        .headers
                        .set(HeaderName::from_static(DEFAULT_CLIENT_REQUEST_ID_HEADER), id);
                    send_next(&inner, retry).await
                }
                Ok(false) => Ok(response),
                Err(err) => {
                    tracing::debug!(
                        provider = %provider,
                        error = %err,
                        "Resource provider registration failed"
                    );
                    Ok(response)
                }
            }
        })
    }
}

/// Factory for [`RpRegistrationLayer`]
#[must_use]
pub fn rp_registration_policy(config: RpRegistrationConfig) -> SharedPolicyFactory {
    layer_factory(RpRegistrationLayer::new(config))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::headers::HttpHeaders;
    use crate::policies::DelayFuture;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tower::{ServiceExt, service_fn};

    const RESOURCE_URL: &str = "https://management.example.com/subscriptions/\
        1a2b3c4d-0000-1111-2222-333344445555/resourceGroups/rg/providers/Microsoft.Storage/\
        storageAccounts/acct?api-version=2019-06-01";

    const CONFLICT_BODY: &str = r#"{"error":{"code":"MissingSubscriptionRegistration","message":"The subscription is not registered to use namespace 'Microsoft.Storage'."}}"#;

    fn no_delay() -> DelayFn {
        Arc::new(|_: Duration| -> DelayFuture { Box::pin(async {}) })
    }

    /// Fake management endpoint; registration completes after `pending_polls`
    fn management(
        pending_polls: usize,
        log: Arc<Mutex<Vec<(Method, String)>>>,
    ) -> impl Service<WebResource, Response = HttpOperationResponse, Error = RestError, Future = PolicyFuture>
    + Clone
    + Send
    + 'static {
        let polls = Arc::new(AtomicUsize::new(0));
        let registered = Arc::new(AtomicBool::new(false));
        service_fn(move |request: WebResource| -> PolicyFuture {
            log.lock()
                .unwrap()
                .push((request.method.clone(), request.url.to_string()));
            let polls = polls.clone();
            let registered = registered.clone();
            Box::pin(async move {
                let path = request.url.path().to_owned();
                let (status, body) = if path.ends_with("/register") {
                    (StatusCode::OK, "{}".to_owned())
                } else if path.ends_with("/providers/Microsoft.Storage") {
                    let n = polls.fetch_add(1, Ordering::SeqCst);
                    let state = if n < pending_polls {
                        "Registering"
                    } else {
                        registered.store(true, Ordering::SeqCst);
                        "Registered"
                    };
                    (StatusCode::OK, format!(r#"{{"registrationState":"{state}"}}"#))
                } else if registered.load(Ordering::SeqCst) {
                    (StatusCode::OK, r#"{"name":"acct"}"#.to_owned())
                } else {
                    (StatusCode::CONFLICT, CONFLICT_BODY.to_owned())
                };
                Ok(HttpOperationResponse::buffered(
                    request,
                    status,
                    HttpHeaders::new(),
                    body,
                ))
            })
        })
    }

    #[test]
    fn test_static_patterns_compile() {
        assert!(PROVIDER_NAME.is_match("provider 'Microsoft.Compute'"));
        assert!(SUBSCRIPTION_PREFIX.is_match("https://host/subscriptions/00ff-ab/rest"));
    }

    #[test]
    fn test_provider_name_extraction() {
        assert_eq!(
            missing_registration_provider(CONFLICT_BODY).as_deref(),
            Some("Microsoft.Storage")
        );
        assert_eq!(
            missing_registration_provider(r#"{"error":{"code":"Conflict","message":"'x'"}}"#),
            None
        );
        assert_eq!(missing_registration_provider("not json"), None);
    }

    #[test]
    fn test_subscription_prefix() {
        let url = Url::parse(RESOURCE_URL).unwrap();
        assert_eq!(
            subscription_prefix(&url),
            Some("https://management.example.com/subscriptions/1a2b3c4d-0000-1111-2222-333344445555/")
        );
        let other = Url::parse("https://example.com/things/1").unwrap();
        assert_eq!(subscription_prefix(&other), None);
    }

    #[tokio::test]
    async fn test_registers_polls_and_replays_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = RpRegistrationLayer::new(RpRegistrationConfig::default())
            .with_delay(no_delay())
            .layer(management(2, log.clone()));
        let request = WebResource::get(RESOURCE_URL).unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let calls = log.lock().unwrap();
        let methods: Vec<&Method> = calls.iter().map(|(method, _)| method).collect();
        // original, register, three polls, replay
        assert_eq!(methods.len(), 6);
        assert_eq!(*methods[1], Method::POST);
        assert!(calls[1].1.ends_with("/providers/Microsoft.Storage/register?api-version=2016-02-01"));
        assert!(response.request.headers.contains(DEFAULT_CLIENT_REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn test_poll_cap_returns_original_conflict() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let service = RpRegistrationLayer::new(RpRegistrationConfig::default().with_max_polls(2))
            .with_delay(no_delay())
            .layer(management(10, log.clone()));
        let mut response = service
            .oneshot(WebResource::get(RESOURCE_URL).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CONFLICT);
        assert_eq!(response.body_as_text().await.unwrap(), CONFLICT_BODY);
        // original, register, two polls
        assert_eq!(log.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_registration_failure_is_swallowed() {
        let inner = service_fn(|request: WebResource| -> PolicyFuture {
            Box::pin(async move {
                if request.url.path().ends_with("/register") {
                    return Err(RestError::transport_code("reset", "ECONNRESET"));
                }
                Ok(HttpOperationResponse::buffered(
                    request,
                    StatusCode::CONFLICT,
                    HttpHeaders::new(),
                    CONFLICT_BODY,
                ))
            })
        });
        let service = RpRegistrationLayer::new(RpRegistrationConfig::default())
            .with_delay(no_delay())
            .layer(inner);
        let response = service
            .oneshot(WebResource::get(RESOURCE_URL).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_other_conflicts_pass_through() {
        let inner = service_fn(|request: WebResource| -> PolicyFuture {
            Box::pin(async move {
                Ok(HttpOperationResponse::buffered(
                    request,
                    StatusCode::CONFLICT,
                    HttpHeaders::new(),
                    r#"{"error":{"code":"Conflict","message":"busy"}}"#,
                ))
            })
        });
        let service = RpRegistrationLayer::new(RpRegistrationConfig::default()).layer(inner);
        let response = service
            .oneshot(WebResource::get(RESOURCE_URL).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::CONFLICT);
    }
}
