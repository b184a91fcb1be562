#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end policy chain behavior over in-memory transports

use async_trait::async_trait;
use http::{Method, StatusCode};
use restkit_http::policies::{
    DelayFn, DelayFuture, RetryAfterHandler, RetryLayer, redirect_policy, serialization_policy,
};
use restkit_http::restkit_spec::{
    CompositeTypeSpec, PropertySpec, SerializationOptions, TypeSpec, Value,
};
use restkit_http::{
    ExponentialRetryConfig, HttpClient, HttpHeaders, HttpOperationResponse, HttpPipeline,
    OperationArguments, OperationSpec, RedirectConfig, RequestBodySpec, RequestPolicyFactories,
    RestError, ServiceClient, ServiceClientOptions, SharedPolicyFactory, TokenCredentials,
    WebResource, layer_factory,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns the request body and content type unchanged
struct EchoClient;

#[async_trait]
impl HttpClient for EchoClient {
    async fn send_request(&self, request: WebResource) -> Result<HttpOperationResponse, RestError> {
        let body = request
            .body
            .as_ref()
            .map(restkit_http::RequestBody::to_bytes)
            .unwrap_or_default();
        let mut headers = HttpHeaders::new();
        if let Some(content_type) = request.headers.get("content-type") {
            headers.try_set("content-type", content_type)?;
        }
        Ok(HttpOperationResponse::buffered(
            request,
            StatusCode::OK,
            headers,
            body,
        ))
    }
}

/// Plays back canned responses in order, then keeps repeating the last one
struct ScriptedClient {
    script: Mutex<VecDeque<(StatusCode, Vec<(&'static str, String)>, &'static str)>>,
    seen: Mutex<Vec<WebResource>>,
}

impl ScriptedClient {
    fn new(script: Vec<(StatusCode, Vec<(&'static str, String)>, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn send_request(&self, request: WebResource) -> Result<HttpOperationResponse, RestError> {
        self.seen.lock().unwrap().push(request.clone());
        let (status, headers, body) = {
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        };
        let mut response_headers = HttpHeaders::new();
        for (name, value) in headers {
            response_headers.try_set(name, &value)?;
        }
        Ok(HttpOperationResponse::buffered(
            request,
            status,
            response_headers,
            body,
        ))
    }
}

/// Counts calls and always fails with the given system code
struct FailingClient {
    code: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpClient for FailingClient {
    async fn send_request(&self, _request: WebResource) -> Result<HttpOperationResponse, RestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RestError::transport_code("connection failed", self.code))
    }
}

fn recording_delay() -> (DelayFn, Arc<Mutex<Vec<Duration>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let delay: DelayFn = Arc::new(move |duration: Duration| -> DelayFuture {
        sink.lock().unwrap().push(duration);
        Box::pin(async {})
    });
    (delay, seen)
}

fn product_spec() -> TypeSpec {
    TypeSpec::composite(
        CompositeTypeSpec::new("Product")
            .with_property(
                "booleanProperty",
                PropertySpec::new(TypeSpec::Boolean).required(),
            )
            .with_property(
                "numberProperty",
                PropertySpec::new(TypeSpec::Number).required(),
            ),
    )
}

fn fast_options(client: Arc<dyn HttpClient>) -> ServiceClientOptions {
    ServiceClientOptions::default()
        .with_http_client(client)
        .with_exponential_retry(ExponentialRetryConfig::fast())
}

#[tokio::test]
async fn json_round_trip_through_echo_transport() {
    let client = ServiceClient::new(None, fast_options(Arc::new(EchoClient)))
        .unwrap()
        .with_base_url("https://example.com");
    let operation = Arc::new(
        OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()).required())
            .with_response_body(product_spec()),
    );
    let input = json!({"booleanProperty": false, "numberProperty": 20});
    let arguments = OperationArguments::new().with("body", input.clone());

    let response = client
        .send_operation_request(&arguments, operation)
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.deserialized_body, Some(Value::from(input)));
    assert!(
        response
            .request
            .headers
            .contains(restkit_http::DEFAULT_CLIENT_REQUEST_ID_HEADER)
    );
    assert!(
        response
            .request
            .headers
            .get("user-agent")
            .is_some_and(|ua| ua.starts_with("restkit-http/"))
    );
}

#[tokio::test]
async fn invalid_response_body_fails_without_retrying() {
    let transport = ScriptedClient::new(vec![(
        StatusCode::OK,
        vec![("content-type", "application/json".to_owned())],
        r#"{"booleanProperty":"nope","numberProperty":1}"#,
    )]);
    let client = ServiceClient::new(None, fast_options(transport.clone()))
        .unwrap()
        .with_base_url("https://example.com");
    let operation = Arc::new(
        OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()).required())
            .with_response_body(product_spec()),
    );
    let arguments = OperationArguments::new()
        .with("body", json!({"booleanProperty": true, "numberProperty": 1}));

    let err = client
        .send_operation_request(&arguments, operation)
        .await
        .unwrap_err();

    assert!(matches!(err, RestError::Serialization(_)), "got {err:?}");
    assert_eq!(
        err.to_string(),
        "Property responseBody.booleanProperty with value \"nope\" must be a boolean."
    );
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn invalid_request_body_never_reaches_the_transport() {
    let transport = ScriptedClient::new(vec![(StatusCode::OK, vec![], "")]);
    let client = ServiceClient::new(None, fast_options(transport.clone()))
        .unwrap()
        .with_base_url("https://example.com");
    let operation = Arc::new(
        OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()).required()),
    );
    let arguments = OperationArguments::new()
        .with("body", json!({"booleanProperty": "yes", "numberProperty": 1}));

    let err = client
        .send_operation_request(&arguments, operation)
        .await
        .unwrap_err();

    assert!(matches!(err, RestError::Serialization(_)), "got {err:?}");
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn server_errors_are_attempted_three_times_with_growing_delays() {
    let transport = ScriptedClient::new(vec![(StatusCode::SERVICE_UNAVAILABLE, vec![], "")]);
    let (delay, delays) = recording_delay();
    let config = ExponentialRetryConfig::new(3, Duration::from_secs(1))
        .with_maximum_retry_delay(Duration::from_secs(60));
    let pipeline = HttpPipeline::new(
        vec![layer_factory(RetryLayer::exponential(config).with_delay(delay))],
        transport.clone(),
    );

    let response = pipeline
        .send(WebResource::get("https://example.com/flaky").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(transport.calls(), 3);
    let delays = delays.lock().unwrap();
    assert_eq!(delays.len(), 2);
    assert_eq!(delays[0], Duration::from_secs(1));
    let second = delays[1].as_secs_f64();
    assert!((3.4 - 1e-6..=4.6 + 1e-6).contains(&second), "second delay was {second}");
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let transport = ScriptedClient::new(vec![(StatusCode::NOT_FOUND, vec![], "")]);
    let client = ServiceClient::new(None, fast_options(transport.clone())).unwrap();
    let response = client
        .send_request(WebResource::get("https://example.com/missing").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn recovers_after_transient_failure() {
    let transport = ScriptedClient::new(vec![
        (StatusCode::INTERNAL_SERVER_ERROR, vec![], ""),
        (StatusCode::OK, vec![], "{}"),
    ]);
    let client = ServiceClient::new(None, fast_options(transport.clone())).unwrap();
    let response = client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn connection_refused_is_retried_by_exponential_policy_only() {
    let transport = Arc::new(FailingClient {
        code: "ECONNREFUSED",
        calls: AtomicUsize::new(0),
    });
    let client = ServiceClient::new(None, fast_options(transport.clone())).unwrap();
    let err = client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap_err();

    // the system error policy sits inside and does not retry ECONNREFUSED
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    assert_eq!(err.code(), Some("ECONNREFUSED"));
    assert!(err.inner_error().is_some());
}

#[tokio::test]
async fn redirect_cap_returns_last_redirect_response() {
    let location = |path: &str| vec![("location", path.to_owned())];
    let transport = ScriptedClient::new(vec![
        (StatusCode::MULTIPLE_CHOICES, location("/one"), ""),
        (StatusCode::MULTIPLE_CHOICES, location("/two"), ""),
        (StatusCode::OK, vec![], ""),
    ]);
    let pipeline = HttpPipeline::new(
        vec![redirect_policy(RedirectConfig::with_maximum_redirections(1))],
        transport.clone(),
    );
    let response = pipeline
        .send(WebResource::get("https://example.com/start").unwrap())
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::MULTIPLE_CHOICES);
    assert_eq!(response.location(), Some("/two"));
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn throttled_request_is_resent_after_retry_after() {
    let transport = ScriptedClient::new(vec![
        (
            StatusCode::TOO_MANY_REQUESTS,
            vec![("retry-after", "3".to_owned())],
            "",
        ),
        (StatusCode::OK, vec![], ""),
    ]);
    let (delay, delays) = recording_delay();
    let options = fast_options(transport.clone())
        .without_retries()
        .with_throttling(Arc::new(RetryAfterHandler::new().with_delay(delay)));
    let client = ServiceClient::new(None, options).unwrap();

    let response = client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(*delays.lock().unwrap(), vec![Duration::from_secs(3)]);
}

#[tokio::test]
async fn default_throttling_rejects_when_enabled() {
    let transport = ScriptedClient::new(vec![(StatusCode::TOO_MANY_REQUESTS, vec![], "")]);
    let options = fast_options(transport)
        .without_retries()
        .with_throttling(Arc::new(restkit_http::policies::RejectThrottled));
    let client = ServiceClient::new(None, options).unwrap();
    let err = client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RestError::Throttled { retry_after: None }));
}

#[tokio::test]
async fn credentials_sign_every_attempt() {
    let transport = ScriptedClient::new(vec![
        (StatusCode::BAD_GATEWAY, vec![], ""),
        (StatusCode::OK, vec![], ""),
    ]);
    let credentials = Arc::new(TokenCredentials::new("secret-token").unwrap());
    let client = ServiceClient::new(Some(credentials), fast_options(transport.clone())).unwrap();
    client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap();

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    for request in seen.iter() {
        assert_eq!(
            request.headers.get("authorization"),
            Some("Bearer secret-token")
        );
    }
}

#[tokio::test]
async fn log_sink_receives_request_and_response() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let writer = lines.clone();
    let options = fast_options(Arc::new(EchoClient)).with_log_sink(Arc::new(move |line: &str| {
        writer.lock().unwrap().push(line.to_owned());
    }));
    let client = ServiceClient::new(None, options).unwrap();
    client
        .send_request(
            WebResource::post("https://example.com/items")
                .unwrap()
                .with_text("hello"),
        )
        .await
        .unwrap();

    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], ">> Request: POST https://example.com/items");
    assert_eq!(lines[1], ">> Response status code: 200");
    assert_eq!(lines[2], ">> Body: hello");
}

#[tokio::test]
async fn custom_factories_replace_the_defaults() {
    let transport = ScriptedClient::new(vec![(StatusCode::SERVICE_UNAVAILABLE, vec![], "")]);
    let options = fast_options(transport.clone()).with_request_policy_factories(
        RequestPolicyFactories::Replace(vec![serialization_policy(
            SerializationOptions::lenient(),
        )]),
    );
    let client = ServiceClient::new(None, options).unwrap();
    let response = client
        .send_request(WebResource::get("https://example.com/").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(transport.calls(), 1);
    assert!(!transport.seen.lock().unwrap()[0].headers.contains("user-agent"));
}

#[tokio::test]
async fn customize_hook_sees_default_list() {
    let seen_len = Arc::new(AtomicUsize::new(0));
    let recorder = seen_len.clone();
    let options = fast_options(Arc::new(EchoClient)).with_request_policy_factories(
        RequestPolicyFactories::Customize(Arc::new(
            move |factories: Vec<SharedPolicyFactory>| -> Vec<SharedPolicyFactory> {
                recorder.store(factories.len(), Ordering::SeqCst);
                factories
            },
        )),
    );
    ServiceClient::new(None, options).unwrap();
    assert_eq!(seen_len.load(Ordering::SeqCst), 7);
}
