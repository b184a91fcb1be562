#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Default hyper transport against a local mock server

use httpmock::prelude::*;
use restkit_http::restkit_spec::{CompositeTypeSpec, PropertySpec, TypeSpec, Value};
use restkit_http::{
    HttpClient, HyperClientConfig, HyperHttpClient, OperationArguments, OperationSpec,
    RequestBodySpec, ResponseBody, RestError, ServiceClient, ServiceClientOptions,
    TransferProgress, WebResource,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn transport() -> HyperHttpClient {
    HyperHttpClient::new(HyperClientConfig::for_testing()).unwrap()
}

#[tokio::test]
async fn get_returns_status_headers_and_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/pets/1");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "rex"}));
    });

    let request = WebResource::get(&server.url("/pets/1")).unwrap();
    let mut response = transport().send_request(request).await.unwrap();

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(
        response.body_as_json().await.unwrap(),
        Value::from(json!({"name": "rex"}))
    );
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn value_bodies_are_sent_as_json() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/pets")
            .header("content-type", "application/json; charset=utf-8")
            .json_body(json!({"name": "rex"}));
        then.status(201);
    });

    let request = WebResource::post(&server.url("/pets"))
        .unwrap()
        .with_value(json!({"name": "rex"}));
    let response = transport().send_request(request).await.unwrap();
    assert_eq!(response.status_code(), 201);
    assert_eq!(mock.calls(), 1);
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).delay(Duration::from_millis(500));
    });

    let request = WebResource::get(&server.url("/slow"))
        .unwrap()
        .with_timeout(Duration::from_millis(50));
    let err = transport().send_request(request).await.unwrap_err();
    assert!(matches!(err, RestError::Timeout(_)));
    assert_eq!(err.code(), Some("ETIMEDOUT"));
}

#[tokio::test]
async fn abort_signal_cancels_in_flight_request() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).delay(Duration::from_millis(500));
    });

    let token = CancellationToken::new();
    let request = WebResource::get(&server.url("/slow"))
        .unwrap()
        .with_abort_signal(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = transport().send_request(request).await.unwrap_err();
    canceller.await.unwrap();
    assert!(err.is_aborted());
}

#[tokio::test]
async fn download_progress_reaches_content_length() {
    let payload = "x".repeat(4096);
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/blob");
        then.status(200).body(payload.clone());
    });

    let events: Arc<Mutex<Vec<TransferProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = events.clone();
    let request = WebResource::get(&server.url("/blob"))
        .unwrap()
        .with_download_progress(Arc::new(move |progress| {
            recorder.lock().unwrap().push(progress);
        }));
    let response = transport().send_request(request).await.unwrap();
    assert_eq!(response.buffered_body().map(bytes::Bytes::len), Some(4096));

    let events = events.lock().unwrap();
    let last = events.last().copied().unwrap();
    assert_eq!(last.loaded_bytes, 4096);
    assert_eq!(last.total_bytes, Some(4096));
}

#[tokio::test]
async fn streamed_response_is_left_unread() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/stream");
        then.status(200).body("chunked payload");
    });

    let request = WebResource::get(&server.url("/stream"))
        .unwrap()
        .with_streamed_response(true);
    let mut response = transport().send_request(request).await.unwrap();
    assert!(matches!(response.take_body(), ResponseBody::Streaming(_)));
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let request = WebResource::get("http://127.0.0.1:1/").unwrap();
    let err = transport().send_request(request).await.unwrap_err();
    assert!(matches!(err, RestError::Transport { .. }));
}

#[tokio::test]
async fn service_client_round_trip_over_http() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(PUT)
            .path("/pets/rex")
            .query_param("api-version", "2024-01-01")
            .header_exists("x-ms-client-request-id")
            .json_body(json!({"name": "rex", "age": 3}));
        then.status(200)
            .header("content-type", "application/json")
            .json_body(json!({"name": "rex", "age": 3}));
    });

    let pet = TypeSpec::composite(
        CompositeTypeSpec::new("Pet")
            .with_property("name", PropertySpec::new(TypeSpec::String).required())
            .with_property("age", PropertySpec::new(TypeSpec::Number)),
    );
    let operation = Arc::new(
        OperationSpec::new(http::Method::PUT, "/pets/{name}")
            .with_url_parameter(
                restkit_http::OperationParameter::new("name", TypeSpec::String).required(),
            )
            .with_query_parameter(
                restkit_http::OperationParameter::new("apiVersion", TypeSpec::String)
                    .serialized_name("api-version")
                    .required(),
            )
            .with_request_body(RequestBodySpec::new(pet.clone()).required())
            .with_response_body(pet),
    );
    let client = ServiceClient::new(
        None,
        ServiceClientOptions::default().with_transport(HyperClientConfig::for_testing()),
    )
    .unwrap()
    .with_base_url(server.base_url());

    let arguments = OperationArguments::new()
        .with("name", "rex")
        .with("apiVersion", "2024-01-01")
        .with("body", json!({"name": "rex", "age": 3}));
    let response = client
        .send_operation_request(&arguments, operation)
        .await
        .unwrap();

    assert_eq!(response.status_code(), 200);
    assert_eq!(
        response.deserialized_body,
        Some(Value::from(json!({"name": "rex", "age": 3})))
    );
    assert_eq!(mock.calls(), 1);
}
