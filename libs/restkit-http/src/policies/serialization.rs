//! Request and response payload conversion through the operation's type specs

use super::{PolicyFuture, SharedPolicyFactory, layer_factory, send_next};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::{OperationSpec, RequestBody, RequestBodySpec, WebResource};
use http::header::{CONTENT_TYPE, HeaderValue};
use restkit_spec::xml::{parse_xml, stringify_xml};
use restkit_spec::{Map, PropertyPath, SerializationOptions, TypeSpec, Value};
use std::task::{Context, Poll};
use tower::{Layer, Service};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Serialize the request body of `request` in place
fn serialize_request(
    request: &mut WebResource,
    operation: &OperationSpec,
    body_spec: &RequestBodySpec,
    options: &SerializationOptions,
) -> Result<(), RestError> {
    let is_xml = operation.is_xml || options.is_xml();
    let value = match &request.body {
        Some(RequestBody::Value(value)) if !value.is_null() => Some(value.clone()),
        // text and raw bytes are already in wire form
        Some(RequestBody::Text(_) | RequestBody::Bytes(_)) => return Ok(()),
        Some(RequestBody::Value(_)) | None => None,
    };
    let Some(value) = value else {
        if body_spec.required {
            return Err(RestError::invalid_operation(format!(
                "{} cannot be null or undefined.",
                body_spec.parameter_name
            )));
        }
        request.body = None;
        return Ok(());
    };

    let path = PropertyPath::from_segments([body_spec.parameter_name.as_str()]);
    let spec_options = if is_xml {
        options.clone().xml()
    } else {
        options.clone()
    };
    let serialized = body_spec.spec.serialize(&path, &value, &spec_options)?;

    let body = if let Value::Stream(bytes) = serialized {
        RequestBody::Bytes(bytes)
    } else if is_xml {
        let root_name = body_spec
            .xml_name
            .as_deref()
            .unwrap_or(&body_spec.parameter_name);
        let document = if matches!(body_spec.spec, TypeSpec::Sequence(_)) {
            let Some(element_name) = body_spec.xml_element_name.as_deref() else {
                return Err(RestError::invalid_operation(format!(
                    "{} is an XML root list and needs an xml_element_name.",
                    body_spec.parameter_name
                )));
            };
            let mut wrapper = Map::new();
            wrapper.insert(element_name.to_owned(), serialized);
            stringify_xml(&Value::Object(wrapper), root_name)?
        } else {
            stringify_xml(&serialized, root_name)?
        };
        RequestBody::text(document)
    } else {
        RequestBody::text(serialized.to_json().to_string())
    };
    request.body = Some(body);

    if !request.headers.contains(CONTENT_TYPE.as_str()) {
        let content_type = match operation.content_type.as_deref() {
            Some(content_type) => HeaderValue::from_str(content_type)?,
            None if is_xml => HeaderValue::from_static(XML_CONTENT_TYPE),
            None => HeaderValue::from_static(JSON_CONTENT_TYPE),
        };
        request.headers.set(CONTENT_TYPE, content_type);
    }
    Ok(())
}

/// Parse and deserialize the response body against the operation's response spec
async fn deserialize_response(
    response: &mut HttpOperationResponse,
    operation: &OperationSpec,
    response_spec: &TypeSpec,
    options: &SerializationOptions,
) -> Result<(), RestError> {
    // streamed payloads are handed to the caller untouched
    if matches!(response_spec, TypeSpec::Stream) {
        return Ok(());
    }
    let text = response.body_as_text().await?;
    if text.trim().is_empty() {
        return Ok(());
    }

    let is_xml = match response.content_type() {
        Some(content_type) => content_type.to_ascii_lowercase().contains("xml"),
        None => operation.is_xml,
    };
    let success = response.status.is_success();

    let parsed = if is_xml {
        parse_xml(&text).map_err(RestError::from)
    } else {
        serde_json::from_str::<serde_json::Value>(&text)
            .map(Value::from)
            .map_err(RestError::from)
    };
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(err) if success => return Err(err),
        Err(err) => {
            tracing::debug!(
                status = response.status.as_u16(),
                error = %err,
                "Error response body could not be parsed"
            );
            return Ok(());
        }
    };

    if success {
        let spec_options = if is_xml {
            options.clone().xml()
        } else {
            options.clone()
        };
        let wire = match (&parsed, response_spec) {
            // root lists arrive wrapped in their element name
            (Value::Object(object), TypeSpec::Sequence(_)) if is_xml && object.len() == 1 => {
                object.values().next().cloned().unwrap_or_default()
            }
            _ => parsed.clone(),
        };
        let deserialized = response_spec.deserialize(
            &PropertyPath::from_segments(["responseBody"]),
            &wire,
            &spec_options,
        )?;
        response.deserialized_body = Some(deserialized);
    }
    response.parsed_body = Some(parsed);
    Ok(())
}

/// Tower layer converting payloads through the request's [`OperationSpec`]
///
/// Requests without an operation spec pass through untouched.
#[derive(Clone, Debug, Default)]
pub struct SerializationLayer {
    options: SerializationOptions,
}

impl SerializationLayer {
    #[must_use]
    pub fn new(options: SerializationOptions) -> Self {
        Self { options }
    }
}

impl<S> Layer<S> for SerializationLayer {
    type Service = SerializationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SerializationService {
            inner,
            options: self.options.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SerializationService<S> {
    inner: S,
    options: SerializationOptions,
}

impl<S> Service<WebResource> for SerializationService<S>
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

    fn call(&mut self, mut request: WebResource) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let options = self.options.clone();

        Box::pin(async move {
            let Some(operation) = request.operation_spec.clone() else {
                return send_next(&inner, request).await;
            };
            if let Some(body_spec) = &operation.request_body {
                serialize_request(&mut request, &operation, body_spec, &options)?;
            }

            let mut response = send_next(&inner, request).await?;
            if let Some(response_spec) = &operation.response_body {
                deserialize_response(&mut response, &operation, response_spec, &options).await?;
            }
            Ok(response)
        })
    }
}

/// Factory for [`SerializationLayer`]
#[must_use]
pub fn serialization_policy(options: SerializationOptions) -> SharedPolicyFactory {
    layer_factory(SerializationLayer::new(options))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::headers::HttpHeaders;
    use crate::web_resource::RequestBodySpec;
    use http::{Method, StatusCode};
    use restkit_spec::{CompositeTypeSpec, PropertySpec};
    use serde_json::json;
    use std::sync::Arc;
    use tower::{ServiceExt, service_fn};

    /// Answers with the request body and content type it received
    async fn echo(request: WebResource) -> Result<HttpOperationResponse, RestError> {
        let body = request.body.as_ref().map(RequestBody::to_bytes).unwrap_or_default();
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

    fn operation(spec: OperationSpec) -> WebResource {
        WebResource::post("https://example.com/products")
            .unwrap()
            .with_operation_spec(Arc::new(spec))
    }

    #[tokio::test]
    async fn test_json_round_trip_through_echo() {
        let spec = OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()).required())
            .with_response_body(product_spec());
        let input = Value::from(json!({"booleanProperty": false, "numberProperty": 20}));
        let request = operation(spec).with_value(input.clone());

        let service = SerializationLayer::new(SerializationOptions::strict()).layer(service_fn(echo));
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.deserialized_body, Some(input.clone()));
        assert_eq!(response.parsed_body, Some(input));
        assert_eq!(
            response.request.headers.get("content-type"),
            Some(JSON_CONTENT_TYPE)
        );
    }

    #[tokio::test]
    async fn test_strict_request_validation_fails_before_sending() {
        let spec = OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()));
        let request = operation(spec).with_value(json!({"booleanProperty": "no", "numberProperty": 1}));
        let service = SerializationLayer::new(SerializationOptions::strict()).layer(service_fn(echo));
        let err = service.oneshot(request).await.unwrap_err();
        assert!(matches!(err, RestError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_missing_required_body() {
        let spec = OperationSpec::new(Method::POST, "/products")
            .with_request_body(RequestBodySpec::new(product_spec()).required());
        let service = SerializationLayer::default().layer(service_fn(echo));
        let err = service.oneshot(operation(spec)).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid operation: body cannot be null or undefined."
        );
    }

    #[tokio::test]
    async fn test_xml_root_list_wrapped_and_unwrapped() {
        let list = TypeSpec::sequence(TypeSpec::String);
        let spec = OperationSpec::new(Method::PUT, "/tags")
            .xml()
            .with_request_body(
                RequestBodySpec::new(list.clone())
                    .xml_name("Tags")
                    .xml_element_name("Tag"),
            )
            .with_response_body(list);
        let request = operation(spec).with_value(json!(["a", "b"]));

        let service = SerializationLayer::new(SerializationOptions::strict()).layer(service_fn(echo));
        let response = service.oneshot(request).await.unwrap();

        let sent = response.request.body.as_ref().unwrap().to_bytes();
        let sent = std::str::from_utf8(&sent).unwrap().to_owned();
        assert!(sent.contains("<Tags><Tag>a</Tag><Tag>b</Tag></Tags>"), "{sent}");
        assert_eq!(
            response.request.headers.get("content-type"),
            Some(XML_CONTENT_TYPE)
        );
        assert_eq!(response.deserialized_body, Some(Value::from(json!(["a", "b"]))));
    }

    #[tokio::test]
    async fn test_xml_root_list_requires_element_name() {
        let spec = OperationSpec::new(Method::PUT, "/tags")
            .xml()
            .with_request_body(RequestBodySpec::new(TypeSpec::sequence(TypeSpec::String)));
        let request = operation(spec).with_value(json!(["a"]));
        let service = SerializationLayer::default().layer(service_fn(echo));
        let err = service.oneshot(request).await.unwrap_err();
        assert!(matches!(err, RestError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn test_explicit_content_type_kept() {
        let spec = OperationSpec::new(Method::POST, "/products")
            .with_content_type("application/merge-patch+json")
            .with_request_body(RequestBodySpec::new(product_spec()));
        let request = operation(spec).with_value(json!({"booleanProperty": true, "numberProperty": 1}));
        let service = SerializationLayer::default().layer(service_fn(echo));
        let response = service.oneshot(request).await.unwrap();
        assert_eq!(
            response.request.headers.get("content-type"),
            Some("application/merge-patch+json")
        );
    }

    #[tokio::test]
    async fn test_error_status_is_parsed_not_deserialized() {
        let inner = service_fn(|request: WebResource| async move {
            Ok::<_, RestError>(HttpOperationResponse::buffered(
                request,
                StatusCode::BAD_REQUEST,
                HttpHeaders::new(),
                r#"{"error":{"code":"BadThing"}}"#,
            ))
        });
        let spec = OperationSpec::new(Method::GET, "/products").with_response_body(product_spec());
        let service = SerializationLayer::new(SerializationOptions::strict()).layer(inner);
        let response = service.oneshot(operation(spec)).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.deserialized_body.is_none());
        assert_eq!(
            response.parsed_body,
            Some(Value::from(json!({"error": {"code": "BadThing"}})))
        );
    }

    #[tokio::test]
    async fn test_requests_without_operation_pass_through() {
        let service = SerializationLayer::default().layer(service_fn(echo));
        let request = WebResource::post("https://example.com/")
            .unwrap()
            .with_text("raw");
        let response = service.oneshot(request).await.unwrap();
        assert!(response.parsed_body.is_none());
        assert_eq!(response.buffered_body().map(|b| b.as_ref()), Some(&b"raw"[..]));
    }
}
