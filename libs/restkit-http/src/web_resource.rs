//! The outgoing request and the operation description that can travel with it

use crate::error::RestError;
use crate::headers::HttpHeaders;
use bytes::Bytes;
use http::Method;
use http::header::{HeaderName, HeaderValue};
use restkit_spec::{TypeSpec, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bytes moved so far for one direction of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub loaded_bytes: u64,
    /// Known only when the peer announced a length
    pub total_bytes: Option<u64>,
}

/// Observer for upload or download progress
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Request payload; cloning shares the underlying data
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// In-memory value, serialized by the serialization policy or sent as JSON
    Value(Arc<Value>),
    Text(Arc<str>),
    Bytes(Bytes),
}

impl RequestBody {
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(Arc::new(value.into()))
    }

    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::Text(Arc::from(text))
    }

    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Text(_) | Self::Bytes(_) => None,
        }
    }

    /// Bytes put on the wire; values are written as compact JSON
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Value(value) => Bytes::from(value.to_json().to_string()),
            Self::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Self::Bytes(bytes) => bytes.clone(),
        }
    }
}

/// One URL, query or header parameter of an operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationParameter {
    pub name: String,
    pub serialized_name: Option<String>,
    pub spec: TypeSpec,
    pub required: bool,
    /// Insert the value into the path verbatim instead of percent-encoding it
    pub skip_encoding: bool,
}

impl OperationParameter {
    #[must_use]
    pub fn new(name: impl Into<String>, spec: TypeSpec) -> Self {
        Self {
            name: name.into(),
            serialized_name: None,
            spec,
            required: false,
            skip_encoding: false,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn serialized_name(mut self, name: impl Into<String>) -> Self {
        self.serialized_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn skip_encoding(mut self) -> Self {
        self.skip_encoding = true;
        self
    }

    #[must_use]
    pub fn wire_name(&self) -> &str {
        self.serialized_name.as_deref().unwrap_or(&self.name)
    }
}

/// How the request payload is described and laid out
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBodySpec {
    /// Argument name holding the payload in `OperationArguments`
    pub parameter_name: String,
    pub spec: TypeSpec,
    pub required: bool,
    pub xml_name: Option<String>,
    pub xml_element_name: Option<String>,
}

impl RequestBodySpec {
    #[must_use]
    pub fn new(spec: TypeSpec) -> Self {
        Self {
            parameter_name: "body".to_owned(),
            spec,
            required: false,
            xml_name: None,
            xml_element_name: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn parameter_name(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = name.into();
        self
    }

    #[must_use]
    pub fn xml_name(mut self, name: impl Into<String>) -> Self {
        self.xml_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn xml_element_name(mut self, name: impl Into<String>) -> Self {
        self.xml_element_name = Some(name.into());
        self
    }
}

/// Declarative description of a service operation
///
/// Binds the request and response payload specs used by the serialization
/// policy, plus the parameter layout used by `ServiceClient::send_operation_request`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSpec {
    pub http_method: Method,
    /// Path template relative to `base_url`, e.g. `/pets/{petId}`
    pub path: String,
    pub base_url: Option<String>,
    pub url_parameters: Vec<OperationParameter>,
    pub query_parameters: Vec<OperationParameter>,
    pub header_parameters: Vec<OperationParameter>,
    pub request_body: Option<RequestBodySpec>,
    pub response_body: Option<TypeSpec>,
    pub content_type: Option<String>,
    pub is_xml: bool,
}

impl OperationSpec {
    #[must_use]
    pub fn new(http_method: Method, path: impl Into<String>) -> Self {
        Self {
            http_method,
            path: path.into(),
            base_url: None,
            url_parameters: Vec::new(),
            query_parameters: Vec::new(),
            header_parameters: Vec::new(),
            request_body: None,
            response_body: None,
            content_type: None,
            is_xml: false,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_url_parameter(mut self, parameter: OperationParameter) -> Self {
        self.url_parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_query_parameter(mut self, parameter: OperationParameter) -> Self {
        self.query_parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_header_parameter(mut self, parameter: OperationParameter) -> Self {
        self.header_parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn with_request_body(mut self, body: RequestBodySpec) -> Self {
        self.request_body = Some(body);
        self
    }

    #[must_use]
    pub fn with_response_body(mut self, spec: TypeSpec) -> Self {
        self.response_body = Some(spec);
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Payloads of this operation travel as XML documents
    #[must_use]
    pub fn xml(mut self) -> Self {
        self.is_xml = true;
        self
    }
}

/// An outgoing HTTP request
///
/// Policies treat a `WebResource` as a value: a policy that needs a different
/// URL, method or header set builds a new value (or a clone) and forwards it,
/// so the caller's request is never modified behind its back.
#[derive(Clone)]
pub struct WebResource {
    pub url: Url,
    pub method: Method,
    pub headers: HttpHeaders,
    pub body: Option<RequestBody>,
    pub operation_spec: Option<Arc<OperationSpec>>,
    pub abort_signal: Option<CancellationToken>,
    /// Per-attempt timeout enforced by the transport
    pub timeout: Option<Duration>,
    pub on_upload_progress: Option<ProgressCallback>,
    pub on_download_progress: Option<ProgressCallback>,
    /// Hand the body stream to the caller instead of buffering it in the transport
    pub stream_response_body: bool,
}

impl WebResource {
    /// # Errors
    /// Returns `RestError::InvalidUrl` if `url` is not an absolute URL.
    pub fn new(method: Method, url: &str) -> Result<Self, RestError> {
        let parsed = Url::parse(url).map_err(|e| RestError::invalid_url(url, e))?;
        Ok(Self::from_url(method, parsed))
    }

    /// # Errors
    /// Returns `RestError::InvalidUrl` if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self, RestError> {
        Self::new(Method::GET, url)
    }

    /// # Errors
    /// Returns `RestError::InvalidUrl` if `url` is not an absolute URL.
    pub fn post(url: &str) -> Result<Self, RestError> {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            url,
            method,
            headers: HttpHeaders::new(),
            body: None,
            operation_spec: None,
            abort_signal: None,
            timeout: None,
            on_upload_progress: None,
            on_download_progress: None,
            stream_response_body: false,
        }
    }

    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.set(name, value);
        self
    }

    /// # Errors
    /// Returns a header error if `name` or `value` is not valid on the wire.
    pub fn try_with_header(mut self, name: &str, value: &str) -> Result<Self, RestError> {
        self.headers.try_set(name, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_query_parameter(mut self, name: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_value(self, value: impl Into<Value>) -> Self {
        self.with_body(RequestBody::value(value))
    }

    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_body(RequestBody::text(text))
    }

    #[must_use]
    pub fn with_bytes(self, bytes: impl Into<Bytes>) -> Self {
        self.with_body(RequestBody::Bytes(bytes.into()))
    }

    #[must_use]
    pub fn with_operation_spec(mut self, spec: Arc<OperationSpec>) -> Self {
        self.operation_spec = Some(spec);
        self
    }

    #[must_use]
    pub fn with_abort_signal(mut self, signal: CancellationToken) -> Self {
        self.abort_signal = Some(signal);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_upload_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_upload_progress = Some(callback);
        self
    }

    #[must_use]
    pub fn with_download_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_download_progress = Some(callback);
        self
    }

    #[must_use]
    pub fn with_streamed_response(mut self, stream: bool) -> Self {
        self.stream_response_body = stream;
        self
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort_signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

impl fmt::Debug for WebResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebResource")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("operation_spec", &self.operation_spec.is_some())
            .field("timeout", &self.timeout)
            .field("stream_response_body", &self.stream_response_body)
            .finish_non_exhaustive()
    }
}
