use crate::error::{BoxError, RestError};
use crate::headers::HttpHeaders;
use crate::web_resource::{ProgressCallback, TransferProgress, WebResource};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use pin_project_lite::pin_project;
use restkit_spec::Value;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports two formats per RFC 7231:
/// - Seconds: "120" → 120 seconds
/// - HTTP-date (RFC 1123): "Wed, 21 Oct 2015 07:28:00 GMT" → duration until that time
///
/// Returns `None` if the header is missing, unparsable, negative, or in the past.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    parse_http_date(trimmed)
}

fn parse_http_date(value: &str) -> Option<Duration> {
    let parsed = httpdate::parse_http_date(value).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

/// Type-erased response body stream (possibly decompressed)
pub type ResponseStream = BoxBody<Bytes, BoxError>;

/// Response payload, either fully read or still streaming
pub enum ResponseBody {
    Buffered(Bytes),
    Streaming(ResponseStream),
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::Buffered(Bytes::new())
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

pin_project! {
    /// Body wrapper reporting received bytes to a progress callback
    pub struct ProgressBody {
        #[pin]
        inner: ResponseStream,
        callback: ProgressCallback,
        total: Option<u64>,
        loaded: u64,
    }
}

impl ProgressBody {
    #[must_use]
    pub fn new(inner: ResponseStream, callback: ProgressCallback, total: Option<u64>) -> Self {
        Self {
            inner,
            callback,
            total,
            loaded: 0,
        }
    }
}

impl http_body::Body for ProgressBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let polled = this.inner.poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled
            && let Some(data) = frame.data_ref()
        {
            *this.loaded += data.len() as u64;
            (this.callback)(TransferProgress {
                loaded_bytes: *this.loaded,
                total_bytes: *this.total,
            });
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// Response of one pipeline send
///
/// The body is read lazily: the first `body_as_*` call drains a streaming
/// body and keeps the bytes, so later calls (and later policies) see the same
/// content without touching the network again.
#[derive(Debug)]
pub struct HttpOperationResponse {
    /// Request that produced this response, after every policy change
    pub request: WebResource,
    pub status: StatusCode,
    pub headers: HttpHeaders,
    body: ResponseBody,
    /// Payload parsed from JSON or XML, before spec deserialization
    pub parsed_body: Option<Value>,
    /// Payload after response spec deserialization
    pub deserialized_body: Option<Value>,
}

impl HttpOperationResponse {
    #[must_use]
    pub fn new(
        request: WebResource,
        status: StatusCode,
        headers: HttpHeaders,
        body: ResponseBody,
    ) -> Self {
        Self {
            request,
            status,
            headers,
            body,
            parsed_body: None,
            deserialized_body: None,
        }
    }

    /// Response with an already available body
    #[must_use]
    pub fn buffered(
        request: WebResource,
        status: StatusCode,
        headers: HttpHeaders,
        body: impl Into<Bytes>,
    ) -> Self {
        Self::new(request, status, headers, ResponseBody::Buffered(body.into()))
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Redirect target, if the server sent one
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        self.headers.get(http::header::LOCATION.as_str())
    }

    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(self.headers.raw())
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(http::header::CONTENT_TYPE.as_str())
    }

    /// Bytes of an already buffered body
    #[must_use]
    pub fn buffered_body(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Buffered(bytes) => Some(bytes),
            ResponseBody::Streaming(_) => None,
        }
    }

    /// Read the whole body, buffering it for later calls
    ///
    /// # Errors
    /// Returns `RestError::Body` if the stream fails mid-way.
    pub async fn body_as_bytes(&mut self) -> Result<Bytes, RestError> {
        let bytes = match std::mem::take(&mut self.body) {
            ResponseBody::Buffered(bytes) => bytes,
            ResponseBody::Streaming(stream) => {
                stream.collect().await.map_err(RestError::Body)?.to_bytes()
            }
        };
        self.body = ResponseBody::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Read the body as UTF-8 text, replacing invalid sequences
    ///
    /// # Errors
    /// Returns `RestError::Body` if the stream fails mid-way.
    pub async fn body_as_text(&mut self) -> Result<String, RestError> {
        let bytes = self.body_as_bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read and parse the body as JSON; an empty body is `Value::Null`
    ///
    /// # Errors
    /// Returns `RestError::Body` on read failure, `RestError::Json` on malformed JSON.
    pub async fn body_as_json(&mut self) -> Result<Value, RestError> {
        let bytes = self.body_as_bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        let json: serde_json::Value = serde_json::from_slice(&bytes)?;
        Ok(Value::from(json))
    }

    /// Take the body out, leaving an empty buffered body behind
    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.body
    }
}
