use super::{PolicyFuture, PolicyService, RequestPolicyOptions, SharedPolicyFactory, emit, send_next};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use restkit_spec::LogSink;
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::util::BoxCloneService;
use tower::{Layer, Service};

/// Tower layer writing each request and its response to a log sink
///
/// The response body is buffered while it is logged, so the caller still
/// reads the same content afterwards. Streamed responses are logged without
/// their body.
#[derive(Clone, Default)]
pub struct LogLayer {
    sink: Option<LogSink>,
}

impl LogLayer {
    #[must_use]
    pub fn new(sink: Option<LogSink>) -> Self {
        Self { sink }
    }
}

impl fmt::Debug for LogLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogLayer")
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl<S> Layer<S> for LogLayer {
    type Service = LogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

#[derive(Clone)]
pub struct LogService<S> {
    inner: S,
    sink: Option<LogSink>,
}

impl<S> Service<WebResource> for LogService<S>
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
        let sink = self.sink.clone();

        Box::pin(async move {
            emit(
                sink.as_ref(),
                &format!(">> Request: {} {}", request.method, request.url),
            );
            let mut response = send_next(&inner, request).await?;
            emit(
                sink.as_ref(),
                &format!(">> Response status code: {}", response.status.as_u16()),
            );
            if !response.request.stream_response_body {
                let body = response.body_as_text().await?;
                emit(sink.as_ref(), &format!(">> Body: {body}"));
            }
            Ok(response)
        })
    }
}

/// Factory for [`LogLayer`]
///
/// Without an explicit sink the layer uses the pipeline's
/// [`RequestPolicyOptions::log`], and `tracing` when that is unset too.
#[must_use]
pub fn log_policy(sink: Option<LogSink>) -> SharedPolicyFactory {
    Arc::new(
        move |next: PolicyService, options: &RequestPolicyOptions| -> PolicyService {
            let sink = sink.clone().or_else(|| options.log.clone());
            BoxCloneService::new(LogLayer::new(sink).layer(next))
        },
    )
}
