//! Default transport: hyper-util client over rustls, with response decompression

use crate::client::HttpClient;
use crate::config::{HyperClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::RestError;
use crate::headers::HttpHeaders;
use crate::response::{HttpOperationResponse, ProgressBody, ResponseBody, ResponseStream};
use crate::tls;
use crate::web_resource::{RequestBody, TransferProgress, WebResource};
use async_trait::async_trait;
use bytes::Bytes;
use http::Response;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

type HyperService =
    BoxCloneSyncService<http::Request<Full<Bytes>>, Response<ResponseStream>, RestError>;

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// `HttpClient` backed by a pooled hyper client
///
/// Built once by the owner of the pipeline and shared by every send.
#[derive(Clone)]
pub struct HyperHttpClient {
    service: HyperService,
    config: HyperClientConfig,
}

impl HyperHttpClient {
    /// # Errors
    /// Returns `RestError::Tls` if `TlsRootConfig::Native` is requested but the
    /// OS store has no usable root certificates.
    pub fn new(config: HyperClientConfig) -> Result<Self, RestError> {
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let https = build_https_connector(config.tls_roots, config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout needs a timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let service = ServiceBuilder::new()
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(RestError::from);

        Ok(Self {
            service: BoxCloneSyncService::new(service),
            config,
        })
    }

    /// # Errors
    /// See [`HyperHttpClient::new`].
    pub fn with_defaults() -> Result<Self, RestError> {
        Self::new(HyperClientConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &HyperClientConfig {
        &self.config
    }
}

impl fmt::Debug for HyperHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperHttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HttpClient for HyperHttpClient {
    async fn send_request(&self, request: WebResource) -> Result<HttpOperationResponse, RestError> {
        if request.is_aborted() {
            return Err(RestError::Aborted);
        }

        let timeout = request.timeout.or(self.config.request_timeout);
        let abort = request.abort_signal.clone();
        let exchange = exchange(self.service.clone(), request);
        let bounded = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, exchange).await {
                    Ok(result) => result,
                    Err(_) => Err(RestError::Timeout(limit)),
                },
                None => exchange.await,
            }
        };

        match abort {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(RestError::Aborted),
                result = bounded => result,
            },
            None => bounded.await,
        }
    }
}

/// One request/response exchange; the body is buffered unless the request streams it
async fn exchange(
    mut service: HyperService,
    request: WebResource,
) -> Result<HttpOperationResponse, RestError> {
    let http_request = to_http_request(&request)?;
    let upload_len = http_body::Body::size_hint(http_request.body())
        .exact()
        .unwrap_or(0);

    let response = service.ready().await?.call(http_request).await?;

    if upload_len > 0
        && let Some(callback) = &request.on_upload_progress
    {
        callback(TransferProgress {
            loaded_bytes: upload_len,
            total_bytes: Some(upload_len),
        });
    }

    let (parts, stream) = response.into_parts();
    let total = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let stream = match &request.on_download_progress {
        Some(callback) => ProgressBody::new(stream, callback.clone(), total).boxed(),
        None => stream,
    };

    let body = if request.stream_response_body {
        ResponseBody::Streaming(stream)
    } else {
        ResponseBody::Buffered(stream.collect().await.map_err(RestError::Body)?.to_bytes())
    };

    tracing::debug!(
        status = parts.status.as_u16(),
        method = %request.method,
        "transport response received"
    );
    Ok(HttpOperationResponse::new(
        request,
        parts.status,
        HttpHeaders::from(parts.headers),
        body,
    ))
}

fn to_http_request(request: &WebResource) -> Result<http::Request<Full<Bytes>>, RestError> {
    let mut url = request.url.clone();
    url.set_fragment(None);

    let mut builder = http::Request::builder()
        .method(request.method.clone())
        .uri(url.as_str());
    if let Some(headers) = builder.headers_mut() {
        headers.extend(request.headers.raw().clone());
        if matches!(request.body, Some(RequestBody::Value(_))) && !headers.contains_key(CONTENT_TYPE)
        {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
    }

    let body = request
        .body
        .as_ref()
        .map(RequestBody::to_bytes)
        .unwrap_or_default();
    Ok(builder.body(Full::new(body))?)
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseStream>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseStream = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector; `enable_all_versions` negotiates h2 or http/1.1 via ALPN
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, RestError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    match tls_roots {
        TlsRootConfig::WebPki => {
            let builder = hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::crypto_provider())
                .map_err(|e| RestError::Tls(Box::new(e)))?;
            let connector = if allow_http {
                builder.https_or_http().enable_all_versions().build()
            } else {
                builder.https_only().enable_all_versions().build()
            };
            Ok(connector)
        }
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| RestError::Tls(e.into()))?;
            let builder = hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config);
            let connector = if allow_http {
                builder.https_or_http().enable_all_versions().build()
            } else {
                builder.https_only().enable_all_versions().build()
            };
            Ok(connector)
        }
    }
}
