//! Top-level client owning the default policy pipeline

use crate::client::HttpClient;
use crate::config::{
    DEFAULT_CLIENT_REQUEST_ID_HEADER, ExponentialRetryConfig, HyperClientConfig, RedirectConfig,
    RpRegistrationConfig, default_user_agent,
};
use crate::credentials::ServiceClientCredentials;
use crate::error::RestError;
use crate::pipeline::HttpPipeline;
use crate::policies::{
    RequestPolicyOptions, SharedPolicyFactory, ThrottlingHandler, exponential_retry_policy,
    generate_client_request_id_policy, log_policy, redirect_policy, rp_registration_policy,
    serialization_policy, signing_policy, system_error_retry_policy, throttling_retry_policy,
    user_agent_policy,
};
use crate::response::HttpOperationResponse;
use crate::transport::HyperHttpClient;
use crate::web_resource::{OperationParameter, OperationSpec, RequestBody, WebResource};
use http::header::{HeaderName, HeaderValue};
use restkit_spec::{LogSink, Map, PropertyPath, SerializationOptions, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Rewrites the default factory list before the pipeline is built
pub type CustomizeFactories =
    Arc<dyn Fn(Vec<SharedPolicyFactory>) -> Vec<SharedPolicyFactory> + Send + Sync>;

/// Override for the default policy list
#[derive(Clone)]
pub enum RequestPolicyFactories {
    /// Use exactly these factories
    Replace(Vec<SharedPolicyFactory>),
    /// Receive the defaults and return the list to use
    Customize(CustomizeFactories),
}

/// Options for [`ServiceClient::new`]
#[derive(Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServiceClientOptions {
    /// Stamp a fresh UUID into `client_request_id_header_name` (default: true)
    pub generate_client_request_id_header: bool,
    pub client_request_id_header_name: HeaderName,
    /// Defaults to [`default_user_agent`]
    pub user_agent: Option<String>,
    /// Drop both retry policies
    pub no_retry_policy: bool,
    pub exponential_retry: ExponentialRetryConfig,
    pub redirect: RedirectConfig,
    pub rp_registration: RpRegistrationConfig,
    /// Install the throttling policy with this handler
    pub throttling: Option<Arc<dyn ThrottlingHandler>>,
    /// Install the log policy writing to this sink
    pub log_sink: Option<LogSink>,
    pub serialization: SerializationOptions,
    pub request_policy_factories: Option<RequestPolicyFactories>,
    /// Transport to use instead of the default hyper client
    pub http_client: Option<Arc<dyn HttpClient>>,
    /// Configuration of the default hyper client
    pub transport: HyperClientConfig,
}

impl Default for ServiceClientOptions {
    fn default() -> Self {
        Self {
            generate_client_request_id_header: true,
            client_request_id_header_name: HeaderName::from_static(
                DEFAULT_CLIENT_REQUEST_ID_HEADER,
            ),
            user_agent: None,
            no_retry_policy: false,
            exponential_retry: ExponentialRetryConfig::default(),
            redirect: RedirectConfig::default(),
            rp_registration: RpRegistrationConfig::default(),
            throttling: None,
            log_sink: None,
            serialization: SerializationOptions::strict(),
            request_policy_factories: None,
            http_client: None,
            transport: HyperClientConfig::default(),
        }
    }
}

impl ServiceClientOptions {
    #[must_use]
    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn without_retries(mut self) -> Self {
        self.no_retry_policy = true;
        self
    }

    #[must_use]
    pub fn with_exponential_retry(mut self, config: ExponentialRetryConfig) -> Self {
        self.exponential_retry = config;
        self
    }

    #[must_use]
    pub fn with_redirect(mut self, config: RedirectConfig) -> Self {
        self.redirect = config;
        self
    }

    #[must_use]
    pub fn with_rp_registration(mut self, config: RpRegistrationConfig) -> Self {
        self.rp_registration = config;
        self
    }

    #[must_use]
    pub fn with_throttling(mut self, handler: Arc<dyn ThrottlingHandler>) -> Self {
        self.throttling = Some(handler);
        self
    }

    #[must_use]
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_serialization(mut self, options: SerializationOptions) -> Self {
        self.serialization = options;
        self
    }

    #[must_use]
    pub fn with_request_policy_factories(mut self, factories: RequestPolicyFactories) -> Self {
        self.request_policy_factories = Some(factories);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, config: HyperClientConfig) -> Self {
        self.transport = config;
        self
    }
}

impl fmt::Debug for ServiceClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceClientOptions")
            .field(
                "generate_client_request_id_header",
                &self.generate_client_request_id_header,
            )
            .field(
                "client_request_id_header_name",
                &self.client_request_id_header_name,
            )
            .field("user_agent", &self.user_agent)
            .field("no_retry_policy", &self.no_retry_policy)
            .field("exponential_retry", &self.exponential_retry)
            .field("redirect", &self.redirect)
            .field("rp_registration", &self.rp_registration)
            .field("throttling", &self.throttling.is_some())
            .field("log_sink", &self.log_sink.is_some())
            .field("serialization", &self.serialization)
            .field(
                "request_policy_factories",
                &self.request_policy_factories.is_some(),
            )
            .field("http_client", &self.http_client.is_some())
            .field("transport", &self.transport)
            .finish()
    }
}

/// Default factory list, outermost first
///
/// # Errors
/// Returns `RestError::InvalidHeaderValue` if the configured user agent is not
/// a valid header value.
pub fn default_request_policy_factories(
    credentials: Option<Arc<dyn ServiceClientCredentials>>,
    options: &ServiceClientOptions,
) -> Result<Vec<SharedPolicyFactory>, RestError> {
    let mut factories: Vec<SharedPolicyFactory> = Vec::new();

    if options.generate_client_request_id_header {
        factories.push(generate_client_request_id_policy(
            options.client_request_id_header_name.clone(),
        ));
    }
    let user_agent = options
        .user_agent
        .clone()
        .unwrap_or_else(default_user_agent);
    factories.push(user_agent_policy(user_agent)?);
    factories.push(redirect_policy(options.redirect.clone()));
    factories.push(rp_registration_policy(options.rp_registration.clone()));
    if !options.no_retry_policy {
        factories.push(exponential_retry_policy(options.exponential_retry.clone()));
        factories.push(system_error_retry_policy(options.exponential_retry.clone()));
    }
    if let Some(handler) = &options.throttling {
        factories.push(throttling_retry_policy(Some(handler.clone())));
    }
    if let Some(credentials) = credentials {
        factories.push(signing_policy(credentials));
    }
    if options.log_sink.is_some() {
        factories.push(log_policy(None));
    }
    factories.push(serialization_policy(options.serialization.clone()));

    Ok(factories)
}

/// Values for one [`ServiceClient::send_operation_request`] call
#[derive(Debug, Clone, Default)]
pub struct OperationArguments {
    /// Parameter and body values keyed by parameter name
    pub values: Map,
    pub abort_signal: Option<CancellationToken>,
    pub timeout: Option<Duration>,
}

impl OperationArguments {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
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

    fn present(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }
}

/// Client sending requests through the default policy pipeline
#[derive(Clone, Debug)]
pub struct ServiceClient {
    pipeline: HttpPipeline,
    base_url: Option<String>,
    serialization: SerializationOptions,
}

impl ServiceClient {
    /// Build the transport (unless one is injected) and the policy pipeline
    ///
    /// # Errors
    /// Returns `RestError::Tls` if the default transport cannot be built and
    /// `RestError::InvalidHeaderValue` for an invalid user agent.
    pub fn new(
        credentials: Option<Arc<dyn ServiceClientCredentials>>,
        options: ServiceClientOptions,
    ) -> Result<Self, RestError> {
        let transport: Arc<dyn HttpClient> = match &options.http_client {
            Some(client) => client.clone(),
            None => Arc::new(HyperHttpClient::new(options.transport.clone())?),
        };

        let factories = match &options.request_policy_factories {
            Some(RequestPolicyFactories::Replace(factories)) => factories.clone(),
            Some(RequestPolicyFactories::Customize(customize)) => {
                customize(default_request_policy_factories(credentials, &options)?)
            }
            None => default_request_policy_factories(credentials, &options)?,
        };

        let policy_options = RequestPolicyOptions {
            log: options.log_sink.clone(),
        };
        tracing::debug!(policies = factories.len(), "Service client pipeline built");

        Ok(Self {
            pipeline: HttpPipeline::new(factories, transport).with_options(policy_options),
            base_url: None,
            serialization: options.serialization,
        })
    }

    /// Base URL for operations whose spec does not carry one
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn pipeline(&self) -> &HttpPipeline {
        &self.pipeline
    }

    /// Send a prepared request through the pipeline
    ///
    /// # Errors
    /// Returns the error of the first policy or the transport that gives up.
    pub async fn send_request(
        &self,
        request: WebResource,
    ) -> Result<HttpOperationResponse, RestError> {
        self.pipeline.send(request).await
    }

    /// Build the request for `operation` from `arguments` and send it
    ///
    /// # Errors
    /// Returns `RestError::InvalidOperation` when a required argument is
    /// missing or no base URL is known, serialization errors for arguments
    /// that do not fit their specs, and any pipeline error.
    pub async fn send_operation_request(
        &self,
        arguments: &OperationArguments,
        operation: Arc<OperationSpec>,
    ) -> Result<HttpOperationResponse, RestError> {
        let request = self.build_operation_request(arguments, operation)?;
        self.pipeline.send(request).await
    }

    fn build_operation_request(
        &self,
        arguments: &OperationArguments,
        operation: Arc<OperationSpec>,
    ) -> Result<WebResource, RestError> {
        let base_url = operation
            .base_url
            .as_deref()
            .or(self.base_url.as_deref())
            .ok_or_else(|| {
                RestError::invalid_operation("no base URL is configured for the operation")
            })?;

        let mut path = operation.path.clone();
        for parameter in &operation.url_parameters {
            let Some(text) = self.parameter_text(arguments, parameter)? else {
                return Err(RestError::invalid_operation(format!(
                    "{} cannot be null or undefined.",
                    parameter.name
                )));
            };
            let replacement = if parameter.skip_encoding {
                text
            } else {
                urlencoding::encode(&text).into_owned()
            };
            path = path.replace(&format!("{{{}}}", parameter.wire_name()), &replacement);
        }

        let joined = join_url(base_url, &path);
        let mut url = Url::parse(&joined).map_err(|e| RestError::invalid_url(joined.clone(), e))?;

        let mut query = Vec::new();
        for parameter in &operation.query_parameters {
            if let Some(text) = self.parameter_text(arguments, parameter)? {
                query.push((parameter.wire_name().to_owned(), text));
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        let mut request = WebResource::from_url(operation.http_method.clone(), url);
        for parameter in &operation.header_parameters {
            if let Some(text) = self.parameter_text(arguments, parameter)? {
                request.headers.set(
                    HeaderName::try_from(parameter.wire_name())?,
                    HeaderValue::from_str(&text)?,
                );
            }
        }

        if let Some(body_spec) = &operation.request_body
            && let Some(body) = arguments.present(&body_spec.parameter_name)
        {
            request.body = Some(RequestBody::value(body.clone()));
        }
        request.abort_signal.clone_from(&arguments.abort_signal);
        request.timeout = arguments.timeout;
        request.operation_spec = Some(operation);
        Ok(request)
    }

    /// Serialized text of one parameter, `None` when it is absent and optional
    fn parameter_text(
        &self,
        arguments: &OperationArguments,
        parameter: &OperationParameter,
    ) -> Result<Option<String>, RestError> {
        let Some(value) = arguments.present(&parameter.name) else {
            if parameter.required {
                return Err(RestError::invalid_operation(format!(
                    "{} cannot be null or undefined.",
                    parameter.name
                )));
            }
            return Ok(None);
        };
        let serialized = parameter.spec.serialize(
            &PropertyPath::from_segments([parameter.name.as_str()]),
            value,
            &self.serialization,
        )?;
        Ok(wire_text(&serialized))
    }
}

/// Text form of a serialized parameter value; lists are comma-joined
fn wire_text(value: &Value) -> Option<String> {
    match value.to_json() {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    serde_json::Value::String(text) => text.clone(),
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
