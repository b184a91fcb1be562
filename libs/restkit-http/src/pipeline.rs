use crate::client::HttpClient;
use crate::error::RestError;
use crate::policies::{PolicyService, RequestPolicyOptions, SharedPolicyFactory, TransportService};
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use std::fmt;
use std::sync::Arc;
use tower::ServiceExt;
use tower::util::BoxCloneService;
use tracing::{Instrument, Level};

/// Ordered policy factories in front of a transport
///
/// The first factory produces the outermost policy. A fresh chain is built
/// for every [`send`](Self::send), so concurrent sends never share policy
/// state.
#[derive(Clone)]
pub struct HttpPipeline {
    factories: Vec<SharedPolicyFactory>,
    transport: Arc<dyn HttpClient>,
    options: RequestPolicyOptions,
}

impl HttpPipeline {
    #[must_use]
    pub fn new(factories: Vec<SharedPolicyFactory>, transport: Arc<dyn HttpClient>) -> Self {
        Self {
            factories,
            transport,
            options: RequestPolicyOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RequestPolicyOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn factories(&self) -> &[SharedPolicyFactory] {
        &self.factories
    }

    /// Compose the policy chain around the transport
    #[must_use]
    pub fn build_chain(&self) -> PolicyService {
        let transport = BoxCloneService::new(TransportService::new(self.transport.clone()));
        self.factories
            .iter()
            .rev()
            .fold(transport, |next, factory| factory.create(next, &self.options))
    }

    /// Send `request` through every policy and the transport
    ///
    /// # Errors
    /// Returns the first error a policy or the transport gives up with.
    pub async fn send(&self, request: WebResource) -> Result<HttpOperationResponse, RestError> {
        // query strings can carry keys, keep them out of the span
        let mut url = request.url.clone();
        url.set_query(None);
        url.set_fragment(None);

        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            http.method = %request.method,
            http.url = %url,
            otel.kind = "client",
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let result = self
            .build_chain()
            .oneshot(request)
            .instrument(span.clone())
            .await;

        match &result {
            Ok(response) => {
                span.record("http.status_code", response.status.as_u16());
                if response.status.is_client_error() || response.status.is_server_error() {
                    span.record("error", true);
                }
            }
            Err(_) => {
                span.record("error", true);
            }
        }
        result
    }
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("factories", &self.factories.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
