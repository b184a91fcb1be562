#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Policy pipeline and service client for typed REST invocation
//!
//! Requests travel through an ordered chain of policies before they reach the
//! transport:
//! - Client request id and User-Agent stamping
//! - Redirect following (300/307, and 303 after POST)
//! - Resource provider auto-registration on `409 MissingSubscriptionRegistration`
//! - Exponential retry with jitter, and system error retry
//! - Optional 429 throttling, request signing and request/response logging
//! - Payload (de)serialization through [`restkit_spec`] type specs
//!
//! Every policy is a tower `Layer`; a [`RequestPolicyFactory`] wraps one around
//! the rest of the chain. [`HttpPipeline`] builds a fresh chain per send, the
//! first factory being the outermost policy.
//!
//! The default transport, [`HyperHttpClient`], is a pooled hyper client with
//! rustls TLS and transparent response decompression. Any [`HttpClient`] can
//! replace it.
//!
//! # Example
//!
//! ```ignore
//! use restkit_http::{OperationArguments, ServiceClient, ServiceClientOptions, TokenCredentials};
//! use std::sync::Arc;
//!
//! let client = ServiceClient::new(
//!     Some(Arc::new(TokenCredentials::new(token)?)),
//!     ServiceClientOptions::default(),
//! )?
//! .with_base_url("https://management.example.com");
//!
//! let arguments = OperationArguments::new().with("petId", "rex");
//! let response = client.send_operation_request(&arguments, get_pet_spec).await?;
//! let pet = response.deserialized_body;
//! ```

mod client;
mod config;
mod credentials;
mod error;
mod headers;
mod pipeline;
pub mod policies;
mod response;
mod service_client;
mod tls;
mod transport;
mod web_resource;

pub use client::HttpClient;
pub use config::{
    DEFAULT_CLIENT_REQUEST_ID_HEADER, DEFAULT_USER_AGENT, ExponentialRetryConfig,
    HyperClientConfig, RedirectConfig, RpRegistrationConfig, TlsRootConfig, TransportSecurity,
    default_user_agent,
};
pub use credentials::{
    ApiKeyCredentials, BasicAuthenticationCredentials, ServiceClientCredentials, TokenCredentials,
};
pub use error::{BoxError, RestError, system_error_code};
pub use headers::HttpHeaders;
pub use pipeline::HttpPipeline;
pub use policies::{
    PolicyService, RequestPolicyFactory, RequestPolicyOptions, SharedPolicyFactory,
    TransportService, layer_factory,
};
pub use response::{
    HttpOperationResponse, ProgressBody, ResponseBody, ResponseStream, parse_retry_after,
};
pub use service_client::{
    CustomizeFactories, OperationArguments, RequestPolicyFactories, ServiceClient,
    ServiceClientOptions, default_request_policy_factories,
};
pub use transport::HyperHttpClient;
pub use web_resource::{
    OperationParameter, OperationSpec, ProgressCallback, RequestBody, RequestBodySpec,
    TransferProgress, WebResource,
};

pub use restkit_spec;
