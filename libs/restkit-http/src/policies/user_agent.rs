use super::{SharedPolicyFactory, layer_factory};
use crate::error::RestError;
use crate::response::HttpOperationResponse;
use crate::web_resource::WebResource;
use http::HeaderValue;
use http::header::{HeaderName, USER_AGENT};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that adds a user agent header to requests that lack one
#[derive(Clone, Debug)]
pub struct UserAgentLayer {
    header_name: HeaderName,
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// Create a new `UserAgentLayer` writing the standard `User-Agent` header
    ///
    /// # Errors
    /// Returns `RestError::InvalidHeaderValue` if the user agent string is not valid
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, RestError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self {
            header_name: USER_AGENT,
            user_agent,
        })
    }

    /// Write the agent under a different header, e.g. `x-ms-useragent`
    #[must_use]
    pub fn with_header_name(mut self, header_name: HeaderName) -> Self {
        self.header_name = header_name;
        self
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            header_name: self.header_name.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Service that adds the user agent header to requests
#[derive(Clone, Debug)]
pub struct UserAgentService<S> {
    inner: S,
    header_name: HeaderName,
    user_agent: HeaderValue,
}

impl<S> Service<WebResource> for UserAgentService<S>
where
    S: Service<WebResource, Response = HttpOperationResponse, Error = RestError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: WebResource) -> Self::Future {
        if !request.headers.contains(self.header_name.as_str()) {
            request
                .headers
                .set(self.header_name.clone(), self.user_agent.clone());
        }
        self.inner.call(request)
    }
}

/// Factory for [`UserAgentLayer`]
///
/// # Errors
/// Returns `RestError::InvalidHeaderValue` if `user_agent` is not a valid header value.
pub fn user_agent_policy(user_agent: impl AsRef<str>) -> Result<SharedPolicyFactory, RestError> {
    Ok(layer_factory(UserAgentLayer::try_new(user_agent)?))
}
