//! Tower layer wiring a [`Paygate`] in front of protected routes.
//!
//! Create one [`B402Middleware`] per application, then derive a
//! [`B402LayerBuilder`] per protected route with
//! [`B402Middleware::with_requirement`].

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::Request;
use axum::response::Response;
use b402::{PaymentRequirement, Verifier};
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};
use url::Url;

use super::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use super::paygate::{Paygate, RequestValidator};

/// The main b402 middleware instance for enforcing payments on routes.
#[derive(Clone, Debug)]
pub struct B402Middleware<V> {
    verifier: V,
    verifier_timeout: Duration,
    base_url: Option<Url>,
}

impl<V> B402Middleware<V> {
    /// Default bound on one verify-and-settle call.
    pub const DEFAULT_VERIFIER_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a middleware around any [`Verifier`].
    pub const fn new(verifier: V) -> Self {
        Self {
            verifier,
            verifier_timeout: Self::DEFAULT_VERIFIER_TIMEOUT,
            base_url: None,
        }
    }

    /// Returns a reference to the underlying verifier.
    pub const fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Sets the bound on one verify-and-settle call.
    ///
    /// A verifier that does not answer in time is reported as
    /// `verifier_unreachable`.
    #[must_use]
    pub const fn with_verifier_timeout(mut self, timeout: Duration) -> Self {
        self.verifier_timeout = timeout;
        self
    }

    /// Sets the origin used to compute a requirement's `resource` when the
    /// route does not configure one.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

impl B402Middleware<Arc<FacilitatorClient>> {
    /// Creates a middleware backed by a remote facilitator.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn try_new(url: &str) -> Result<Self, FacilitatorClientError> {
        let facilitator = FacilitatorClient::try_from(url)?;
        Ok(Self::new(Arc::new(facilitator)))
    }

    /// Returns the configured facilitator URL.
    #[must_use]
    pub fn facilitator_url(&self) -> &Url {
        self.verifier.base_url()
    }
}

impl<V: Clone> B402Middleware<V> {
    /// Starts a layer for a route protected by `requirement`.
    #[must_use]
    pub fn with_requirement(&self, requirement: PaymentRequirement) -> B402LayerBuilder<V> {
        B402LayerBuilder {
            verifier: self.verifier.clone(),
            verifier_timeout: self.verifier_timeout,
            base_url: self.base_url.clone().map(Arc::new),
            requirement: Arc::new(requirement),
            validator: None,
        }
    }
}

/// Builder for configuring the b402 middleware layer of one route.
#[derive(Clone, Debug)]
pub struct B402LayerBuilder<V> {
    verifier: V,
    verifier_timeout: Duration,
    base_url: Option<Arc<Url>>,
    requirement: Arc<PaymentRequirement>,
    validator: Option<RequestValidator>,
}

impl<V> B402LayerBuilder<V> {
    /// Sets a description of what the payment grants access to.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.requirement).description = description.into();
        self
    }

    /// Sets the MIME type of the protected resource.
    #[must_use]
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.requirement).mime_type = Some(mime.into());
        self
    }

    /// Sets the full URL of the protected resource.
    ///
    /// When set, this URL is used as-is instead of being derived from the
    /// base URL and the request path.
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn with_resource(mut self, resource: Url) -> Self {
        Arc::make_mut(&mut self.requirement).resource = Some(resource.to_string());
        self
    }

    /// Validates the request body once a payment header is present.
    ///
    /// The check runs before prechecks and settlement, so a malformed request
    /// is rejected with `400 Bad Request` without charging the payer. Requests
    /// without a payment header are challenged without reading the body.
    #[must_use]
    pub fn with_request_validator<F>(mut self, validate: F) -> Self
    where
        F: Fn(&[u8]) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validator = Some(RequestValidator::new(validate));
        self
    }

    /// The requirement this layer issues.
    #[must_use]
    pub fn requirement(&self) -> &PaymentRequirement {
        &self.requirement
    }
}

impl<S, V> Layer<S> for B402LayerBuilder<V>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    V: Verifier + Clone,
{
    type Service = B402MiddlewareService<V>;

    fn layer(&self, inner: S) -> Self::Service {
        B402MiddlewareService {
            verifier: self.verifier.clone(),
            verifier_timeout: self.verifier_timeout,
            base_url: self.base_url.clone(),
            requirement: Arc::clone(&self.requirement),
            validator: self.validator.clone(),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces b402 payments on incoming requests.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct B402MiddlewareService<V> {
    /// Payment verifier (remote facilitator or test double)
    verifier: V,
    /// Bound on one verify-and-settle call
    verifier_timeout: Duration,
    /// Origin for resource URLs
    base_url: Option<Arc<Url>>,
    /// Requirement issued for this route
    requirement: Arc<PaymentRequirement>,
    /// Optional body shape check
    validator: Option<RequestValidator>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl<V> Service<Request> for B402MiddlewareService<V>
where
    V: Verifier + Clone + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    /// Builds a [`Paygate`] for the request and runs it.
    fn call(&mut self, req: Request) -> Self::Future {
        let gate = Paygate {
            verifier: self.verifier.clone(),
            requirement: resolve_requirement(&self.requirement, self.base_url.as_deref(), &req),
            verifier_timeout: self.verifier_timeout,
            validator: self.validator.clone(),
        };
        let inner = self.inner.clone();
        Box::pin(gate.handle_request(inner, req))
    }
}

/// Fills in the requirement's `resource` from the base URL (or the `Host`
/// header) and the request path, unless the route configured one.
fn resolve_requirement(
    requirement: &Arc<PaymentRequirement>,
    base_url: Option<&Url>,
    req: &Request,
) -> Arc<PaymentRequirement> {
    if requirement.resource.is_some() {
        return Arc::clone(requirement);
    }
    let origin = base_url.cloned().or_else(|| {
        let host = req.headers().get(http::header::HOST)?.to_str().ok()?;
        Url::parse(&format!("http://{host}")).ok()
    });
    let Some(mut url) = origin else {
        return Arc::clone(requirement);
    };
    url.set_path(req.uri().path());
    url.set_query(req.uri().query());

    let mut resolved = (**requirement).clone();
    resolved.resource = Some(url.to_string());
    Arc::new(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use b402::{Network, TokenAmount};
    use alloy_primitives::Address;

    fn requirement() -> PaymentRequirement {
        PaymentRequirement::new(
            Network::BscTestnet,
            Network::BscTestnet.default_token(),
            Address::repeat_byte(0x01),
            TokenAmount::from(1u128),
            Address::repeat_byte(0x02),
        )
    }

    #[test]
    fn test_resource_from_base_url() {
        let req = Request::builder()
            .uri("/process?x=1")
            .body(axum::body::Body::empty())
            .unwrap();
        let base = Url::parse("https://api.example.com/").unwrap();
        let resolved = resolve_requirement(&Arc::new(requirement()), Some(&base), &req);
        assert_eq!(
            resolved.resource.as_deref(),
            Some("https://api.example.com/process?x=1")
        );
    }

    #[test]
    fn test_resource_from_host_header() {
        let req = Request::builder()
            .uri("/process")
            .header("host", "localhost:3000")
            .body(axum::body::Body::empty())
            .unwrap();
        let resolved = resolve_requirement(&Arc::new(requirement()), None, &req);
        assert_eq!(
            resolved.resource.as_deref(),
            Some("http://localhost:3000/process")
        );
    }

    #[test]
    fn test_configured_resource_wins() {
        let req = Request::builder()
            .uri("/other")
            .body(axum::body::Body::empty())
            .unwrap();
        let configured = Arc::new(requirement().with_resource("https://fixed.example/process"));
        let resolved = resolve_requirement(&configured, None, &req);
        assert!(Arc::ptr_eq(&resolved, &configured));
    }
}
