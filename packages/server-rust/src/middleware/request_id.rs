//! Correlation stage for HTTP and gRPC.
//!
//! Reads `X-Request-ID` from the inbound request, generates one when it is
//! absent or blank, and attaches it to the request's [`RequestContext`]
//! before calling the next stage.
//!
//! [`RequestContext`]: svctmpl_core::RequestContext

use std::task::{Context, Poll};

use tonic::service::Interceptor;
use tonic::Status;
use tower::{Layer, Service};

use super::carrier::CorrelationResolver;
use super::log_inject::LogInjectInterceptor;

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Tower layer running the correlation stage on every HTTP request.
#[derive(Debug, Clone)]
pub struct RequestIdLayer {
    resolver: CorrelationResolver,
}

impl RequestIdLayer {
    #[must_use]
    pub fn new(resolver: CorrelationResolver) -> Self {
        Self { resolver }
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService {
            inner,
            resolver: self.resolver.clone(),
        }
    }
}

/// Service wrapper produced by [`RequestIdLayer`].
#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
    resolver: CorrelationResolver,
}

impl<S, B> Service<http::Request<B>> for RequestIdService<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        self.resolver.resolve(&mut req);
        self.inner.call(req)
    }
}

// ---------------------------------------------------------------------------
// gRPC
// ---------------------------------------------------------------------------

/// Unary interceptor running the correlation stage on gRPC metadata.
#[derive(Debug, Clone)]
pub struct RequestIdInterceptor {
    resolver: CorrelationResolver,
}

impl RequestIdInterceptor {
    #[must_use]
    pub fn new(resolver: CorrelationResolver) -> Self {
        Self { resolver }
    }
}

impl Interceptor for RequestIdInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        self.resolver.resolve(&mut request);
        Ok(request)
    }
}

/// Runs two interceptors in order, short-circuiting on the first error.
#[derive(Debug, Clone)]
pub struct InterceptorChain<A, B> {
    first: A,
    second: B,
}

impl<A, B> InterceptorChain<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: Interceptor, B: Interceptor> Interceptor for InterceptorChain<A, B> {
    fn call(&mut self, request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        let request = self.first.call(request)?;
        self.second.call(request)
    }
}

/// Both gRPC stages in the required order: correlation, then log injection.
#[must_use]
pub fn correlation_interceptor(
    resolver: CorrelationResolver,
) -> InterceptorChain<RequestIdInterceptor, LogInjectInterceptor> {
    InterceptorChain::new(RequestIdInterceptor::new(resolver), LogInjectInterceptor)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
