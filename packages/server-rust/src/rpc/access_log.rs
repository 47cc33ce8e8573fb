//! Per-call access record for gRPC services.

use std::task::{Context, Poll};

use svctmpl_core::{Field, Logger, RequestContext};
use tonic::server::NamedService;
use tower::Service;

/// Wraps a gRPC service and writes one `grpc request` record per call
/// through a logger derived from the call's [`RequestContext`].
///
/// Place it inside [`correlation_interceptor`](crate::middleware::correlation_interceptor)
/// so the context already carries `request_id`.
#[derive(Debug, Clone)]
pub struct AccessLog<S> {
    inner: S,
    logger: Logger,
}

impl<S> AccessLog<S> {
    #[must_use]
    pub fn new(inner: S, logger: Logger) -> Self {
        Self { inner, logger }
    }
}

impl<S: NamedService> NamedService for AccessLog<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, B> Service<http::Request<B>> for AccessLog<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let ctx = req
            .extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default();
        self.logger.for_context(&ctx).info(
            "grpc request",
            &[Field::string("method", req.uri().path().to_string())],
        );
        self.inner.call(req)
    }
}
