//! Logging-injection stage for HTTP and gRPC.
//!
//! Copies the correlation ID resolved by [`request_id`](super::request_id)
//! into the context's log fields under `request_id`, so every logger built
//! from the context carries it.

use std::task::{Context, Poll};

use tonic::service::Interceptor;
use tonic::Status;
use tower::{Layer, Service};

use super::carrier::inject_request_id;

/// Tower layer running the logging-injection stage on every HTTP request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInjectLayer;

impl<S> Layer<S> for LogInjectLayer {
    type Service = LogInjectService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        LogInjectService { inner }
    }
}

/// Service wrapper produced by [`LogInjectLayer`].
#[derive(Debug, Clone)]
pub struct LogInjectService<S> {
    inner: S,
}

impl<S, B> Service<http::Request<B>> for LogInjectService<S>
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
        inject_request_id(&mut req);
        self.inner.call(req)
    }
}

/// Unary interceptor running the logging-injection stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInjectInterceptor;

impl Interceptor for LogInjectInterceptor {
    fn call(&mut self, mut request: tonic::Request<()>) -> Result<tonic::Request<()>, Status> {
        inject_request_id(&mut request);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use svctmpl_core::{CorrelationId, RequestContext};
    use tower::{service_fn, ServiceExt};

    use super::*;

    #[tokio::test]
    async fn request_without_context_passes_through() {
        let svc = LogInjectLayer.layer(service_fn(|req: http::Request<()>| async move {
            Ok::<_, Infallible>(req.extensions().get::<RequestContext>().is_none())
        }));
        assert!(svc.oneshot(http::Request::new(())).await.unwrap());
    }

    #[test]
    fn grpc_stage_stashes_existing_id() {
        let mut req = tonic::Request::new(());
        req.extensions_mut().insert(
            RequestContext::new().with_correlation_id(CorrelationId::new("rpc-77").unwrap()),
        );

        let req = LogInjectInterceptor.call(req).unwrap();

        let ctx = req.extensions().get::<RequestContext>().unwrap();
        assert_eq!(ctx.fields().len(), 1);
        assert_eq!(ctx.fields()[0].key(), "request_id");
        assert_eq!(ctx.fields()[0].value.to_string(), "rpc-77");
    }

    #[test]
    fn grpc_stage_without_id_adds_nothing() {
        let mut req = tonic::Request::new(());
        req.extensions_mut().insert(RequestContext::new());

        let req = LogInjectInterceptor.call(req).unwrap();

        let ctx = req.extensions().get::<RequestContext>().unwrap();
        assert!(ctx.fields().is_empty());
    }
}
