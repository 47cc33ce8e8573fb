//! Framework span tagged with the resolved correlation ID.
//!
//! Installed inside the correlation stage on both transports, so
//! `tower-http` request events and panic reports are emitted within a span
//! that carries `request_id`.

use svctmpl_core::RequestContext;
use tower_http::trace::MakeSpan;
use tracing::Span;

/// [`MakeSpan`] reading `request_id` from the request's [`RequestContext`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSpan;

impl<B> MakeSpan<B> for ContextSpan {
    fn make_span(&mut self, request: &http::Request<B>) -> Span {
        let request_id = request
            .extensions()
            .get::<RequestContext>()
            .and_then(RequestContext::correlation_id)
            .map(ToString::to_string)
            .unwrap_or_default();

        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}
