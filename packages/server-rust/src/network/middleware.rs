//! HTTP middleware stack.
//!
//! **Ordering (outermost to innermost):**
//! 1. `InFlight` -- counts the request for graceful drain
//! 2. `RequestId` -- correlation stage: adopt or generate `X-Request-ID`
//! 3. `PropagateRequestId` -- echoes `X-Request-ID` on the response (optional)
//! 4. `LogInject` -- stashes `request_id` into the request context
//! 5. `Tracing` -- framework span tagged with the request ID
//! 6. `CatchPanic` -- turns handler panics into `500`
//! 7. `Timeout` -- answers `408` when a handler runs too long
//!
//! `Router::layer` wraps everything added before it, so the layers below are
//! applied innermost first.

use std::sync::Arc;

use axum::Router;
use http::header::HeaderName;
use http::StatusCode;
use svctmpl_core::HEADER_KEY;
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::lifecycle::{InFlightLayer, ShutdownController};
use crate::middleware::{
    http_panic_layer, ContextSpan, CorrelationResolver, LogInjectLayer, RequestIdLayer,
};

/// Wraps `router` with the full HTTP middleware stack.
pub fn apply_http_layers<S>(
    router: Router<S>,
    config: &HttpConfig,
    resolver: CorrelationResolver,
    shutdown: Arc<ShutdownController>,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let router = router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(http_panic_layer())
        .layer(TraceLayer::new_for_http().make_span_with(ContextSpan))
        .layer(LogInjectLayer);

    let router = if config.echo_request_id {
        router.layer(PropagateRequestIdLayer::new(HeaderName::from_static(HEADER_KEY)))
    } else {
        router
    };

    router
        .layer(RequestIdLayer::new(resolver))
        .layer(InFlightLayer::new(shutdown))
}
