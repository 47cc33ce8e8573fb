//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use svctmpl_core::Field;

use super::AppState;
use crate::lifecycle::HealthState;
use crate::network::Ctx;

/// Returns detailed health information as JSON.
///
/// Always returns 200 -- the `state` field in the response body indicates
/// whether the server is actually healthy. The request's correlation ID is
/// included so callers can match the response to server-side log records.
pub async fn health_handler(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Json<serde_json::Value> {
    let health = state.shutdown.health_state();
    let in_flight = state.shutdown.in_flight_count();
    let uptime_secs = state.start_time.elapsed().as_secs();

    state.logger.for_context(&ctx).debug(
        "health check",
        &[
            Field::string("state", health.as_str()),
            Field::uint("in_flight", in_flight),
        ],
    );

    Json(json!({
        "service": state.service.name,
        "version": state.service.version,
        "state": health.as_str(),
        "in_flight": in_flight,
        "uptime_secs": uptime_secs,
        "request_id": ctx.correlation_id(),
    }))
}

/// Kubernetes liveness probe -- always returns 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe -- returns 200 when ready, 503 otherwise.
///
/// Returns 503 during startup (before `set_ready()` is called), during
/// graceful shutdown (Draining state), and after stop.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
