//! Panic recovery for request handlers.
//!
//! [`Logger::panic`](svctmpl_core::Logger::panic) unwinds the current request
//! path. These layers catch the unwind at the transport edge and answer with
//! an internal error, so one request's abort never takes the process down.
//!
//! Panics are reported as `tracing` events. Installed inside the
//! [`ContextSpan`](super::ContextSpan) trace layer, the report is written
//! through the log sink with the request's `request_id`.

use std::any::Any;

use axum::body::Body;
use bytes::Bytes;
use http::{header, HeaderValue, Response, StatusCode};
use http_body_util::Empty;
use svctmpl_core::LoggedPanic;
use tower_http::catch_panic::CatchPanicLayer;

/// Signature of the panic-to-response converters below.
pub type PanicHandler<B> = fn(Box<dyn Any + Send + 'static>) -> Response<B>;

/// gRPC status code INTERNAL.
const GRPC_STATUS_INTERNAL: &str = "13";

/// Catches handler panics on the HTTP router and responds `500`.
#[must_use]
pub fn http_panic_layer() -> CatchPanicLayer<PanicHandler<Body>> {
    CatchPanicLayer::custom(http_panic_response as PanicHandler<Body>)
}

/// Catches handler panics on the gRPC server and responds with a
/// trailers-only `INTERNAL` status.
#[must_use]
pub fn grpc_panic_layer() -> CatchPanicLayer<PanicHandler<Empty<Bytes>>> {
    CatchPanicLayer::custom(grpc_panic_response as PanicHandler<Empty<Bytes>>)
}

fn http_panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Body> {
    report(payload.as_ref(), "http");
    let body = serde_json::json!({ "error": "internal server error" }).to_string();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

fn grpc_panic_response(payload: Box<dyn Any + Send + 'static>) -> Response<Empty<Bytes>> {
    report(payload.as_ref(), "grpc");
    let mut response = Response::new(Empty::new());
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    headers.insert("grpc-status", HeaderValue::from_static(GRPC_STATUS_INTERNAL));
    headers.insert("grpc-message", HeaderValue::from_static("internal error"));
    response
}

fn report(payload: &(dyn Any + Send), transport: &'static str) {
    let message = panic_message(payload);
    if payload.is::<LoggedPanic>() {
        tracing::warn!(transport, panic = %message, "request aborted by logged panic");
    } else {
        tracing::error!(transport, panic = %message, "request handler panicked");
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(logged) = payload.downcast_ref::<LoggedPanic>() {
        logged.message.clone()
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
