//! HTTP handler definitions.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;

pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use svctmpl_core::Logger;

use crate::config::ServiceConfig;
use crate::lifecycle::ShutdownController;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Root logger; handlers derive per-request loggers with
    /// [`Logger::for_context`].
    pub logger: Logger,
    /// Health state and in-flight tracking shared with the gRPC server.
    pub shutdown: Arc<ShutdownController>,
    /// Service identity reported by `/health`.
    pub service: Arc<ServiceConfig>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
