//! HTTP module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. Binding early lets the binary report every listen address
//! (and fail fast on a taken port) before any server begins serving.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use axum::routing::get;
use axum::Router;
use svctmpl_core::{Field, Logger};
use tokio::net::TcpListener;

use super::handlers::{health_handler, liveness_handler, readiness_handler, AppState};
use super::middleware::apply_http_layers;
use crate::config::{HttpConfig, ServiceConfig};
use crate::lifecycle::ShutdownController;
use crate::middleware::CorrelationResolver;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- captures configuration and shared state
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct HttpModule {
    config: HttpConfig,
    listener: Option<TcpListener>,
    state: AppState,
    resolver: CorrelationResolver,
}

impl HttpModule {
    /// Creates a new HTTP module without binding any port.
    #[must_use]
    pub fn new(
        config: HttpConfig,
        service: Arc<ServiceConfig>,
        logger: Logger,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        let resolver = CorrelationResolver::new(logger.clone());
        Self {
            config,
            listener: None,
            state: AppState {
                logger,
                shutdown,
                service,
                start_time: Instant::now(),
            },
            resolver,
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    pub fn build_router(&self) -> Router {
        let routes = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler));

        apply_http_layers(
            routes,
            &self.config,
            self.resolver.clone(),
            Arc::clone(&self.state.shutdown),
        )
        .with_state(self.state.clone())
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound address, whose port differs from the configured one
    /// when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
        let local = listener.local_addr()?;

        self.state.logger.info(
            "http listener bound",
            &[Field::string("addr", local.to_string())],
        );

        self.listener = Some(listener);
        Ok(local)
    }

    /// Serves connections until `shutdown` resolves, then waits for open
    /// connections to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        self.state.logger.info("http server stopped", &[]);
        Ok(())
    }
}
