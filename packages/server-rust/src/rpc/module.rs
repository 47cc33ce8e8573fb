//! gRPC module with deferred startup lifecycle.
//!
//! Mirrors [`HttpModule`](crate::network::HttpModule): `new()`, then
//! `start()` binds, then `serve()` accepts connections.
//!
//! **Server layers (outermost to innermost):**
//! 1. `InFlight` -- counts the call for graceful drain
//! 2. `RequestId` -- resolves `X-Request-ID` before the span opens
//! 3. `Tracing` -- framework span tagged with the request ID
//! 4. `CatchPanic` -- turns handler panics into status `INTERNAL`
//!
//! Every registered service is then wrapped with [`AccessLog`] and
//! [`correlation_interceptor`], so handlers read the
//! [`RequestContext`](svctmpl_core::RequestContext) from request extensions.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use svctmpl_core::{Field, Logger};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Server;
use tonic_health::ServingStatus;
use tower_http::trace::TraceLayer;

use super::AccessLog;
use crate::config::GrpcConfig;
use crate::lifecycle::{InFlightLayer, ShutdownController};
use crate::middleware::{
    correlation_interceptor, grpc_panic_layer, ContextSpan, CorrelationResolver, RequestIdLayer,
};

/// Manages the gRPC server lifecycle.
pub struct GrpcModule {
    config: GrpcConfig,
    listener: Option<TcpListener>,
    logger: Logger,
    resolver: CorrelationResolver,
    shutdown: Arc<ShutdownController>,
}

impl GrpcModule {
    /// Creates a new gRPC module without binding any port.
    #[must_use]
    pub fn new(config: GrpcConfig, logger: Logger, shutdown: Arc<ShutdownController>) -> Self {
        let resolver = CorrelationResolver::new(logger.clone());
        Self {
            config,
            listener: None,
            logger,
            resolver,
            shutdown,
        }
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind gRPC listener on {addr}"))?;
        let local = listener.local_addr()?;

        self.logger.info(
            "grpc listener bound",
            &[Field::string("addr", local.to_string())],
        );

        self.listener = Some(listener);
        Ok(local)
    }

    /// Serves the standard gRPC health service until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the transport
    /// fails.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };

        let (mut reporter, health) = tonic_health::server::health_reporter();
        reporter.set_service_status("", ServingStatus::Serving).await;

        Server::builder()
            .layer(InFlightLayer::new(Arc::clone(&self.shutdown)))
            .layer(RequestIdLayer::new(self.resolver.clone()))
            .layer(TraceLayer::new_for_grpc().make_span_with(ContextSpan))
            .layer(grpc_panic_layer())
            .add_service(InterceptedService::new(
                AccessLog::new(health, self.logger.clone()),
                correlation_interceptor(self.resolver.clone()),
            ))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        self.logger.info("grpc server stopped", &[]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use svctmpl_core::log::testing::MemoryWriter;
    use svctmpl_core::{LogSink, SinkOptions, HEADER_KEY};
    use tokio_util::sync::CancellationToken;
    use tonic::metadata::MetadataValue;
    use tonic_health::pb::health_client::HealthClient;
    use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
    use tonic_health::pb::HealthCheckRequest;

    use super::*;

    fn module() -> (GrpcModule, MemoryWriter) {
        let writer = MemoryWriter::new();
        let logger = Logger::new(Arc::new(LogSink::new(writer.clone(), SinkOptions::default())));
        let config = GrpcConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let module = GrpcModule::new(config, logger, Arc::new(ShutdownController::new()));
        (module, writer)
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let (module, _) = module();
        let err = module.serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn health_check_passes_through_interceptors() {
        let (mut module, writer) = module();
        let addr = module.start().await.unwrap();
        let token = CancellationToken::new();
        let stop = token.clone();
        let server = tokio::spawn(module.serve(async move { stop.cancelled().await }));

        let mut client = connect(addr).await;
        let mut request = tonic::Request::new(HealthCheckRequest {
            service: String::new(),
        });
        request
            .metadata_mut()
            .insert(HEADER_KEY, MetadataValue::from_static("rpc-77"));
        let response = client.check(request).await.unwrap();

        assert_eq!(response.into_inner().status, WireStatus::Serving as i32);

        token.cancel();
        server.await.unwrap().unwrap();
        let records = writer.records();
        let access = records
            .iter()
            .find(|r| r["msg"] == "grpc request")
            .expect("access record written");
        assert_eq!(access["request_id"], "rpc-77");
        assert_eq!(access["method"], "/grpc.health.v1.Health/Check");
        assert!(records.iter().any(|r| r["msg"] == "grpc server stopped"));
    }

    async fn connect(addr: SocketAddr) -> HealthClient<tonic::transport::Channel> {
        let endpoint = format!("http://{addr}");
        for _ in 0..50 {
            if let Ok(channel) = tonic::transport::Endpoint::from_shared(endpoint.clone())
                .expect("valid endpoint uri")
                .connect()
                .await
            {
                return HealthClient::new(channel);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("grpc server did not accept connections at {endpoint}");
    }
}
