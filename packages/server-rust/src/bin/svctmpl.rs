//! `svctmpl` binary: loads configuration, starts the gRPC and HTTP servers,
//! and shuts them down in reverse order on SIGINT or SIGTERM.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use svctmpl_core::{Field, Logger};
use svctmpl_server::lifecycle::shutdown_signal;
use svctmpl_server::{
    logging, Config, ConfigError, GrpcModule, HttpModule, Lifecycle, ShutdownController,
};
use tokio_util::sync::CancellationToken;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = match Config::load(&[Path::new(".env")]) {
        Ok(config) => config,
        Err(ConfigError::Invalid(err)) => err.exit(),
    };

    let logger = logging::build_logger(&config.service, &config.log);
    if let Err(err) = logging::init_tracing(&config.service, &logger) {
        logger.fatal("failed to initialize tracing", &[Field::error(&err)]);
    }

    let mut lifecycle = Lifecycle::new(logger.clone());
    let sink_logger = logger.clone();
    lifecycle.register("logging", move || async move {
        if let Err(err) = sink_logger.sync() {
            tracing::warn!(error = %err, "log sink sync failed");
        }
    });

    let shutdown = Arc::new(ShutdownController::new());
    let drain = Arc::clone(&shutdown);
    let drain_logger = logger.clone();
    lifecycle.register("drain", move || async move {
        if !drain.wait_for_drain(DRAIN_TIMEOUT).await {
            drain_logger.warn(
                "drain timeout expired with in-flight requests remaining",
                &[Field::uint("in_flight", drain.in_flight_count())],
            );
        }
    });

    let mut grpc = GrpcModule::new(config.grpc.clone(), logger.clone(), Arc::clone(&shutdown));
    let grpc_addr = start_or_exit(&logger, "grpc", grpc.start().await);
    let grpc_stop = CancellationToken::new();
    let grpc_task = tokio::spawn(grpc.serve(cancelled(grpc_stop.clone())));
    lifecycle.register("grpc", stop_server(grpc_stop, grpc_task, logger.clone()));

    let mut http = HttpModule::new(
        config.http.clone(),
        Arc::new(config.service.clone()),
        logger.clone(),
        Arc::clone(&shutdown),
    );
    let http_addr = start_or_exit(&logger, "http", http.start().await);
    let http_stop = CancellationToken::new();
    let http_task = tokio::spawn(http.serve(cancelled(http_stop.clone())));
    lifecycle.register("http", stop_server(http_stop, http_task, logger.clone()));

    shutdown.set_ready();
    logger.info(
        "starting server",
        &[
            Field::string("http_addr", http_addr.to_string()),
            Field::string("grpc_addr", grpc_addr.to_string()),
        ],
    );

    shutdown_signal().await;
    logger.info("shutting down server", &[]);
    shutdown.trigger_shutdown();
    lifecycle.shutdown().await;
}

fn start_or_exit<T>(logger: &Logger, transport: &'static str, result: anyhow::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => logger.fatal(
            "failed to start listener",
            &[
                Field::string("transport", transport),
                Field::string("error", format!("{err:#}")),
            ],
        ),
    }
}

async fn cancelled(token: CancellationToken) {
    token.cancelled().await;
}

fn stop_server(
    token: CancellationToken,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
    logger: Logger,
) -> impl FnOnce() -> futures_util::future::BoxFuture<'static, ()> + Send + 'static {
    move || {
        Box::pin(async move {
            token.cancel();
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => logger.error(
                    "server exited with error",
                    &[Field::string("error", format!("{err:#}"))],
                ),
                Err(err) => logger.error("server task failed", &[Field::error(&err)]),
            }
        })
    }
}
