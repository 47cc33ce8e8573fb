//! Process lifecycle: ordered shutdown stages and OS signal handling.
//!
//! Each subsystem registers a closer as it starts. On shutdown the closers
//! run in reverse registration order, so the subsystem started last is
//! stopped first and logging, started first, is flushed last.

pub mod health;

use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use svctmpl_core::{Field, Logger};

pub use health::{HealthState, InFlightGuard, InFlightLayer, InFlightService, ShutdownController};

type Closer = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered list of named shutdown stages.
pub struct Lifecycle {
    logger: Logger,
    closers: Vec<(&'static str, Closer)>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            closers: Vec::new(),
        }
    }

    /// Registers a shutdown stage.
    pub fn register<F, Fut>(&mut self, name: &'static str, closer: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.closers.push((name, Box::new(move || closer().boxed())));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.closers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closers.is_empty()
    }

    /// Runs every registered stage, last registered first.
    pub async fn shutdown(self) {
        for (name, closer) in self.closers.into_iter().rev() {
            self.logger
                .info("stopping", &[Field::string("stage", name)]);
            closer().await;
        }
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.closers.iter().map(|(name, _)| *name).collect();
        f.debug_struct("Lifecycle").field("stages", &names).finish()
    }
}

/// Resolves on the first SIGINT (Ctrl-C) or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
