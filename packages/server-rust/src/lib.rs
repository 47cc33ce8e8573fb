//! `svctmpl` Server — request correlation middleware for HTTP and gRPC, with
//! context-scoped structured logging and an ordered bootstrap lifecycle.

pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod middleware;
pub mod network;
pub mod rpc;

pub use config::{Config, ConfigError};
pub use lifecycle::{Lifecycle, ShutdownController};
pub use network::{Ctx, HttpModule};
pub use rpc::GrpcModule;
