//! gRPC transport: tonic server with the correlation interceptor chain.

pub mod access_log;
pub mod module;

pub use access_log::AccessLog;
pub use module::GrpcModule;
