//! Request correlation middleware for HTTP and gRPC.
//!
//! - [`carrier`]: transport-neutral stages and the capability trait
//! - [`request_id`]: correlation stage (extract or generate `X-Request-ID`)
//! - [`log_inject`]: stashes the resolved ID as the `request_id` log field
//! - [`trace`]: framework span carrying the resolved `request_id`
//! - [`panic`]: turns unwinding handlers into internal-error responses
//!
//! The correlation stage must run before log injection. Installed the other
//! way round, records simply lack `request_id`.

pub mod carrier;
pub mod log_inject;
pub mod panic;
pub mod request_id;
pub mod trace;

pub use carrier::{inject_request_id, CorrelationCarrier, CorrelationResolver};
pub use log_inject::{LogInjectInterceptor, LogInjectLayer};
pub use panic::{grpc_panic_layer, http_panic_layer};
pub use request_id::{
    correlation_interceptor, InterceptorChain, RequestIdInterceptor, RequestIdLayer,
};
pub use trace::ContextSpan;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use svctmpl_core::log::testing::MemoryWriter;
    use svctmpl_core::{EntropySource, GenerateError, LogSink, Logger, SinkOptions};

    use super::CorrelationResolver;

    /// Random source that always fails.
    pub(crate) struct FailingEntropy;

    impl EntropySource for FailingEntropy {
        fn fill(&self, _buf: &mut [u8; 16]) -> Result<(), GenerateError> {
            Err(GenerateError::Entropy("no entropy".to_string()))
        }
    }

    pub(crate) fn capture_logger() -> (Logger, MemoryWriter) {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(writer.clone(), SinkOptions::default());
        (Logger::new(Arc::new(sink)), writer)
    }

    pub(crate) fn resolver() -> (CorrelationResolver, MemoryWriter) {
        let (logger, writer) = capture_logger();
        (CorrelationResolver::new(logger), writer)
    }
}
