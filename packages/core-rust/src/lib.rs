//! `svctmpl` Core — request correlation IDs, immutable request context, and the
//! context-aware structured logging facade.

pub mod context;
pub mod correlation;
pub mod field;
pub mod log;

pub use context::RequestContext;
pub use correlation::{
    CorrelationId, EntropySource, GenerateError, OsEntropy, HEADER_KEY, HEADER_NAME,
    REQUEST_ID_FIELD,
};
pub use field::{DuplicateKeys, Field, FieldValue};
pub use log::{LogError, LogSink, LoggedPanic, Logger, Severity, SinkOptions};
