//! Context-aware structured logging facade.
//!
//! A [`Logger`] is a cheap handle onto the process [`LogSink`] plus two field
//! groups: fields bound permanently with [`Logger::with`], and fields
//! snapshotted from a [`RequestContext`] by [`Logger::for_context`]. Every
//! record carries bound fields first, then context fields, then the
//! call-site fields.
//!
//! There is no global logger. The root handle is built once at startup and
//! passed to whatever needs it.

mod sink;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::fmt;
use std::sync::Arc;

pub use sink::{LogError, LogSink, ParseSeverityError, Severity, SinkOptions};

use crate::context::RequestContext;
use crate::field::Field;

/// Panic payload raised by [`Logger::panic`] after the record is written.
///
/// Transport adapters that catch panics can downcast to this type to tell a
/// logged, deliberate abort apart from an unexpected one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedPanic {
    pub message: String,
}

impl fmt::Display for LoggedPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Logging handle bound to a set of fields.
#[derive(Debug, Clone)]
pub struct Logger {
    sink: Arc<LogSink>,
    bound: Arc<[Field]>,
    context: Arc<[Field]>,
}

impl Logger {
    /// Root logger with no bound fields.
    #[must_use]
    pub fn new(sink: Arc<LogSink>) -> Self {
        Self {
            sink,
            bound: Arc::from([]),
            context: Arc::from([]),
        }
    }

    /// Snapshots the fields of `ctx` into a new logger. Bound fields are kept;
    /// any previously snapshotted context fields are replaced.
    #[must_use]
    pub fn for_context(&self, ctx: &RequestContext) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            bound: Arc::clone(&self.bound),
            context: ctx.shared_fields(),
        }
    }

    /// Returns a logger with `fields` permanently bound after the existing
    /// bound fields. Context fields are dropped, so the result is a plain
    /// field-bound logger suited to long-lived subsystems.
    #[must_use]
    pub fn with(&self, fields: &[Field]) -> Self {
        let mut bound = Vec::with_capacity(self.bound.len() + fields.len());
        bound.extend_from_slice(&self.bound);
        bound.extend_from_slice(fields);
        Self {
            sink: Arc::clone(&self.sink),
            bound: bound.into(),
            context: Arc::from([]),
        }
    }

    #[must_use]
    pub fn sink(&self) -> &Arc<LogSink> {
        &self.sink
    }

    #[must_use]
    pub fn enabled(&self, severity: Severity) -> bool {
        self.sink.enabled(severity)
    }

    /// Writes one record and reports the outcome.
    ///
    /// # Errors
    ///
    /// Propagates encode and write failures from the sink.
    pub fn log(&self, severity: Severity, msg: &str, fields: &[Field]) -> Result<(), LogError> {
        self.sink
            .write(severity, msg, &[&self.bound, &self.context, fields])
    }

    /// Infallible form of [`Logger::log`] behind the leveled calls. A record
    /// that cannot be written is counted and reported by the next
    /// [`Logger::sync`].
    pub fn emit(&self, severity: Severity, msg: &str, fields: &[Field]) {
        if self.log(severity, msg, fields).is_err() {
            self.sink.record_drop();
        }
    }

    pub fn debug(&self, msg: &str, fields: &[Field]) {
        self.emit(Severity::Debug, msg, fields);
    }

    pub fn info(&self, msg: &str, fields: &[Field]) {
        self.emit(Severity::Info, msg, fields);
    }

    pub fn warn(&self, msg: &str, fields: &[Field]) {
        self.emit(Severity::Warn, msg, fields);
    }

    pub fn error(&self, msg: &str, fields: &[Field]) {
        self.emit(Severity::Error, msg, fields);
    }

    /// Logs at dpanic severity. In development mode this then panics like
    /// [`Logger::panic`]; otherwise handling continues.
    ///
    /// # Panics
    ///
    /// Panics with a [`LoggedPanic`] payload when the sink is in development
    /// mode.
    pub fn dpanic(&self, msg: &str, fields: &[Field]) {
        self.emit(Severity::DPanic, msg, fields);
        if self.sink.options().development {
            std::panic::panic_any(LoggedPanic {
                message: msg.to_string(),
            });
        }
    }

    /// Logs at panic severity, then unwinds the current request path.
    ///
    /// The transport adapters catch the unwind and answer with an internal
    /// error instead of taking the process down.
    ///
    /// # Panics
    ///
    /// Always, with a [`LoggedPanic`] payload.
    pub fn panic(&self, msg: &str, fields: &[Field]) -> ! {
        self.emit(Severity::Panic, msg, fields);
        std::panic::panic_any(LoggedPanic {
            message: msg.to_string(),
        })
    }

    /// Logs at fatal severity, flushes, and exits the process with status 1.
    ///
    /// Reserved for startup invariants; never call it while handling a
    /// request.
    pub fn fatal(&self, msg: &str, fields: &[Field]) -> ! {
        self.emit(Severity::Fatal, msg, fields);
        let _ = self.sink.sync();
        std::process::exit(1)
    }

    /// Flushes the sink. Call once at shutdown.
    ///
    /// # Errors
    ///
    /// See [`LogSink::sync`].
    pub fn sync(&self) -> Result<(), LogError> {
        self.sink.sync()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use super::testing::MemoryWriter;
    use super::*;
    use crate::correlation::CorrelationId;

    fn capture(options: SinkOptions) -> (Logger, MemoryWriter) {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(writer.clone(), options);
        (Logger::new(Arc::new(sink)), writer)
    }

    fn keys(record: &str) -> Vec<String> {
        // Preserves duplicates, unlike parsing into a JSON map.
        let pairs: OrderedPairs = serde_json::from_str(record).unwrap();
        pairs.0.into_iter().map(|(k, _)| k).collect()
    }

    struct OrderedPairs(Vec<(String, serde_json::Value)>);

    impl<'de> serde::Deserialize<'de> for OrderedPairs {
        fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            struct Visitor;
            impl<'de> serde::de::Visitor<'de> for Visitor {
                type Value = OrderedPairs;
                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a JSON object")
                }
                fn visit_map<A: serde::de::MapAccess<'de>>(
                    self,
                    mut map: A,
                ) -> Result<OrderedPairs, A::Error> {
                    let mut out = Vec::new();
                    while let Some(pair) = map.next_entry()? {
                        out.push(pair);
                    }
                    Ok(OrderedPairs(out))
                }
            }
            d.deserialize_map(Visitor)
        }
    }

    #[test]
    fn for_context_attaches_stashed_fields() {
        let (root, writer) = capture(SinkOptions::default());
        let ctx = RequestContext::new()
            .with_correlation_id(CorrelationId::new("abc-123").unwrap())
            .stash([Field::string("request_id", "abc-123")]);

        root.for_context(&ctx).info("handled", &[]);

        let records = writer.records();
        assert_eq!(records[0]["msg"], "handled");
        assert_eq!(records[0]["request_id"], "abc-123");
    }

    #[test]
    fn fields_are_ordered_bound_then_context_then_call_site() {
        let (root, writer) = capture(SinkOptions::default());
        let ctx = RequestContext::new().stash([Field::int("ctx", 1)]);

        root.with(&[Field::string("service", "svctmpl")])
            .for_context(&ctx)
            .warn("ordered", &[Field::bool("call", true)]);

        let line = &writer.lines()[0];
        assert_eq!(keys(line), ["level", "ts", "msg", "service", "ctx", "call"]);
    }

    #[test]
    fn call_site_duplicate_key_is_emitted_after_context_value() {
        let (root, writer) = capture(SinkOptions::default());
        let ctx = RequestContext::new().stash([Field::string("user", "ctx")]);

        root.for_context(&ctx)
            .info("dup", &[Field::string("user", "call")]);

        let line = &writer.lines()[0];
        assert_eq!(keys(line), ["level", "ts", "msg", "user", "user"]);
    }

    #[test]
    fn logger_snapshot_ignores_later_stashes() {
        let (root, writer) = capture(SinkOptions::default());
        let ctx = RequestContext::new().stash([Field::int("a", 1)]);
        let logger = root.for_context(&ctx);
        let _later = ctx.stash([Field::int("b", 2)]);

        logger.info("snapshot", &[]);
        assert!(writer.records()[0].get("b").is_none());
    }

    #[test]
    fn with_drops_context_fields() {
        let (root, writer) = capture(SinkOptions::default());
        let ctx = RequestContext::new().stash([Field::int("ctx", 1)]);

        root.for_context(&ctx)
            .with(&[Field::string("subsystem", "jobs")])
            .info("plain", &[]);

        let record = &writer.records()[0];
        assert_eq!(record["subsystem"], "jobs");
        assert!(record.get("ctx").is_none());
    }

    #[test]
    fn leveled_calls_use_their_severity() {
        let (root, writer) = capture(SinkOptions::default());
        root.debug("d", &[]);
        root.info("i", &[]);
        root.warn("w", &[]);
        root.error("e", &[]);
        let levels: Vec<_> = writer
            .records()
            .iter()
            .map(|r| r["level"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(levels, ["debug", "info", "warn", "error"]);
    }

    #[test]
    fn panic_logs_then_unwinds_with_payload() {
        let (root, writer) = capture(SinkOptions::default());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            root.panic("invariant broken", &[Field::int("code", 7)]);
        }));

        let payload = result.unwrap_err();
        let logged = payload.downcast_ref::<LoggedPanic>().unwrap();
        assert_eq!(logged.message, "invariant broken");

        let record = &writer.records()[0];
        assert_eq!(record["level"], "panic");
        assert_eq!(record["code"], 7);
    }

    #[test]
    fn dpanic_only_unwinds_in_development() {
        let (prod, prod_writer) = capture(SinkOptions::default());
        prod.dpanic("suspicious", &[]);
        assert_eq!(prod_writer.records()[0]["level"], "dpanic");

        let (dev, _) = capture(SinkOptions {
            development: true,
            ..SinkOptions::default()
        });
        let result = panic::catch_unwind(AssertUnwindSafe(|| dev.dpanic("suspicious", &[])));
        assert!(result.is_err());
    }

    #[test]
    fn sync_succeeds_on_healthy_sink() {
        let (root, _) = capture(SinkOptions::default());
        root.info("x", &[]);
        assert!(root.sync().is_ok());
    }
}
