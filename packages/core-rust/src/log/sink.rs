//! Process-scoped JSON log sink.
//!
//! One record per line:
//!
//! ```text
//! {"level":"info","ts":1718000000.123,"msg":"handled","service":"svctmpl","request_id":"abc-123"}
//! ```
//!
//! Fields follow `msg` in emission order. The writer sits behind a mutex so
//! concurrent requests never interleave partial lines.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::field::{DuplicateKeys, Field};

/// Record severity, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    /// Development panic: logged like an error in production, escalated to a
    /// panic in development mode.
    DPanic,
    Panic,
    Fatal,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::DPanic => "dpanic",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown severity name.
#[derive(Debug, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "dpanic" => Ok(Self::DPanic),
            "panic" => Ok(Self::Panic),
            "fatal" => Ok(Self::Fatal),
            other => Err(ParseSeverityError(other.to_string())),
        }
    }
}

impl From<Severity> for tracing::Level {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Debug => Self::DEBUG,
            Severity::Info => Self::INFO,
            Severity::Warn => Self::WARN,
            Severity::Error | Severity::DPanic | Severity::Panic | Severity::Fatal => Self::ERROR,
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            _ => Self::Error,
        }
    }
}

/// Errors surfaced by the sink.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("failed to encode log record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write log record: {0}")]
    Write(#[source] io::Error),
    #[error("failed to flush log output: {0}")]
    Flush(#[source] io::Error),
    #[error("{count} log records were dropped since the last sync")]
    Dropped { count: u64 },
}

/// Sink behavior knobs.
#[derive(Debug, Clone, Copy)]
pub struct SinkOptions {
    /// Records below this severity are discarded.
    pub min_severity: Severity,
    /// Treatment of repeated keys within one record.
    pub duplicate_keys: DuplicateKeys,
    /// When set, `dpanic` records escalate to a panic.
    pub development: bool,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            min_severity: Severity::Debug,
            duplicate_keys: DuplicateKeys::Append,
            development: false,
        }
    }
}

/// Shared destination for all [`Logger`](super::Logger) handles of a process.
///
/// Created once at startup and flushed with [`LogSink::sync`] at shutdown.
pub struct LogSink {
    writer: Mutex<Box<dyn Write + Send>>,
    options: SinkOptions,
    dropped: AtomicU64,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("options", &self.options)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LogSink {
    pub fn new(writer: impl Write + Send + 'static, options: SinkOptions) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            options,
            dropped: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn stderr(options: SinkOptions) -> Self {
        Self::new(io::stderr(), options)
    }

    #[must_use]
    pub fn stdout(options: SinkOptions) -> Self {
        Self::new(io::stdout(), options)
    }

    #[must_use]
    pub fn options(&self) -> SinkOptions {
        self.options
    }

    #[must_use]
    pub fn enabled(&self, severity: Severity) -> bool {
        severity >= self.options.min_severity
    }

    /// Encodes and writes one record made of `groups` of fields, in order.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Encode`] or [`LogError::Write`]; the record is lost
    /// in either case.
    pub fn write(
        &self,
        severity: Severity,
        msg: &str,
        groups: &[&[Field]],
    ) -> Result<(), LogError> {
        if !self.enabled(severity) {
            return Ok(());
        }
        let fields = self
            .options
            .duplicate_keys
            .apply(groups.iter().flat_map(|group| group.iter()));
        let record = Record {
            level: severity,
            ts: unix_seconds(),
            msg,
            fields: &fields,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        self.writer.lock().write_all(&line).map_err(LogError::Write)
    }

    /// Counts a record that could not be written so the next
    /// [`sync`](Self::sync) can report it.
    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Flush`] when the writer fails to flush, or
    /// [`LogError::Dropped`] when records were lost since the previous sync.
    pub fn sync(&self) -> Result<(), LogError> {
        self.writer.lock().flush().map_err(LogError::Flush)?;
        match self.dropped.swap(0, Ordering::Relaxed) {
            0 => Ok(()),
            count => Err(LogError::Dropped { count }),
        }
    }
}

struct Record<'a> {
    level: Severity,
    ts: f64,
    msg: &'a str,
    fields: &'a [&'a Field],
}

// Hand-written so repeated keys are emitted as-is instead of collapsing into a map.
impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.fields.len()))?;
        map.serialize_entry("level", self.level.as_str())?;
        map.serialize_entry("ts", &self.ts)?;
        map.serialize_entry("msg", self.msg)?;
        for field in self.fields {
            map.serialize_entry(field.key(), &field.value)?;
        }
        map.end()
    }
}

fn unix_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::testing::MemoryWriter;

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn tracing_levels_map_onto_severities() {
        assert_eq!(Severity::from(tracing::Level::TRACE), Severity::Debug);
        assert_eq!(Severity::from(tracing::Level::DEBUG), Severity::Debug);
        assert_eq!(Severity::from(tracing::Level::INFO), Severity::Info);
        assert_eq!(Severity::from(tracing::Level::WARN), Severity::Warn);
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
    }

    #[test]
    fn writes_one_json_line_per_record() {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(writer.clone(), SinkOptions::default());
        sink.write(Severity::Info, "first", &[]).unwrap();
        sink.write(Severity::Warn, "second", &[&[Field::int("n", 2)]])
            .unwrap();

        let records = writer.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["level"], "info");
        assert_eq!(records[0]["msg"], "first");
        assert!(records[0]["ts"].is_f64());
        assert_eq!(records[1]["level"], "warn");
        assert_eq!(records[1]["n"], 2);
    }

    #[test]
    fn skips_records_below_min_severity() {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(
            writer.clone(),
            SinkOptions {
                min_severity: Severity::Warn,
                ..SinkOptions::default()
            },
        );
        sink.write(Severity::Info, "quiet", &[]).unwrap();
        sink.write(Severity::Error, "loud", &[]).unwrap();
        assert_eq!(writer.lines().len(), 1);
        assert!(writer.lines()[0].contains("\"loud\""));
    }

    #[test]
    fn append_policy_writes_duplicate_keys() {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(writer.clone(), SinkOptions::default());
        sink.write(
            Severity::Info,
            "dup",
            &[&[Field::string("k", "ctx")], &[Field::string("k", "call")]],
        )
        .unwrap();
        let line = &writer.lines()[0];
        assert!(line.contains(r#""k":"ctx","k":"call""#), "{line}");
    }

    #[test]
    fn last_write_wins_policy_collapses_keys() {
        let writer = MemoryWriter::new();
        let sink = LogSink::new(
            writer.clone(),
            SinkOptions {
                duplicate_keys: DuplicateKeys::LastWriteWins,
                ..SinkOptions::default()
            },
        );
        sink.write(
            Severity::Info,
            "dup",
            &[&[Field::string("k", "ctx")], &[Field::string("k", "call")]],
        )
        .unwrap();
        let line = &writer.lines()[0];
        assert_eq!(line.matches("\"k\"").count(), 1, "{line}");
        assert_eq!(writer.records()[0]["k"], "call");
    }

    #[test]
    fn write_failure_is_returned() {
        let sink = LogSink::new(BrokenWriter, SinkOptions::default());
        let err = sink.write(Severity::Info, "lost", &[]).unwrap_err();
        assert!(matches!(err, LogError::Write(_)));
    }

    #[test]
    fn sync_reports_flush_failure() {
        let sink = LogSink::new(BrokenWriter, SinkOptions::default());
        assert!(matches!(sink.sync(), Err(LogError::Flush(_))));
    }

    #[test]
    fn sync_reports_and_resets_dropped_records() {
        let sink = LogSink::new(MemoryWriter::new(), SinkOptions::default());
        sink.record_drop();
        sink.record_drop();
        assert!(matches!(sink.sync(), Err(LogError::Dropped { count: 2 })));
        assert!(sink.sync().is_ok());
    }

    #[test]
    fn severity_parses_names_and_aliases() {
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("dpanic".parse::<Severity>().unwrap(), Severity::DPanic);
        assert!("verbose".parse::<Severity>().is_err());
        assert!(Severity::Debug < Severity::Fatal);
    }
}
