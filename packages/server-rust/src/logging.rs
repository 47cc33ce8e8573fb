//! Logging bootstrap.
//!
//! Every record of the process goes through one [`LogSink`]:
//! - the root [`Logger`] carries `service` and `version` on every record,
//!   and request handlers derive per-request loggers from it
//! - [`SinkLayer`] forwards `tracing` events (tower-http spans, panic
//!   reports) into the same sink through the root logger, flattening the
//!   fields of enclosing spans into each record

use std::fmt;
use std::sync::Arc;

use svctmpl_core::{Field, FieldValue, LogSink, Logger, Severity, SinkOptions};
use tracing::field::{Field as TracingField, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogConfig, LogOutput, ServiceConfig};

/// Errors raised while installing the logging stack.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Builds the root logger with the service identity bound.
#[must_use]
pub fn build_logger(service: &ServiceConfig, log: &LogConfig) -> Logger {
    let options = SinkOptions {
        min_severity: service.log_level,
        duplicate_keys: log.duplicate_keys,
        development: log.development,
    };
    let sink = match log.output {
        LogOutput::Stderr => LogSink::stderr(options),
        LogOutput::Stdout => LogSink::stdout(options),
    };
    with_identity(&Logger::new(Arc::new(sink)), service)
}

fn with_identity(logger: &Logger, service: &ServiceConfig) -> Logger {
    logger.with(&[
        Field::string("service", service.name.clone()),
        Field::string("version", service.version.clone()),
    ])
}

/// Installs the global `tracing` subscriber, writing through `logger`.
///
/// `RUST_LOG` directives take precedence over the configured level.
///
/// # Errors
///
/// Returns [`LoggingError::Subscriber`] if a global subscriber is already
/// installed.
pub fn init_tracing(service: &ServiceConfig, logger: &Logger) -> Result<(), LoggingError> {
    let level: tracing::Level = service.log_level.into();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(SinkLayer::new(logger.clone()))
        .try_init()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// tracing bridge
// ---------------------------------------------------------------------------

/// `tracing` layer that writes events as [`Logger`] records.
///
/// Span fields are collected when the span is created or recorded and are
/// emitted on every event inside it, outermost span first, followed by the
/// event's own fields and its `target`.
#[derive(Debug, Clone)]
pub struct SinkLayer {
    logger: Logger,
}

impl SinkLayer {
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

/// Fields recorded on a span, stored in its registry extensions.
struct SpanFields(Vec<Field>);

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanFields>() {
            Some(stored) => stored.0.extend(visitor.fields),
            None => extensions.insert(SpanFields(visitor.fields)),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let severity = Severity::from(*metadata.level());
        if !self.logger.enabled(severity) {
            return;
        }

        let mut fields = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(stored) = span.extensions().get::<SpanFields>() {
                    fields.extend(stored.0.iter().cloned());
                }
            }
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        fields.extend(visitor.fields);
        fields.push(Field::string("target", metadata.target()));

        self.logger.emit(severity, &visitor.message, &fields);
    }
}

/// Converts `tracing` values into [`Field`]s; `message` becomes the record
/// message.
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<Field>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push(Field::string(field.name(), value));
        }
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.fields.push(Field::int(field.name(), value));
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.fields.push(Field::uint(field.name(), value));
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.fields.push(Field::float(field.name(), value));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.fields.push(Field::bool(field.name(), value));
    }

    fn record_error(
        &mut self,
        field: &TracingField,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.fields.push(Field::new(
            field.name(),
            FieldValue::Error(value.to_string()),
        ));
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.fields.push(Field::string(field.name(), text));
        }
    }
}
