//! Immutable per-request context.
//!
//! A [`RequestContext`] is derived, never mutated: every operation returns a
//! new context and leaves its parent untouched. Contexts are cheap to clone
//! and can be shared freely across tasks.

use std::sync::Arc;

use crate::correlation::CorrelationId;
use crate::field::Field;

/// Per-request carrier of the correlation ID and stashed log fields.
///
/// Threaded through request handling by the transport adapters (HTTP request
/// extensions, gRPC request extensions) and read back by
/// [`Logger::for_context`](crate::log::Logger::for_context).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    correlation_id: Option<CorrelationId>,
    fields: Arc<[Field]>,
}

impl RequestContext {
    /// Background context: no correlation ID and no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a child carrying `id`. The parent is not altered.
    #[must_use]
    pub fn with_correlation_id(&self, id: CorrelationId) -> Self {
        Self {
            correlation_id: Some(id),
            fields: Arc::clone(&self.fields),
        }
    }

    /// The correlation ID attached by the nearest derivation, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// Derives a child whose fields are this context's fields followed by
    /// `fields`, in insertion order.
    ///
    /// The child's sequence is always a fresh allocation sized exactly for
    /// the combined fields, so siblings stashed from the same parent never
    /// share storage.
    #[must_use]
    pub fn stash<I>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = Field>,
    {
        let fields = fields.into_iter();
        let mut combined = Vec::with_capacity(self.fields.len() + fields.size_hint().0);
        combined.extend_from_slice(&self.fields);
        combined.extend(fields);
        Self {
            correlation_id: self.correlation_id.clone(),
            fields: combined.into(),
        }
    }

    /// Accumulated fields; empty when nothing was stashed.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub(crate) fn shared_fields(&self) -> Arc<[Field]> {
        Arc::clone(&self.fields)
    }
}
