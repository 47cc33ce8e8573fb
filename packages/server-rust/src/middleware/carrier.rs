//! Transport-neutral correlation stages.
//!
//! Both stages are written once against [`CorrelationCarrier`], the small set
//! of capabilities a transport must offer: read and write the correlation
//! header, and read and replace the request's [`RequestContext`]. HTTP
//! requests and gRPC requests each implement it once.

use std::sync::Arc;

use http::HeaderValue;
use svctmpl_core::{
    CorrelationId, EntropySource, Field, Logger, OsEntropy, RequestContext, HEADER_KEY,
    REQUEST_ID_FIELD,
};
use tonic::metadata::MetadataValue;

/// Per-transport access to the correlation header and request context.
pub trait CorrelationCarrier {
    /// Raw inbound correlation value, if present and valid UTF-8.
    fn correlation_header(&self) -> Option<&str>;

    /// Whether the correlation header is present at all, readable or not.
    fn has_correlation_header(&self) -> bool;

    /// Writes `id` as the correlation header so inner layers and response
    /// echo see the resolved value.
    fn set_correlation_header(&mut self, id: &CorrelationId);

    fn context(&self) -> Option<&RequestContext>;

    fn set_context(&mut self, ctx: RequestContext);
}

impl<B> CorrelationCarrier for http::Request<B> {
    fn correlation_header(&self) -> Option<&str> {
        std::str::from_utf8(self.headers().get(HEADER_KEY)?.as_bytes()).ok()
    }

    fn has_correlation_header(&self) -> bool {
        self.headers().contains_key(HEADER_KEY)
    }

    fn set_correlation_header(&mut self, id: &CorrelationId) {
        if let Ok(value) = HeaderValue::from_str(id.as_str()) {
            self.headers_mut().insert(HEADER_KEY, value);
        }
    }

    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }

    fn set_context(&mut self, ctx: RequestContext) {
        self.extensions_mut().insert(ctx);
    }
}

impl<T> CorrelationCarrier for tonic::Request<T> {
    fn correlation_header(&self) -> Option<&str> {
        std::str::from_utf8(self.metadata().get(HEADER_KEY)?.as_encoded_bytes()).ok()
    }

    fn has_correlation_header(&self) -> bool {
        self.metadata().contains_key(HEADER_KEY)
    }

    fn set_correlation_header(&mut self, id: &CorrelationId) {
        if let Ok(value) = MetadataValue::try_from(id.as_str()) {
            self.metadata_mut().insert(HEADER_KEY, value);
        }
    }

    fn context(&self) -> Option<&RequestContext> {
        self.extensions().get::<RequestContext>()
    }

    fn set_context(&mut self, ctx: RequestContext) {
        self.extensions_mut().insert(ctx);
    }
}

/// Resolves the correlation ID for a request: inbound header first,
/// generated otherwise.
///
/// Cloning is cheap; one resolver is shared by every adapter of a process.
#[derive(Clone)]
pub struct CorrelationResolver {
    entropy: Arc<dyn EntropySource>,
    logger: Logger,
}

impl CorrelationResolver {
    /// Resolver backed by the operating-system random source.
    #[must_use]
    pub fn new(logger: Logger) -> Self {
        Self::with_entropy(logger, Arc::new(OsEntropy))
    }

    #[must_use]
    pub fn with_entropy(logger: Logger, entropy: Arc<dyn EntropySource>) -> Self {
        Self { entropy, logger }
    }

    /// Runs the correlation stage on `carrier`.
    ///
    /// A request whose context already carries an ID is left as is: the ID
    /// is resolved once per request and never replaced. A generated ID is
    /// written back only when the header is missing or blank; an inbound
    /// value that is not UTF-8 stays on the request untouched.
    pub fn resolve<C: CorrelationCarrier>(&self, carrier: &mut C) {
        let parent = carrier.context().cloned().unwrap_or_default();
        if parent.correlation_id().is_some() {
            return;
        }

        let raw = carrier.correlation_header();
        let write_back = raw.map_or(!carrier.has_correlation_header(), |v| v.trim().is_empty());
        let inbound = raw.and_then(CorrelationId::from_header);
        let id = match inbound {
            Some(id) => id,
            None => {
                let id = CorrelationId::generate(
                    self.entropy.as_ref(),
                    &self.logger.for_context(&parent),
                );
                if write_back {
                    carrier.set_correlation_header(&id);
                }
                id
            }
        };

        carrier.set_context(parent.with_correlation_id(id));
    }
}

impl std::fmt::Debug for CorrelationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationResolver").finish_non_exhaustive()
    }
}

/// Runs the logging-injection stage on `carrier`: stashes the resolved ID
/// under `request_id`.
///
/// Without a prior correlation stage there is nothing to stash and the
/// request passes through unchanged.
pub fn inject_request_id<C: CorrelationCarrier>(carrier: &mut C) {
    let Some(ctx) = carrier.context() else {
        return;
    };
    let Some(id) = ctx.correlation_id() else {
        return;
    };
    let child = ctx.stash([Field::string(REQUEST_ID_FIELD, id.as_str())]);
    carrier.set_context(child);
}
