//! Correlation identifiers for inbound requests.
//!
//! Every request gets exactly one [`CorrelationId`]: copied verbatim from the
//! inbound `X-Request-ID` header (or gRPC metadata entry) when the caller
//! supplied one, otherwise generated locally as a random UUID v4.
//!
//! Generation reads from an injectable [`EntropySource`]. When the source
//! fails, a timestamp-derived fallback is used and the failure is logged at
//! error severity; a request is never rejected because an ID could not be
//! generated.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::TryRngCore;
use serde::{Serialize, Serializer};
use uuid::Builder;

use crate::field::Field;
use crate::log::Logger;

/// Display form of the correlation header, as documented for clients.
pub const HEADER_NAME: &str = "X-Request-ID";

/// Wire form of the correlation header. HTTP/2 and gRPC metadata keys are
/// lowercase.
pub const HEADER_KEY: &str = "x-request-id";

/// Log field under which the resolved correlation ID is stashed.
pub const REQUEST_ID_FIELD: &str = "request_id";

/// Opaque, non-empty per-request identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps `value`, rejecting empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Interprets an inbound header value.
    ///
    /// Returns `None` when the value is blank, which callers treat as "absent"
    /// and answer with [`CorrelationId::generate`]. A non-blank value is kept
    /// byte-for-byte.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        Self::new(value)
    }

    /// Generates a random UUID v4 from `entropy`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] when the entropy source cannot produce bytes.
    pub fn try_generate(entropy: &dyn EntropySource) -> Result<Self, GenerateError> {
        let mut bytes = [0u8; 16];
        entropy.fill(&mut bytes)?;
        let uuid = Builder::from_random_bytes(bytes).into_uuid();
        Ok(Self(uuid.hyphenated().to_string()))
    }

    /// Best-effort identifier built from two wall-clock integers: unix seconds
    /// followed by the sub-second nanoseconds. Not cryptographically random.
    #[must_use]
    pub fn fallback() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(format!("{}{}", now.as_secs(), now.subsec_nanos()))
    }

    /// Generates an identifier, falling back to [`CorrelationId::fallback`]
    /// when `entropy` fails. The failure is logged on `logger` at error
    /// severity.
    pub fn generate(entropy: &dyn EntropySource, logger: &Logger) -> Self {
        match Self::try_generate(entropy) {
            Ok(id) => id,
            Err(err) => {
                logger.error("generate request id failed", &[Field::error(&err)]);
                Self::fallback()
            }
        }
    }

    /// The identifier exactly as received or generated.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Errors raised while generating a correlation ID.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("random source unavailable: {0}")]
    Entropy(String),
}

/// Source of random bytes for ID generation.
///
/// Abstracted so tests can simulate an exhausted or unavailable random
/// source. The default implementation ([`OsEntropy`]) reads from the
/// operating system.
pub trait EntropySource: Send + Sync {
    /// Fills `buf` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::Entropy`] when no bytes can be produced.
    fn fill(&self, buf: &mut [u8; 16]) -> Result<(), GenerateError>;
}

/// Operating-system random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8; 16]) -> Result<(), GenerateError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| GenerateError::Entropy(e.to_string()))
    }
}
