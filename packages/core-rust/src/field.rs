//! Typed structured log fields.
//!
//! A [`Field`] is a key plus a [`FieldValue`]. Values are a closed set of
//! variants rather than a dynamically typed blob so every sink can encode
//! them without type assertions.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Value half of a structured log field.
///
/// Encodes to JSON as follows: strings and errors as JSON strings, integers,
/// floats and booleans natively, durations as floating-point seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    Uint(u64),
    /// 64-bit IEEE 754 float.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Rendered error message.
    Error(String),
    /// Elapsed time.
    Duration(Duration),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) | Self::Error(s) => serializer.serialize_str(s),
            Self::Int(n) => serializer.serialize_i64(*n),
            Self::Uint(n) => serializer.serialize_u64(*n),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Duration(d) => serializer.serialize_f64(d.as_secs_f64()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Error(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::Uint(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Duration(d) => write!(f, "{d:?}"),
        }
    }
}

/// A structured log field: key and typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name as it appears in the emitted record.
    pub key: Cow<'static, str>,
    /// Typed value.
    pub value: FieldValue,
}

impl Field {
    /// Creates a field from any key and value.
    pub fn new(key: impl Into<Cow<'static, str>>, value: FieldValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }

    /// String field.
    pub fn string(key: impl Into<Cow<'static, str>>, value: impl Into<String>) -> Self {
        Self::new(key, FieldValue::String(value.into()))
    }

    /// Signed integer field.
    pub fn int(key: impl Into<Cow<'static, str>>, value: i64) -> Self {
        Self::new(key, FieldValue::Int(value))
    }

    /// Unsigned integer field.
    pub fn uint(key: impl Into<Cow<'static, str>>, value: u64) -> Self {
        Self::new(key, FieldValue::Uint(value))
    }

    /// Floating-point field.
    pub fn float(key: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self::new(key, FieldValue::Float(value))
    }

    /// Boolean field.
    pub fn bool(key: impl Into<Cow<'static, str>>, value: bool) -> Self {
        Self::new(key, FieldValue::Bool(value))
    }

    /// Duration field, encoded as floating seconds.
    pub fn duration(key: impl Into<Cow<'static, str>>, value: Duration) -> Self {
        Self::new(key, FieldValue::Duration(value))
    }

    /// Error field under the conventional `error` key.
    pub fn error(err: &(dyn StdError + 'static)) -> Self {
        Self::named_error("error", err)
    }

    /// Error field under a caller-chosen key.
    pub fn named_error(key: impl Into<Cow<'static, str>>, err: &(dyn StdError + 'static)) -> Self {
        Self::new(key, FieldValue::Error(err.to_string()))
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// How an emitted record treats repeated keys.
///
/// Stashing is append-only, so the same key can reach a sink more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateKeys {
    /// Every occurrence is written, in insertion order.
    #[default]
    Append,
    /// Ordered-map semantics: a key keeps the position of its first
    /// occurrence and the value of its last.
    LastWriteWins,
}

impl DuplicateKeys {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::LastWriteWins => "last-write-wins",
        }
    }

    /// Applies the policy to an ordered field sequence.
    #[must_use]
    pub fn apply<'a>(self, fields: impl IntoIterator<Item = &'a Field>) -> Vec<&'a Field> {
        match self {
            Self::Append => fields.into_iter().collect(),
            Self::LastWriteWins => {
                let mut out: Vec<&Field> = Vec::new();
                for field in fields {
                    match out.iter_mut().find(|f| f.key == field.key) {
                        Some(slot) => *slot = field,
                        None => out.push(field),
                    }
                }
                out
            }
        }
    }
}

impl fmt::Display for DuplicateKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown [`DuplicateKeys`] policy.
#[derive(Debug, thiserror::Error)]
#[error("unknown duplicate key policy: {0} (expected `append` or `last-write-wins`)")]
pub struct ParsePolicyError(String);

impl FromStr for DuplicateKeys {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "last-write-wins" | "last_write_wins" => Ok(Self::LastWriteWins),
            other => Err(ParsePolicyError(other.to_string())),
        }
    }
}
