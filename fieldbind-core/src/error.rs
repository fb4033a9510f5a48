//! Error types for value transformation.
//!
//! Field operations never fail loudly: validation problems are data and
//! transformer failures collapse to `None`. These errors exist so that the
//! transformers themselves can report *why* a conversion failed, which is
//! logged before being discarded.

use thiserror::Error;

/// Result type for fallible transformer actions.
pub type Result<T> = std::result::Result<T, FieldError>;

/// Errors produced while converting between field values and wire values.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The wire value has the wrong shape for the target type.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    /// A date string did not match the configured format.
    #[error("could not parse {input:?} with format {format:?}: {source}")]
    DateParse {
        input: String,
        format: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The configured date format contains an invalid specifier.
    #[error("invalid date format {format:?}")]
    InvalidDateFormat { format: String },

    /// A parsed local time does not map to a single instant in the offset.
    #[error("local time {input:?} is ambiguous or does not exist")]
    AmbiguousLocalTime { input: String },

    /// A raw value does not correspond to any variant of the target enum.
    #[error("raw value {raw} does not name a variant of {target}")]
    UnknownRawValue { raw: String, target: &'static str },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FieldError {
    /// Build a [`FieldError::TypeMismatch`] describing the offending value.
    pub fn mismatch(expected: &'static str, found: &serde_json::Value) -> Self {
        let found = match found {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        Self::TypeMismatch {
            expected,
            found: found.to_string(),
        }
    }
}
