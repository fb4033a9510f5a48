//! Load and validation state.

use serde::{Deserialize, Serialize};

/// Whether a field's value has been provided.
///
/// ```text
/// NotSet --write--> Set
/// NotSet | Set --begin load--> Loading --success--> Set
///                                      --failure--> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    NotSet,
    Set,
    Loading,
    Error,
}

/// Cached verdict of the last validation pass.
///
/// Every write resets it to `Unknown`; the next validation recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "messages")]
pub enum ValidationState {
    #[default]
    Unknown,
    Valid,
    Invalid(Vec<String>),
}

impl ValidationState {
    /// Build a state from collected failure messages.
    pub fn from_messages(messages: Vec<String>) -> Self {
        if messages.is_empty() {
            Self::Valid
        } else {
            Self::Invalid(messages)
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Failure messages, empty unless invalid.
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Invalid(messages) => messages,
            _ => &[],
        }
    }

    /// Add an externally detected failure.
    pub fn push_error(&mut self, message: impl Into<String>) {
        match self {
            Self::Invalid(messages) => messages.push(message.into()),
            _ => *self = Self::Invalid(vec![message.into()]),
        }
    }
}
