//! The per-unit failure taxonomy shared across the pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a terminal indexing-unit failure.
///
/// `LlmError` and `ParseError` are retryable up to the runner's attempt
/// ceiling; `DbError` is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexErrorKind {
    /// Agent call failed or produced unusable output after retries.
    LlmError,
    /// Result artifact was not valid structured data.
    ParseError,
    /// A transactional write failed.
    DbError,
    /// Anything unclassified.
    Unknown,
}

impl IndexErrorKind {
    /// Status-snapshot string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmError => "llm_error",
            Self::ParseError => "parse_error",
            Self::DbError => "db_error",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a failure of this kind may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmError | Self::ParseError)
    }
}

/// A classified indexing-unit failure with its message.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", .kind.as_str())]
pub struct IndexError {
    /// Failure classification.
    pub kind: IndexErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl IndexError {
    /// Create a classified failure.
    pub fn new(kind: IndexErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an `llm_error`.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::LlmError, message)
    }

    /// Shorthand for a `parse_error`.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::ParseError, message)
    }

    /// Shorthand for a `db_error`.
    pub fn db(message: impl Into<String>) -> Self {
        Self::new(IndexErrorKind::DbError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(IndexErrorKind::LlmError.is_retryable());
        assert!(IndexErrorKind::ParseError.is_retryable());
        assert!(!IndexErrorKind::DbError.is_retryable());
        assert!(!IndexErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = IndexError::parse("artifact was not JSON");
        assert_eq!(err.to_string(), "parse_error: artifact was not JSON");
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&IndexErrorKind::LlmError).unwrap();
        assert_eq!(json, "\"llm_error\"");
    }
}
