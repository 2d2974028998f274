//! Error types for the batch crate.

use thiserror::Error;

/// Errors that can occur managing batches.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A batch is already running for this session.
    #[error("Batch already running for session {0}")]
    AlreadyRunning(String),

    /// No batch is tracked for this session.
    #[error("No batch for session {0}")]
    NotFound(String),
}

/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, BatchError>;
