//! Error types for the indexer crate.

use thiserror::Error;

/// Errors that can abort a whole indexing run.
///
/// Per-unit failures never surface here; they are recorded on batch
/// status and the run continues.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Store access failed before any phase could run.
    #[error("Store error: {0}")]
    Store(#[from] ogma_store::StoreError),

    /// Batch bookkeeping failed (e.g., a batch is already running).
    #[error("Batch error: {0}")]
    Batch(#[from] ogma_batch::BatchError),

    /// A single-unit entry point (e.g., one-resource indexing) failed.
    #[error(transparent)]
    Unit(#[from] ogma_types::IndexError),

    /// No batch or session state to report on.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for indexer operations.
pub type Result<T> = std::result::Result<T, IndexerError>;
