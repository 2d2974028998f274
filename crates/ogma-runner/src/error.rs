//! Error types for the runner crate.

use thiserror::Error;

use ogma_types::IndexErrorKind;

/// Errors that can occur supervising one agent task.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The agent executable could not be spawned.
    #[error("Failed to spawn agent: {0}")]
    Spawn(String),

    /// The agent exited with a nonzero status.
    #[error("Agent exited with status {code}")]
    NonZeroExit {
        /// Process exit code (-1 when terminated by signal).
        code: i32,
    },

    /// The result artifact existed but was not valid structured data.
    #[error("Result artifact invalid: {0}")]
    Artifact(String),

    /// Workdir staging or cleanup failed.
    #[error("Workdir error: {0}")]
    Workdir(#[from] std::io::Error),

    /// Snapshot serialization failed.
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] ogma_protocol::ProtocolError),
}

impl RunnerError {
    /// Map into the pipeline failure taxonomy.
    pub fn classify(&self) -> IndexErrorKind {
        match self {
            Self::Spawn(_) | Self::NonZeroExit { .. } => IndexErrorKind::LlmError,
            Self::Artifact(_) => IndexErrorKind::ParseError,
            Self::Workdir(_) | Self::Snapshot(_) => IndexErrorKind::Unknown,
        }
    }

    /// Whether a fresh attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.classify().is_retryable()
    }
}

/// Result type alias for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
