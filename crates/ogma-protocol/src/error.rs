//! Error types for the protocol crate.

use thiserror::Error;

/// Errors that can occur speaking the tool protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Message was not valid JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Framing or semantic protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Snapshot directory missing or unreadable.
    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl ProtocolError {
    /// Convenience constructor for protocol violations.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
