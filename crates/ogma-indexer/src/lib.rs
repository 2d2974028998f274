//! The session indexing orchestrator.
//!
//! [`PhaseOrchestrator`] composes the store, the agent runner, the work
//! queues, and the batch tracker into one session-wide five-phase run:
//! foundation extraction, linking extraction, cross-linking, cleanup, and
//! enrichment. Upstream callers poll a point-in-time [`BatchStatus`]
//! snapshot and request cooperative cancellation through the tracker.

pub mod error;
pub mod orchestrator;
pub mod status;

pub use error::{IndexerError, Result};
pub use orchestrator::{OrchestratorConfig, PhaseOrchestrator};
pub use status::{
    BatchStatus, CleanupSummary, PhaseOverview, PhaseState, PhaseStatus, ResourceState,
    ResourceStatus,
};
