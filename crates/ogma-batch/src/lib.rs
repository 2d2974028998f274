//! Admission scheduling and batch tracking for Ogma.
//!
//! Two independent bounded-concurrency [`WorkQueue`]s (content processing
//! at ceiling 1, graph indexing at a configurable ceiling) plus the
//! [`SessionBatchTracker`], the in-memory keyed store every indexing unit
//! consults for cooperative cancellation.

pub mod error;
pub mod queue;
pub mod tracker;

pub use error::{BatchError, Result};
pub use queue::{DEFAULT_GRAPH_CEILING, WorkQueue, WorkQueues};
pub use tracker::{BatchSnapshot, SessionBatchTracker};
