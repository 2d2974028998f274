//! Knowledge-graph storage and consistency algorithms for Ogma.
//!
//! This crate owns the SQLite database every other component reads and
//! writes: resources, chunks, concepts, relationships, and question
//! records. On top of the raw store it provides the three consistency
//! layers of the pipeline:
//!
//! - [`ingest::RelationshipStore`]: turns one agent result into
//!   normalized, deduplicated relationship rows, applied transactionally
//!   with delete-then-insert semantics so reindexing is idempotent.
//! - [`cleanup::GraphCleanup`]: session-wide dedup, orphan removal,
//!   referential-integrity repair, and concept merge.
//! - [`amortiser::Amortiser`]: best-effort low-confidence edge creation
//!   driven by ordinary read/search traffic.
//!
//! The database is the sole shared mutable resource; every multi-step
//! mutation runs inside one transaction via [`GraphStore::with_transaction`].

pub mod amortiser;
pub mod cleanup;
pub mod error;
pub mod ingest;
pub mod matching;
mod store;

pub use amortiser::{AmortiseOutcome, Amortiser, MAX_AMORTISED_EDGES};
pub use cleanup::{CleanupStats, GraphCleanup, MergeStats};
pub use error::{Result, StoreError};
pub use ingest::{EnrichReport, IngestReport, RelationshipStore};
pub use store::{GraphStore, SessionStats};
