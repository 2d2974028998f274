//! Shared types for the Ogma knowledge-graph indexing system.
//!
//! This crate defines the domain model (resources, chunks, concepts,
//! relationships), the structured output an extraction agent submits, and
//! the failure taxonomy every indexing unit is classified under. It has no
//! I/O of its own; the store, runner, and orchestrator crates all build on
//! these types.

pub mod agent;
pub mod error;
pub mod graph;

pub use agent::{
    AgentResult, ChunkLink, ConceptContent, ConceptEntry, ConceptLink, EnrichResult,
    QuestionLink, QuestionRecord, TaskKind, Thoroughness,
};
pub use error::{IndexError, IndexErrorKind};
pub use graph::{
    Chunk, ChunkKind, Concept, EntityKind, Provenance, Question, RelationKind, Relationship,
    Resource, ResourceKind,
};
