//! Agent task descriptions and the structured results agents submit.
//!
//! One agent run produces at most one [`AgentResult`] (extraction and
//! cross-link tasks) or one [`EnrichResult`] (enrich tasks), written as a
//! JSON artifact through the tool server's single `submit_result` tool.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

/// The kind of work a single agent invocation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Extract concepts and links from one resource's chunk tree.
    Extract,
    /// Analyze the whole session graph for missing concept-to-concept links.
    CrossLink,
    /// Extract structured metadata (questions, concept content) per resource.
    Enrich,
}

impl TaskKind {
    /// Short name used in workdir paths and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::CrossLink => "cross_link",
            Self::Enrich => "enrich",
        }
    }
}

/// Requested effort tier for an agent run.
///
/// Controls the subprocess turn budget and how terse the task instruction
/// is; it never changes the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Thoroughness {
    Quick,
    Thorough,
}

impl Thoroughness {
    /// Turn/step budget handed to the external agent.
    pub fn turn_budget(&self) -> u32 {
        match self {
            Self::Quick => 12,
            Self::Thorough => 40,
        }
    }
}

impl Default for Thoroughness {
    fn default() -> Self {
        Self::Quick
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent results
// ─────────────────────────────────────────────────────────────────────────────

/// A concept mentioned by an agent, before canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptEntry {
    /// Raw concept name as the agent wrote it.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: String,
    /// Optional alternate names.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A link from a chunk (by title) to a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkLink {
    /// Raw concept name; resolved against canonicalized session concepts.
    pub concept_name: String,
    /// Freeform relationship label (mapped to a [`RelationKind`]).
    ///
    /// [`RelationKind`]: crate::graph::RelationKind
    pub relationship: String,
    /// Chunk title as the agent saw it; fuzzily resolved.
    pub chunk_title: String,
    /// Optional confidence; defaults to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A link from a question (by label) to a concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionLink {
    /// Raw concept name.
    pub concept_name: String,
    /// Freeform relationship label.
    pub relationship: String,
    /// Question label or title fragment; resolved by the ladder in the store.
    pub question_label: String,
    /// Optional confidence; defaults to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A concept-to-concept link (the cross-link task's output).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptLink {
    /// Raw source concept name.
    pub source_concept: String,
    /// Raw target concept name.
    pub target_concept: String,
    /// Freeform relationship label.
    pub relationship: String,
    /// Optional confidence; defaults to 1.0.
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// The structured output one extraction or cross-link run submits.
///
/// All lists default to empty so a partial artifact still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    /// Concepts the agent identified.
    #[serde(default)]
    pub concepts: Vec<ConceptEntry>,
    /// Chunk → concept links.
    #[serde(default)]
    pub chunk_links: Vec<ChunkLink>,
    /// Question → concept links.
    #[serde(default)]
    pub question_links: Vec<QuestionLink>,
    /// Concept → concept links.
    #[serde(default)]
    pub concept_links: Vec<ConceptLink>,
}

impl AgentResult {
    /// True if the agent submitted nothing usable.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
            && self.chunk_links.is_empty()
            && self.question_links.is_empty()
            && self.concept_links.is_empty()
    }

    /// Total number of link entries across all three lists.
    pub fn link_count(&self) -> usize {
        self.chunk_links.len() + self.question_links.len() + self.concept_links.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enrichment results
// ─────────────────────────────────────────────────────────────────────────────

/// One extracted question/mark-scheme record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Title of the chunk the question lives in.
    pub chunk_title: String,
    /// Question label (e.g., "2(b)(i)").
    pub label: String,
    /// Mark allocation, if stated.
    #[serde(default)]
    pub marks: Option<u32>,
    /// Mark-scheme text, if available.
    #[serde(default)]
    pub mark_scheme: Option<String>,
}

/// Description backfill for an existing concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptContent {
    /// Concept name (canonicalized on application).
    pub concept_name: String,
    /// Replacement description content.
    pub content: String,
}

/// The structured output one enrich run submits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichResult {
    /// Question records for the resource.
    #[serde(default)]
    pub questions: Vec<QuestionRecord>,
    /// Concept description backfills.
    #[serde(default)]
    pub concept_content: Vec<ConceptContent>,
}
