//! Graph domain model: resources, chunks, concepts, relationships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Resources
// ─────────────────────────────────────────────────────────────────────────────

/// How a resource participates in the indexing run.
///
/// Foundation material (lecture notes, specifications) is processed first
/// and sequentially so its concepts exist before dependent material runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Primary material whose concepts seed the session graph.
    Foundation,
    /// Material that links against previously seeded concepts.
    Linking,
}

impl ResourceKind {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Linking => "linking",
        }
    }

    /// Parse the database string form. Unknown values map to `Linking`.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "foundation" => Self::Foundation,
            _ => Self::Linking,
        }
    }
}

/// A study-material unit: one or more source files treated as one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique identifier.
    pub id: String,
    /// Session this resource belongs to.
    pub session_id: String,
    /// Display title.
    pub title: String,
    /// Foundation vs. linking material.
    pub kind: ResourceKind,
    /// Whether content processing has completed.
    pub indexed: bool,
    /// Whether graph indexing has completed.
    pub graph_indexed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Create a new, unindexed resource.
    pub fn new(
        session_id: impl Into<String>,
        title: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            title: title.into(),
            kind,
            indexed: false,
            graph_indexed: false,
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunks
// ─────────────────────────────────────────────────────────────────────────────

/// Node type of a chunk in a resource's content tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Section,
    Definition,
    Theorem,
    Example,
    Question,
    #[serde(other)]
    Other,
}

impl ChunkKind {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Definition => "definition",
            Self::Theorem => "theorem",
            Self::Example => "example",
            Self::Question => "question",
            Self::Other => "other",
        }
    }

    /// Parse the database string form.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "section" => Self::Section,
            "definition" => Self::Definition,
            "theorem" => Self::Theorem,
            "example" => Self::Example,
            "question" => Self::Question,
            _ => Self::Other,
        }
    }
}

/// A node in a resource's hierarchical content tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier.
    pub id: String,
    /// Owning resource.
    pub resource_id: String,
    /// Parent chunk, `None` for roots.
    pub parent_id: Option<String>,
    /// Heading/title text.
    pub title: String,
    /// Body content.
    pub content: String,
    /// Depth in the tree (roots are 0).
    pub depth: u32,
    /// Node type.
    pub kind: ChunkKind,
    /// Position among siblings, for stable ordering.
    pub position: u32,
}

impl Chunk {
    /// Create a root-level section chunk.
    pub fn new(
        resource_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            parent_id: None,
            title: title.into(),
            content: content.into(),
            depth: 0,
            kind: ChunkKind::Section,
            position: 0,
        }
    }

    /// Set the node type.
    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the parent and depth.
    pub fn with_parent(mut self, parent_id: impl Into<String>, depth: u32) -> Self {
        self.parent_id = Some(parent_id.into());
        self.depth = depth;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Concepts
// ─────────────────────────────────────────────────────────────────────────────

/// Where a graph row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Created by the indexing pipeline itself (replaced on reindex).
    System,
    /// Created directly by an extraction agent.
    Agent,
    /// Created opportunistically by read/search amortisation.
    Amortised,
}

impl Provenance {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Agent => "agent",
            Self::Amortised => "amortised",
        }
    }

    /// Parse the database string form. Unknown values map to `System`.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "agent" => Self::Agent,
            "amortised" => Self::Amortised,
            _ => Self::System,
        }
    }
}

/// A canonical, session-scoped topic.
///
/// Names are Title Case and unique per session after canonicalization;
/// merged duplicates live on in the alias list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    /// Unique identifier.
    pub id: String,
    /// Session this concept belongs to.
    pub session_id: String,
    /// Canonical Title Case name.
    pub name: String,
    /// Description, possibly empty until backfilled.
    pub description: String,
    /// Alternate names folded in by merges and re-mentions.
    pub aliases: Vec<String>,
    /// Who created the concept.
    pub provenance: Provenance,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Concept {
    /// Create a new concept with an already-canonical name.
    pub fn new(
        session_id: impl Into<String>,
        name: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            name: name.into(),
            description: String::new(),
            aliases: Vec::new(),
            provenance,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationships
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of graph entity a relationship endpoint refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Resource,
    Chunk,
    Question,
    Concept,
}

impl EntityKind {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resource => "resource",
            Self::Chunk => "chunk",
            Self::Question => "question",
            Self::Concept => "concept",
        }
    }

    /// Parse the database string form. Unknown values map to `Concept`.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "resource" => Self::Resource,
            "chunk" => Self::Chunk,
            "question" => Self::Question,
            _ => Self::Concept,
        }
    }
}

/// Typed relationship kinds supported in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Source first introduces the target concept.
    Introduces,
    /// Source explains or elaborates the target.
    Explains,
    /// Source formally defines the target.
    Defines,
    /// Source assesses understanding of the target.
    Tests,
    /// Source depends on the target being understood first.
    Requires,
    /// Source is a sub-topic of the target.
    PartOf,
    /// Source mentions the target in passing.
    Mentions,
    /// Undirected association between two entities.
    RelatedTo,
    /// The two endpoints make conflicting claims.
    Contradicts,
}

impl RelationKind {
    /// Database string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Introduces => "introduces",
            Self::Explains => "explains",
            Self::Defines => "defines",
            Self::Tests => "tests",
            Self::Requires => "requires",
            Self::PartOf => "part_of",
            Self::Mentions => "mentions",
            Self::RelatedTo => "related_to",
            Self::Contradicts => "contradicts",
        }
    }

    /// Map a freeform label from an agent result to a kind.
    ///
    /// Unknown labels fall back to `RelatedTo`.
    pub fn from_label(label: &str) -> Self {
        match label.to_lowercase().replace([' ', '-'], "_").as_str() {
            "introduces" | "presents" => Self::Introduces,
            "explains" | "elaborates" | "describes" => Self::Explains,
            "defines" | "definition_of" => Self::Defines,
            "tests" | "assesses" | "examines" => Self::Tests,
            "requires" | "depends_on" | "assumes" => Self::Requires,
            "part_of" | "belongs_to" | "subtopic_of" => Self::PartOf,
            "mentions" | "references" | "cites" => Self::Mentions,
            "contradicts" | "conflicts_with" => Self::Contradicts,
            _ => Self::RelatedTo,
        }
    }

    /// Whether endpoint order is meaningless for this kind.
    ///
    /// Symmetric kinds are deduplicated irrespective of direction.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::RelatedTo | Self::Contradicts)
    }
}

/// A typed, confidence-scored directed edge between two graph entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier.
    pub id: String,
    /// Session this relationship belongs to.
    pub session_id: String,
    /// Source endpoint kind.
    pub source_type: EntityKind,
    /// Source endpoint id.
    pub source_id: String,
    /// Human-readable source label (chunk title, concept name, ...).
    pub source_label: String,
    /// Target endpoint kind.
    pub target_type: EntityKind,
    /// Target endpoint id.
    pub target_id: String,
    /// Human-readable target label.
    pub target_label: String,
    /// Relationship kind.
    pub kind: RelationKind,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Who created the row.
    pub provenance: Provenance,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship with a fresh id and the current timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        source_type: EntityKind,
        source_id: impl Into<String>,
        source_label: impl Into<String>,
        target_type: EntityKind,
        target_id: impl Into<String>,
        target_label: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            source_type,
            source_id: source_id.into(),
            source_label: source_label.into(),
            target_type,
            target_id: target_id.into(),
            target_label: target_label.into(),
            kind,
            confidence: 1.0,
            provenance: Provenance::System,
            created_at: Utc::now(),
        }
    }

    /// Set the confidence score, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the provenance.
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Questions
// ─────────────────────────────────────────────────────────────────────────────

/// A structured exam-question record extracted during the enrich phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier.
    pub id: String,
    /// Owning resource.
    pub resource_id: String,
    /// Chunk the question was found in, if resolvable.
    pub chunk_id: Option<String>,
    /// Question label (e.g., "2(b)(i)").
    pub label: String,
    /// Mark allocation, if stated.
    pub marks: Option<u32>,
    /// Mark-scheme text, if available.
    pub mark_scheme: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Create a new question record.
    pub fn new(resource_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            resource_id: resource_id.into(),
            chunk_id: None,
            label: label.into(),
            marks: None,
            mark_scheme: None,
            created_at: Utc::now(),
        }
    }
}
