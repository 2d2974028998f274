//! Opportunistic low-confidence edge creation.
//!
//! Ordinary read/search traffic densifies the graph as a side effect: a
//! search links matched concepts to every chunk in the result set, and a
//! chunk read links the chunk to every concept its title/content mentions.
//! Each call creates at most [`MAX_AMORTISED_EDGES`] new edges, never
//! duplicates an existing (source, target) pair, and swallows every
//! failure; this path must never fail the operation it augments.

use std::sync::Arc;

use tracing::{debug, warn};

use ogma_types::{Concept, EntityKind, Provenance, RelationKind, Relationship};

use crate::error::Result;
use crate::matching::normalize_for_match;
use crate::store::{GraphStore, relationship_ops};

/// Hard cap on new edges per amortisation call.
pub const MAX_AMORTISED_EDGES: usize = 10;

/// Outcome of one amortisation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AmortiseOutcome {
    /// New edges created.
    pub created: usize,
    /// Concepts that matched the query or chunk text.
    pub matched_concepts: usize,
}

/// How strongly a concept matched, ordered weakest-first so stronger
/// matches sort last.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
enum MatchStrength {
    Alias,
    ContentOnly,
    Substring,
    TitleOnly,
    TitleAndContent,
    ExactName,
}

impl MatchStrength {
    fn confidence(self) -> f64 {
        match self {
            Self::ExactName => 0.5,
            Self::TitleAndContent => 0.45,
            Self::Substring => 0.4,
            Self::TitleOnly => 0.4,
            Self::ContentOnly => 0.3,
            Self::Alias => 0.3,
        }
    }
}

/// Best-effort graph densifier driven by read/search traffic.
pub struct Amortiser {
    store: Arc<GraphStore>,
}

impl Amortiser {
    /// Create an amortiser over the shared graph store.
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Amortise a search: link concepts matching the query to every chunk
    /// in the result set.
    ///
    /// Infallible by design; failures are logged and produce an empty
    /// outcome.
    pub fn on_search(
        &self,
        session_id: &str,
        query: &str,
        result_chunk_ids: &[String],
    ) -> AmortiseOutcome {
        match self.try_on_search(session_id, query, result_chunk_ids) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Search amortisation failed");
                AmortiseOutcome::default()
            }
        }
    }

    /// Amortise a chunk read: link the chunk to every concept its title or
    /// content mentions.
    ///
    /// Infallible by design; failures are logged and produce an empty
    /// outcome.
    pub fn on_read(&self, session_id: &str, chunk_id: &str) -> AmortiseOutcome {
        match self.try_on_read(session_id, chunk_id) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session_id = %session_id, chunk_id = %chunk_id, error = %e, "Read amortisation failed");
                AmortiseOutcome::default()
            }
        }
    }

    fn try_on_search(
        &self,
        session_id: &str,
        query: &str,
        result_chunk_ids: &[String],
    ) -> Result<AmortiseOutcome> {
        let query_norm = normalize_for_match(query);
        if query_norm.is_empty() || result_chunk_ids.is_empty() {
            return Ok(AmortiseOutcome::default());
        }

        let concepts = self.store.list_session_concepts(session_id)?;
        let mut matched: Vec<(Concept, MatchStrength)> = concepts
            .into_iter()
            .filter_map(|c| match_query(&query_norm, &c).map(|s| (c, s)))
            .collect();
        // Strongest matches first so the cap spends its budget well
        matched.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let matched_concepts = matched.len();
        let mut candidates = Vec::new();
        for (concept, strength) in &matched {
            for chunk_id in result_chunk_ids {
                candidates.push((
                    chunk_id.clone(),
                    chunk_id.clone(),
                    concept.clone(),
                    strength.confidence(),
                ));
            }
        }

        let created = self.insert_capped(session_id, candidates)?;
        debug!(
            session_id = %session_id,
            matched_concepts,
            created,
            "Search amortisation complete"
        );
        Ok(AmortiseOutcome {
            created,
            matched_concepts,
        })
    }

    fn try_on_read(&self, session_id: &str, chunk_id: &str) -> Result<AmortiseOutcome> {
        let Some(chunk) = self.store.get_chunk(chunk_id)? else {
            return Ok(AmortiseOutcome::default());
        };
        let title = normalize_for_match(&chunk.title);
        let content = normalize_for_match(&chunk.content);

        let concepts = self.store.list_session_concepts(session_id)?;
        let mut matched: Vec<(Concept, MatchStrength)> = concepts
            .into_iter()
            .filter_map(|c| match_chunk(&title, &content, &c).map(|s| (c, s)))
            .collect();
        matched.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let matched_concepts = matched.len();
        let candidates = matched
            .into_iter()
            .map(|(concept, strength)| {
                (
                    chunk.id.clone(),
                    chunk.title.clone(),
                    concept,
                    strength.confidence(),
                )
            })
            .collect();

        let created = self.insert_capped(session_id, candidates)?;
        debug!(
            session_id = %session_id,
            chunk_id = %chunk_id,
            matched_concepts,
            created,
            "Read amortisation complete"
        );
        Ok(AmortiseOutcome {
            created,
            matched_concepts,
        })
    }

    /// Insert chunk→concept edges up to the per-call cap, skipping pairs
    /// that already have any edge between them.
    fn insert_capped(
        &self,
        session_id: &str,
        candidates: Vec<(String, String, Concept, f64)>,
    ) -> Result<usize> {
        if candidates.is_empty() {
            return Ok(0);
        }
        let session_id = session_id.to_string();
        self.store.with_transaction(|conn| {
            let mut created = 0;
            for (chunk_id, chunk_label, concept, confidence) in candidates {
                if created >= MAX_AMORTISED_EDGES {
                    break;
                }
                if relationship_ops::edge_exists_tx(conn, &session_id, &chunk_id, &concept.id)? {
                    continue;
                }
                let rel = Relationship::new(
                    &session_id,
                    EntityKind::Chunk,
                    &chunk_id,
                    &chunk_label,
                    EntityKind::Concept,
                    &concept.id,
                    &concept.name,
                    RelationKind::Mentions,
                )
                .with_confidence(confidence)
                .with_provenance(Provenance::Amortised);
                relationship_ops::insert_relationship_tx(conn, &rel)?;
                created += 1;
            }
            Ok(created)
        })
    }
}

/// Match a concept against a normalized search query.
fn match_query(query_norm: &str, concept: &Concept) -> Option<MatchStrength> {
    let name = normalize_for_match(&concept.name);
    if name.is_empty() {
        return None;
    }
    if name == query_norm {
        return Some(MatchStrength::ExactName);
    }
    if contains_word(query_norm, &name) || contains_word(&name, query_norm) {
        return Some(MatchStrength::Substring);
    }
    let description = normalize_for_match(&concept.description);
    if !description.is_empty() && contains_word(&description, query_norm) {
        return Some(MatchStrength::Substring);
    }
    for alias in &concept.aliases {
        let alias = normalize_for_match(alias);
        if !alias.is_empty() && (alias == query_norm || contains_word(query_norm, &alias)) {
            return Some(MatchStrength::Alias);
        }
    }
    None
}

/// Match a concept against a normalized chunk title and content.
fn match_chunk(title: &str, content: &str, concept: &Concept) -> Option<MatchStrength> {
    let name = normalize_for_match(&concept.name);
    if name.is_empty() {
        return None;
    }
    let in_title = contains_word(title, &name);
    let in_content = contains_word(content, &name);
    match (in_title, in_content) {
        (true, true) => return Some(MatchStrength::TitleAndContent),
        (true, false) => return Some(MatchStrength::TitleOnly),
        (false, true) => return Some(MatchStrength::ContentOnly),
        (false, false) => {}
    }
    for alias in &concept.aliases {
        let alias = normalize_for_match(alias);
        if !alias.is_empty() && (contains_word(title, &alias) || contains_word(content, &alias)) {
            return Some(MatchStrength::Alias);
        }
    }
    None
}

/// Substring containment on word boundaries over normalized text.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }
    haystack
        .match_indices(needle)
        .any(|(i, _)| {
            let before_ok = i == 0 || haystack.as_bytes()[i - 1] == b' ';
            let end = i + needle.len();
            let after_ok = end == haystack.len() || haystack.as_bytes()[end] == b' ';
            before_ok && after_ok
        })
}
