//! Turns agent results into normalized graph rows.
//!
//! One extraction result is applied in a single transaction that first
//! deletes every previously system-created relationship for the resource,
//! its chunks, and its questions, so reindexing a resource is idempotent
//! and never leaves stale edges. Concepts are upserted by canonical name;
//! chunk and question references are resolved through the matching ladders
//! before any row is written.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, warn};

use ogma_types::{
    AgentResult, Concept, ConceptLink, EnrichResult, EntityKind, Provenance, Question,
    RelationKind, Relationship,
};

use crate::error::{Result, StoreError};
use crate::matching::{canonicalize_concept_name, resolve_chunk, resolve_question};
use crate::store::{
    GraphStore, chunk_ops, concept_ops, question_ops, relationship_ops, resource_ops,
};

/// Counts from applying one extraction result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Concepts newly created.
    pub concepts_created: usize,
    /// Existing concepts whose description or aliases were extended.
    pub concepts_updated: usize,
    /// Stale system relationships removed before insertion.
    pub relationships_removed: usize,
    /// Relationship rows inserted.
    pub relationships_inserted: usize,
    /// Links dropped (in-batch duplicates, self-loops, unusable names).
    pub links_skipped: usize,
}

/// Counts from applying one enrichment result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    /// Question records newly inserted.
    pub questions_inserted: usize,
    /// Question records updated in place (label already existed).
    pub questions_updated: usize,
    /// Stale question records removed (with their system relationships).
    pub questions_removed: usize,
    /// Concept descriptions backfilled.
    pub descriptions_backfilled: usize,
}

/// Applies agent results to the graph store transactionally.
pub struct RelationshipStore {
    store: Arc<GraphStore>,
}

impl RelationshipStore {
    /// Create a new relationship store over the shared graph store.
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Apply one extraction result for a resource.
    ///
    /// Runs delete-then-insert inside a single transaction and marks the
    /// resource graph-indexed on success.
    pub fn apply_extraction(&self, resource_id: &str, result: &AgentResult) -> Result<IngestReport> {
        let resource_id = resource_id.to_string();
        self.store.with_transaction(|conn| {
            let resource = get_resource_tx(conn, &resource_id)?;
            let chunks = chunk_ops::list_resource_chunks_tx(conn, &resource_id)?;
            let questions = question_ops::list_resource_questions_tx(conn, &resource_id)?;

            let mut report = IngestReport::default();
            report.relationships_removed = relationship_ops::delete_system_relationships_tx(
                conn,
                &resource.session_id,
                &resource_id,
            )?;

            let mut resolver = ConceptResolver::new(&resource.session_id);

            // Upsert explicitly listed concepts first so descriptions and
            // aliases land even when no link references them.
            for entry in &result.concepts {
                if resolver
                    .resolve(conn, &entry.name, &entry.description, &entry.aliases, &mut report)?
                    .is_none()
                {
                    report.links_skipped += 1;
                }
            }

            let mut seen: HashSet<(EntityKind, String, EntityKind, String, RelationKind)> =
                HashSet::new();

            for link in &result.chunk_links {
                let Some(concept) = resolver.resolve(conn, &link.concept_name, "", &[], &mut report)?
                else {
                    report.links_skipped += 1;
                    continue;
                };
                let kind = RelationKind::from_label(&link.relationship);
                let (source_type, source_id, source_label) = match resolve_chunk(&link.chunk_title, &chunks)
                {
                    Some(chunk) => (EntityKind::Chunk, chunk.id.clone(), chunk.title.clone()),
                    None => (
                        EntityKind::Resource,
                        resource.id.clone(),
                        resource.title.clone(),
                    ),
                };
                insert_unique(
                    conn,
                    &mut seen,
                    &mut report,
                    Relationship::new(
                        &resource.session_id,
                        source_type,
                        source_id,
                        source_label,
                        EntityKind::Concept,
                        &concept.id,
                        &concept.name,
                        kind,
                    )
                    .with_confidence(link.confidence.unwrap_or(1.0)),
                )?;
            }

            for link in &result.question_links {
                let Some(concept) = resolver.resolve(conn, &link.concept_name, "", &[], &mut report)?
                else {
                    report.links_skipped += 1;
                    continue;
                };
                let kind = RelationKind::from_label(&link.relationship);
                let (source_type, source_id, source_label) =
                    match resolve_question(&link.question_label, &questions) {
                        Some(question) => {
                            (EntityKind::Question, question.id.clone(), question.label.clone())
                        }
                        None => (
                            EntityKind::Resource,
                            resource.id.clone(),
                            resource.title.clone(),
                        ),
                    };
                insert_unique(
                    conn,
                    &mut seen,
                    &mut report,
                    Relationship::new(
                        &resource.session_id,
                        source_type,
                        source_id,
                        source_label,
                        EntityKind::Concept,
                        &concept.id,
                        &concept.name,
                        kind,
                    )
                    .with_confidence(link.confidence.unwrap_or(1.0)),
                )?;
            }

            for link in &result.concept_links {
                apply_concept_link_tx(conn, &resource.session_id, link, &mut resolver, &mut seen, &mut report)?;
            }

            resource_ops::set_graph_indexed_tx(conn, &resource_id)?;

            debug!(
                resource_id = %resource_id,
                removed = report.relationships_removed,
                inserted = report.relationships_inserted,
                concepts_created = report.concepts_created,
                "Extraction result applied"
            );

            Ok(report)
        })
    }

    /// Apply a cross-link result for a whole session.
    ///
    /// Only the concept list and concept-to-concept links are consulted.
    /// Existing edges (in either direction for symmetric kinds) are left
    /// alone; returns the number of links added.
    pub fn apply_concept_links(&self, session_id: &str, result: &AgentResult) -> Result<usize> {
        let session_id = session_id.to_string();
        self.store.with_transaction(|conn| {
            let mut report = IngestReport::default();
            let mut resolver = ConceptResolver::new(&session_id);
            let mut seen = HashSet::new();

            for entry in &result.concepts {
                resolver.resolve(conn, &entry.name, &entry.description, &entry.aliases, &mut report)?;
            }
            for link in &result.concept_links {
                apply_concept_link_tx(conn, &session_id, link, &mut resolver, &mut seen, &mut report)?;
            }

            debug!(
                session_id = %session_id,
                links_added = report.relationships_inserted,
                skipped = report.links_skipped,
                "Cross-link result applied"
            );

            Ok(report.relationships_inserted)
        })
    }

    /// Apply one enrichment result for a resource.
    ///
    /// Question records are reconciled by label: existing labels are
    /// updated in place (keeping their ids and any relationships pointing
    /// at them), new labels are inserted, and stale records are removed
    /// together with their system relationships. Concept descriptions are
    /// backfilled only where currently empty.
    pub fn apply_enrichment(&self, resource_id: &str, result: &EnrichResult) -> Result<EnrichReport> {
        let resource_id = resource_id.to_string();
        self.store.with_transaction(|conn| {
            let resource = get_resource_tx(conn, &resource_id)?;
            let chunks = chunk_ops::list_resource_chunks_tx(conn, &resource_id)?;
            let existing = question_ops::list_resource_questions_tx(conn, &resource_id)?;
            let mut by_label: HashMap<String, &Question> = existing
                .iter()
                .map(|q| (q.label.trim().to_lowercase(), q))
                .collect();

            let mut report = EnrichReport::default();

            for record in &result.questions {
                let label_key = record.label.trim().to_lowercase();
                if label_key.is_empty() {
                    continue;
                }
                let chunk_id = resolve_chunk(&record.chunk_title, &chunks).map(|c| c.id.clone());

                if let Some(old) = by_label.remove(&label_key) {
                    conn.execute(
                        r#"
                        UPDATE questions SET chunk_id = ?2, marks = ?3, mark_scheme = ?4
                        WHERE id = ?1
                        "#,
                        rusqlite::params![
                            old.id,
                            chunk_id,
                            record.marks.map(|m| m as i64),
                            record.mark_scheme,
                        ],
                    )?;
                    report.questions_updated += 1;
                } else {
                    let mut question = Question::new(&resource_id, record.label.trim());
                    question.chunk_id = chunk_id;
                    question.marks = record.marks;
                    question.mark_scheme = record.mark_scheme.clone();
                    question_ops::insert_question_tx(conn, &question)?;
                    report.questions_inserted += 1;
                }
            }

            // Records the agent no longer reports are stale: remove them and
            // any system relationships still rooted at them.
            for stale in by_label.values() {
                conn.execute(
                    "DELETE FROM relationships WHERE source_id = ?1 AND provenance = 'system'",
                    rusqlite::params![stale.id],
                )?;
                conn.execute(
                    "DELETE FROM questions WHERE id = ?1",
                    rusqlite::params![stale.id],
                )?;
                report.questions_removed += 1;
            }

            for content in &result.concept_content {
                let name = canonicalize_concept_name(&content.concept_name);
                if name.is_empty() || content.content.trim().is_empty() {
                    continue;
                }
                if let Some(concept) =
                    concept_ops::get_concept_by_name_tx(conn, &resource.session_id, &name)?
                {
                    if concept.description.trim().is_empty() {
                        concept_ops::update_description_tx(conn, &concept.id, content.content.trim())?;
                        report.descriptions_backfilled += 1;
                    }
                } else {
                    warn!(concept = %name, "Enrichment referenced unknown concept, skipping");
                }
            }

            debug!(
                resource_id = %resource_id,
                inserted = report.questions_inserted,
                updated = report.questions_updated,
                removed = report.questions_removed,
                backfilled = report.descriptions_backfilled,
                "Enrichment result applied"
            );

            Ok(report)
        })
    }
}

fn get_resource_tx(conn: &Connection, resource_id: &str) -> Result<ogma_types::Resource> {
    resource_ops::get_resource_tx(conn, resource_id)?
        .ok_or_else(|| StoreError::NotFound(format!("resource {resource_id}")))
}

/// Per-transaction concept upsert cache keyed by canonical name.
struct ConceptResolver {
    session_id: String,
    cache: HashMap<String, Concept>,
}

impl ConceptResolver {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            cache: HashMap::new(),
        }
    }

    /// Resolve a raw concept name to its canonical concept, creating it on
    /// first mention and folding in new descriptions/aliases on later ones.
    ///
    /// Returns `None` when the name canonicalizes to nothing usable.
    fn resolve(
        &mut self,
        conn: &Connection,
        raw_name: &str,
        description: &str,
        aliases: &[String],
        report: &mut IngestReport,
    ) -> Result<Option<Concept>> {
        let name = canonicalize_concept_name(raw_name);
        if name.is_empty() {
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(&name) {
            let concept = cached.clone();
            self.fold_updates(conn, &concept, description, aliases, report)?;
            return Ok(Some(self.cache[&name].clone()));
        }

        let concept = match concept_ops::get_concept_by_name_tx(conn, &self.session_id, &name)? {
            Some(existing) => {
                self.cache.insert(name.clone(), existing.clone());
                self.fold_updates(conn, &existing, description, aliases, report)?;
                self.cache[&name].clone()
            }
            None => {
                let mut concept = Concept::new(&self.session_id, &name, Provenance::Agent);
                concept.description = description.trim().to_string();
                concept.aliases = dedup_aliases(&name, &[], aliases);
                concept_ops::insert_concept_tx(conn, &concept)?;
                report.concepts_created += 1;
                self.cache.insert(name.clone(), concept.clone());
                concept
            }
        };

        Ok(Some(concept))
    }

    /// Merge a new description/alias set into an existing concept.
    fn fold_updates(
        &mut self,
        conn: &Connection,
        concept: &Concept,
        description: &str,
        aliases: &[String],
        report: &mut IngestReport,
    ) -> Result<()> {
        let mut updated = concept.clone();
        let mut changed = false;

        if updated.description.trim().is_empty() && !description.trim().is_empty() {
            updated.description = description.trim().to_string();
            concept_ops::update_description_tx(conn, &updated.id, &updated.description)?;
            changed = true;
        }

        let merged = dedup_aliases(&updated.name, &updated.aliases, aliases);
        if merged != updated.aliases {
            updated.aliases = merged;
            concept_ops::update_aliases_tx(conn, &updated.id, &updated.aliases)?;
            changed = true;
        }

        if changed {
            report.concepts_updated += 1;
        }
        self.cache.insert(updated.name.clone(), updated);
        Ok(())
    }
}

/// Merge alias lists, dropping blanks, duplicates, and the canonical name.
fn dedup_aliases(name: &str, existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut out: Vec<String> = existing.to_vec();
    for alias in incoming {
        let alias = alias.trim();
        if alias.is_empty() || alias.eq_ignore_ascii_case(name) {
            continue;
        }
        if !out.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            out.push(alias.to_string());
        }
    }
    out
}

/// Insert a relationship unless the batch already contains its key.
fn insert_unique(
    conn: &Connection,
    seen: &mut HashSet<(EntityKind, String, EntityKind, String, RelationKind)>,
    report: &mut IngestReport,
    rel: Relationship,
) -> Result<()> {
    let key = (
        rel.source_type,
        rel.source_id.clone(),
        rel.target_type,
        rel.target_id.clone(),
        rel.kind,
    );
    if !seen.insert(key) {
        report.links_skipped += 1;
        return Ok(());
    }
    relationship_ops::insert_relationship_tx(conn, &rel)?;
    report.relationships_inserted += 1;
    Ok(())
}

/// Resolve and insert one concept-to-concept link.
fn apply_concept_link_tx(
    conn: &Connection,
    session_id: &str,
    link: &ConceptLink,
    resolver: &mut ConceptResolver,
    seen: &mut HashSet<(EntityKind, String, EntityKind, String, RelationKind)>,
    report: &mut IngestReport,
) -> Result<()> {
    let Some(source) = resolver.resolve(conn, &link.source_concept, "", &[], report)? else {
        report.links_skipped += 1;
        return Ok(());
    };
    let Some(target) = resolver.resolve(conn, &link.target_concept, "", &[], report)? else {
        report.links_skipped += 1;
        return Ok(());
    };
    if source.id == target.id {
        report.links_skipped += 1;
        return Ok(());
    }

    let kind = RelationKind::from_label(&link.relationship);

    // Skip edges already present; symmetric kinds check both directions.
    if relationship_ops::edge_exists_tx(conn, session_id, &source.id, &target.id)?
        || (kind.is_symmetric()
            && relationship_ops::edge_exists_tx(conn, session_id, &target.id, &source.id)?)
    {
        report.links_skipped += 1;
        return Ok(());
    }

    insert_unique(
        conn,
        seen,
        report,
        Relationship::new(
            session_id,
            EntityKind::Concept,
            &source.id,
            &source.name,
            EntityKind::Concept,
            &target.id,
            &target.name,
            kind,
        )
        .with_confidence(link.confidence.unwrap_or(1.0)),
    )
}
