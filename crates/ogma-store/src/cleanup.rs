//! Session-wide graph consistency passes.
//!
//! Three transactional passes run in sequence: duplicate-relationship
//! removal, orphaned-concept removal, and referential-integrity repair.
//! The integrity pass should find nothing when the first two behave, but
//! it guards against partially written history. A concept merge redirects
//! relationship endpoints onto a canonical concept and then reruns dedup,
//! since merging can reintroduce duplicate edges.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::params;
use tracing::{debug, info, warn};

use ogma_types::Relationship;

use crate::error::{Result, StoreError};
use crate::matching::canonicalize_concept_name;
use crate::store::{GraphStore, concept_ops, relationship_ops};

/// Per-category removal counts from one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Duplicate relationships removed.
    pub duplicates_removed: usize,
    /// Concepts removed for having zero referencing relationships.
    pub orphans_removed: usize,
    /// Relationships removed for referencing a nonexistent concept.
    pub dangling_removed: usize,
}

impl CleanupStats {
    /// Total rows removed across all passes.
    pub fn total(&self) -> usize {
        self.duplicates_removed + self.orphans_removed + self.dangling_removed
    }
}

/// Counts from one concept merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Duplicate concepts deleted.
    pub concepts_merged: usize,
    /// Relationship endpoints redirected onto the canonical concept.
    pub relationships_redirected: usize,
    /// Duplicate relationships removed by the follow-up dedup pass.
    pub duplicates_removed: usize,
}

/// Session-wide dedup, orphan removal, integrity repair, and merge.
pub struct GraphCleanup {
    store: Arc<GraphStore>,
}

impl GraphCleanup {
    /// Create a cleanup runner over the shared graph store.
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Run all three passes in order for one session.
    pub fn run(&self, session_id: &str) -> Result<CleanupStats> {
        let stats = CleanupStats {
            duplicates_removed: self.dedup_pass(session_id)?,
            orphans_removed: self.orphan_pass(session_id)?,
            dangling_removed: self.integrity_pass(session_id)?,
        };

        info!(
            session_id = %session_id,
            duplicates = stats.duplicates_removed,
            orphans = stats.orphans_removed,
            dangling = stats.dangling_removed,
            "Graph cleanup complete"
        );
        Ok(stats)
    }

    /// Remove duplicate relationships.
    ///
    /// Rows are grouped by canonical key; symmetric kinds sort their
    /// endpoints first so A→B and B→A collapse. Within a group the
    /// highest-confidence, earliest-created, lexicographically-smallest-id
    /// row survives.
    pub fn dedup_pass(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.store.with_transaction(|conn| {
            let rows = relationship_ops::list_session_relationships_tx(conn, &session_id)?;

            let mut groups: HashMap<String, Vec<&Relationship>> = HashMap::new();
            for rel in &rows {
                groups.entry(canonical_key(rel)).or_default().push(rel);
            }

            let mut doomed: Vec<String> = Vec::new();
            for group in groups.values() {
                if group.len() < 2 {
                    continue;
                }
                let keeper = group
                    .iter()
                    .min_by(|a, b| {
                        b.confidence
                            .partial_cmp(&a.confidence)
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .then(a.created_at.cmp(&b.created_at))
                            .then(a.id.cmp(&b.id))
                    })
                    .map(|r| r.id.clone())
                    .unwrap_or_default();
                doomed.extend(group.iter().filter(|r| r.id != keeper).map(|r| r.id.clone()));
            }

            let removed = relationship_ops::delete_relationships_tx(conn, &doomed)?;
            debug!(session_id = %session_id, removed, "Dedup pass complete");
            Ok(removed)
        })
    }

    /// Remove concepts referenced by zero surviving relationships.
    pub fn orphan_pass(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.store.with_transaction(|conn| {
            let removed = conn.execute(
                r#"
                DELETE FROM concepts
                WHERE session_id = ?1
                  AND id NOT IN (
                    SELECT source_id FROM relationships
                    WHERE session_id = ?1 AND source_type = 'concept'
                  )
                  AND id NOT IN (
                    SELECT target_id FROM relationships
                    WHERE session_id = ?1 AND target_type = 'concept'
                  )
                "#,
                params![session_id],
            )?;
            debug!(session_id = %session_id, removed, "Orphan pass complete");
            Ok(removed)
        })
    }

    /// Remove relationships referencing a nonexistent concept id.
    ///
    /// Unreachable when dedup/orphan behave, but it closes the door on
    /// partial writes from interrupted runs.
    pub fn integrity_pass(&self, session_id: &str) -> Result<usize> {
        let session_id = session_id.to_string();
        self.store.with_transaction(|conn| {
            let removed = conn.execute(
                r#"
                DELETE FROM relationships
                WHERE session_id = ?1
                  AND (
                    (source_type = 'concept' AND source_id NOT IN (
                        SELECT id FROM concepts WHERE session_id = ?1
                    ))
                    OR
                    (target_type = 'concept' AND target_id NOT IN (
                        SELECT id FROM concepts WHERE session_id = ?1
                    ))
                  )
                "#,
                params![session_id],
            )?;
            debug!(session_id = %session_id, removed, "Integrity pass complete");
            Ok(removed)
        })
    }

    /// Merge duplicate concepts into a canonical one.
    ///
    /// Every relationship endpoint on a duplicate is redirected onto the
    /// canonical concept, the duplicate's name and aliases are folded into
    /// the canonical alias list, the duplicate is deleted, and dedup runs
    /// again over the session.
    pub fn merge_concepts(
        &self,
        session_id: &str,
        canonical_name: &str,
        merge_names: &[String],
    ) -> Result<MergeStats> {
        let session_id = session_id.to_string();
        let canonical_name = canonicalize_concept_name(canonical_name);

        let mut stats = self.store.with_transaction(|conn| {
            let canonical =
                concept_ops::get_concept_by_name_tx(conn, &session_id, &canonical_name)?
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("canonical concept {canonical_name}"))
                    })?;

            let mut stats = MergeStats::default();
            let mut aliases = canonical.aliases.clone();

            for raw in merge_names {
                let name = canonicalize_concept_name(raw);
                if name.is_empty() || name == canonical.name {
                    continue;
                }
                let Some(duplicate) =
                    concept_ops::get_concept_by_name_tx(conn, &session_id, &name)?
                else {
                    warn!(concept = %name, "Merge target not found, skipping");
                    continue;
                };

                let redirected_sources = conn.execute(
                    r#"
                    UPDATE relationships SET source_id = ?3, source_label = ?4
                    WHERE session_id = ?1 AND source_type = 'concept' AND source_id = ?2
                    "#,
                    params![session_id, duplicate.id, canonical.id, canonical.name],
                )?;
                let redirected_targets = conn.execute(
                    r#"
                    UPDATE relationships SET target_id = ?3, target_label = ?4
                    WHERE session_id = ?1 AND target_type = 'concept' AND target_id = ?2
                    "#,
                    params![session_id, duplicate.id, canonical.id, canonical.name],
                )?;
                stats.relationships_redirected += redirected_sources + redirected_targets;

                if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&duplicate.name)) {
                    aliases.push(duplicate.name.clone());
                }
                for alias in &duplicate.aliases {
                    if !alias.eq_ignore_ascii_case(&canonical.name)
                        && !aliases.iter().any(|a| a.eq_ignore_ascii_case(alias))
                    {
                        aliases.push(alias.clone());
                    }
                }

                concept_ops::delete_concept_tx(conn, &duplicate.id)?;
                stats.concepts_merged += 1;
            }

            if aliases != canonical.aliases {
                concept_ops::update_aliases_tx(conn, &canonical.id, &aliases)?;
            }

            Ok(stats)
        })?;

        // Merging can reintroduce duplicate edges.
        stats.duplicates_removed = self.dedup_pass(&session_id)?;

        info!(
            session_id = %session_id,
            canonical = %canonical_name,
            merged = stats.concepts_merged,
            redirected = stats.relationships_redirected,
            "Concept merge complete"
        );
        Ok(stats)
    }
}

/// Canonical grouping key for dedup.
///
/// Symmetric kinds sort their endpoints so direction is ignored.
fn canonical_key(rel: &Relationship) -> String {
    let a = (rel.source_type.as_str(), rel.source_id.as_str());
    let b = (rel.target_type.as_str(), rel.target_id.as_str());
    let (first, second) = if rel.kind.is_symmetric() && b < a {
        (b, a)
    } else {
        (a, b)
    };
    format!(
        "{}|{}:{}|{}:{}",
        rel.kind.as_str(),
        first.0,
        first.1,
        second.0,
        second.1
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use ogma_types::{Concept, EntityKind, Provenance, RelationKind};

    fn setup() -> (Arc<GraphStore>, GraphCleanup) {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let cleanup = GraphCleanup::new(store.clone());
        (store, cleanup)
    }

    fn concept(store: &GraphStore, name: &str) -> Concept {
        let concept = Concept::new("s1", name, Provenance::Agent);
        store.insert_concept(&concept).unwrap();
        concept
    }

    fn rel(
        source: (&EntityKind, &str),
        target: &str,
        kind: RelationKind,
        confidence: f64,
    ) -> Relationship {
        Relationship::new(
            "s1",
            *source.0,
            source.1,
            source.1,
            EntityKind::Concept,
            target,
            target,
            kind,
        )
        .with_confidence(confidence)
    }

    #[test]
    fn test_symmetric_dedup_collapses_reversed_pair() {
        let (store, cleanup) = setup();
        let a = concept(&store, "A");
        let b = concept(&store, "B");

        store
            .insert_relationship(&rel(
                (&EntityKind::Concept, a.id.as_str()),
                &b.id,
                RelationKind::RelatedTo,
                0.9,
            ))
            .unwrap();
        store
            .insert_relationship(&rel(
                (&EntityKind::Concept, b.id.as_str()),
                &a.id,
                RelationKind::RelatedTo,
                0.4,
            ))
            .unwrap();

        let stats = cleanup.run("s1").unwrap();
        assert_eq!(stats.duplicates_removed, 1);

        let survivors = store.list_session_relationships("s1").unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].confidence, 0.9);
    }

    #[test]
    fn test_directed_kinds_keep_both_directions() {
        let (store, cleanup) = setup();
        let a = concept(&store, "A");
        let b = concept(&store, "B");

        store
            .insert_relationship(&rel(
                (&EntityKind::Concept, a.id.as_str()),
                &b.id,
                RelationKind::Requires,
                1.0,
            ))
            .unwrap();
        store
            .insert_relationship(&rel(
                (&EntityKind::Concept, b.id.as_str()),
                &a.id,
                RelationKind::Requires,
                1.0,
            ))
            .unwrap();

        let stats = cleanup.run("s1").unwrap();
        assert_eq!(stats.duplicates_removed, 0);
        assert_eq!(store.list_session_relationships("s1").unwrap().len(), 2);
    }

    #[test]
    fn test_dedup_tie_break_is_deterministic() {
        let (store, cleanup) = setup();
        let a = concept(&store, "A");
        let b = concept(&store, "B");

        let now = Utc::now();
        let mut first = rel(
            (&EntityKind::Concept, a.id.as_str()),
            &b.id,
            RelationKind::RelatedTo,
            0.5,
        );
        first.id = "aaa".to_string();
        first.created_at = now;
        let mut second = rel(
            (&EntityKind::Concept, a.id.as_str()),
            &b.id,
            RelationKind::RelatedTo,
            0.5,
        );
        second.id = "zzz".to_string();
        second.created_at = now;
        let mut third = rel(
            (&EntityKind::Concept, a.id.as_str()),
            &b.id,
            RelationKind::RelatedTo,
            0.5,
        );
        third.id = "mmm".to_string();
        third.created_at = now + Duration::seconds(5);

        store.insert_relationship(&second).unwrap();
        store.insert_relationship(&third).unwrap();
        store.insert_relationship(&first).unwrap();

        cleanup.dedup_pass("s1").unwrap();
        let survivors = store.list_session_relationships("s1").unwrap();
        assert_eq!(survivors.len(), 1);
        // Equal confidence and timestamp: lexicographically smallest id wins
        assert_eq!(survivors[0].id, "aaa");
    }

    #[test]
    fn test_orphan_removal() {
        let (store, cleanup) = setup();
        let kept = concept(&store, "Kept");
        let _orphan = concept(&store, "Orphan");
        let chunk_rel = Relationship::new(
            "s1",
            EntityKind::Chunk,
            "chunk-1",
            "1.1",
            EntityKind::Concept,
            &kept.id,
            &kept.name,
            RelationKind::Introduces,
        );
        store.insert_relationship(&chunk_rel).unwrap();

        let stats = cleanup.run("s1").unwrap();
        assert_eq!(stats.orphans_removed, 1);

        let concepts = store.list_session_concepts("s1").unwrap();
        assert_eq!(concepts.len(), 1);
        assert_eq!(concepts[0].name, "Kept");
    }

    #[test]
    fn test_integrity_repair_removes_dangling() {
        let (store, cleanup) = setup();
        let a = concept(&store, "A");

        // Valid edge plus one pointing at a concept id that never existed
        store
            .insert_relationship(&Relationship::new(
                "s1",
                EntityKind::Chunk,
                "chunk-1",
                "1.1",
                EntityKind::Concept,
                &a.id,
                &a.name,
                RelationKind::Mentions,
            ))
            .unwrap();
        store
            .insert_relationship(&Relationship::new(
                "s1",
                EntityKind::Chunk,
                "chunk-1",
                "1.1",
                EntityKind::Concept,
                "ghost-concept",
                "Ghost",
                RelationKind::Mentions,
            ))
            .unwrap();

        let stats = cleanup.run("s1").unwrap();
        assert_eq!(stats.dangling_removed, 1);

        // Referential integrity holds afterwards
        let survivors = store.list_session_relationships("s1").unwrap();
        for rel in survivors {
            if rel.target_type == EntityKind::Concept {
                assert!(store.get_concept(&rel.target_id).unwrap().is_some());
            }
        }
    }

    #[test]
    fn test_merge_scenario() {
        let (store, cleanup) = setup();
        let canonical = concept(&store, "Fourier Transform");
        let duplicate = concept(&store, "Fourier Transforms");

        for source in ["chunk-1", "chunk-2"] {
            store
                .insert_relationship(&Relationship::new(
                    "s1",
                    EntityKind::Chunk,
                    source,
                    source,
                    EntityKind::Concept,
                    &duplicate.id,
                    &duplicate.name,
                    RelationKind::Introduces,
                ))
                .unwrap();
        }
        store
            .insert_relationship(&Relationship::new(
                "s1",
                EntityKind::Concept,
                &duplicate.id,
                &duplicate.name,
                EntityKind::Concept,
                "other",
                "Other",
                RelationKind::RelatedTo,
            ))
            .unwrap();

        let stats = cleanup
            .merge_concepts("s1", "Fourier Transform", &["Fourier Transforms".to_string()])
            .unwrap();

        assert_eq!(stats.concepts_merged, 1);
        assert_eq!(stats.relationships_redirected, 3);

        // Duplicate deleted, alias recorded
        assert!(store.get_concept(&duplicate.id).unwrap().is_none());
        let canonical = store.get_concept(&canonical.id).unwrap().unwrap();
        assert!(canonical.aliases.iter().any(|a| a == "Fourier Transforms"));

        // Every surviving endpoint points at the canonical concept
        for rel in store.list_session_relationships("s1").unwrap() {
            assert_ne!(rel.source_id, duplicate.id);
            assert_ne!(rel.target_id, duplicate.id);
        }
    }

    #[test]
    fn test_merge_reruns_dedup() {
        let (store, cleanup) = setup();
        let canonical = concept(&store, "Fourier Transform");
        let duplicate = concept(&store, "Fourier Transforms");

        // The same chunk introduces both spellings; after merge these
        // become identical edges.
        for target in [&canonical, &duplicate] {
            store
                .insert_relationship(&Relationship::new(
                    "s1",
                    EntityKind::Chunk,
                    "chunk-1",
                    "1.1",
                    EntityKind::Concept,
                    &target.id,
                    &target.name,
                    RelationKind::Introduces,
                ))
                .unwrap();
        }

        let stats = cleanup
            .merge_concepts("s1", "Fourier Transform", &["Fourier Transforms".to_string()])
            .unwrap();
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(store.list_session_relationships("s1").unwrap().len(), 1);
    }

    #[test]
    fn test_merge_missing_canonical_errors() {
        let (_, cleanup) = setup();
        let result = cleanup.merge_concepts("s1", "Nonexistent", &[]);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
