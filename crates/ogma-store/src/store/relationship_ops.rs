//! Relationship row operations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use ogma_types::{EntityKind, Provenance, RelationKind, Relationship};

use crate::error::Result;

use super::GraphStore;

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let source_type: String = row.get("source_type")?;
    let target_type: String = row.get("target_type")?;
    let kind: String = row.get("kind")?;
    let provenance: String = row.get("provenance")?;
    let created_at: String = row.get("created_at")?;
    Ok(Relationship {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        source_type: EntityKind::from_db_str(&source_type),
        source_id: row.get("source_id")?,
        source_label: row.get("source_label")?,
        target_type: EntityKind::from_db_str(&target_type),
        target_id: row.get("target_id")?,
        target_label: row.get("target_label")?,
        kind: RelationKind::from_label(&kind),
        confidence: row.get("confidence")?,
        provenance: Provenance::from_db_str(&provenance),
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Insert a relationship inside an existing transaction.
pub(crate) fn insert_relationship_tx(conn: &Connection, rel: &Relationship) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO relationships (
            id, session_id,
            source_type, source_id, source_label,
            target_type, target_id, target_label,
            kind, confidence, provenance, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            rel.id,
            rel.session_id,
            rel.source_type.as_str(),
            rel.source_id,
            rel.source_label,
            rel.target_type.as_str(),
            rel.target_id,
            rel.target_label,
            rel.kind.as_str(),
            rel.confidence,
            rel.provenance.as_str(),
            rel.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Delete every system-created relationship rooted at a resource, its
/// chunks, or its questions, inside an existing transaction.
///
/// Returns the number of rows removed. Amortised and agent-provenance rows
/// survive a reindex.
pub(crate) fn delete_system_relationships_tx(
    conn: &Connection,
    session_id: &str,
    resource_id: &str,
) -> Result<usize> {
    let removed = conn.execute(
        r#"
        DELETE FROM relationships
        WHERE session_id = ?1
          AND provenance = 'system'
          AND (
            source_id = ?2
            OR source_id IN (SELECT id FROM chunks WHERE resource_id = ?2)
            OR source_id IN (SELECT id FROM questions WHERE resource_id = ?2)
          )
        "#,
        params![session_id, resource_id],
    )?;
    Ok(removed)
}

/// Whether any edge already connects the given source and target ids,
/// inside an existing transaction or plain connection.
pub(crate) fn edge_exists_tx(
    conn: &Connection,
    session_id: &str,
    source_id: &str,
    target_id: &str,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM relationships
        WHERE session_id = ?1 AND source_id = ?2 AND target_id = ?3
        "#,
        params![session_id, source_id, target_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Load every relationship in a session inside an existing transaction.
pub(crate) fn list_session_relationships_tx(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<Relationship>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM relationships WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![session_id], row_to_relationship)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Delete relationships by id inside an existing transaction.
pub(crate) fn delete_relationships_tx(conn: &Connection, ids: &[String]) -> Result<usize> {
    let mut removed = 0;
    let mut stmt = conn.prepare("DELETE FROM relationships WHERE id = ?1")?;
    for id in ids {
        removed += stmt.execute(params![id])?;
    }
    Ok(removed)
}

impl GraphStore {
    /// Insert a relationship.
    pub fn insert_relationship(&self, rel: &Relationship) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_relationship_tx(&conn, rel)
    }

    /// List every relationship in a session, oldest first.
    pub fn list_session_relationships(&self, session_id: &str) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        list_session_relationships_tx(&conn, session_id)
    }

    /// List relationships whose source is the given entity.
    pub fn list_relationships_from(&self, source_id: &str) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM relationships WHERE source_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![source_id], row_to_relationship)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ogma_types::Chunk;

    fn rel(session: &str, source: &str, target: &str, kind: RelationKind) -> Relationship {
        Relationship::new(
            session,
            EntityKind::Chunk,
            source,
            source,
            EntityKind::Concept,
            target,
            target,
            kind,
        )
    }

    #[test]
    fn test_insert_and_list() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .insert_relationship(&rel("s1", "c1", "k1", RelationKind::Introduces))
            .unwrap();
        store
            .insert_relationship(&rel("s1", "c2", "k1", RelationKind::Mentions))
            .unwrap();
        store
            .insert_relationship(&rel("s2", "c3", "k2", RelationKind::Mentions))
            .unwrap();

        assert_eq!(store.list_session_relationships("s1").unwrap().len(), 2);
        assert_eq!(store.list_relationships_from("c1").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_system_relationships_scoped_to_resource() {
        let store = GraphStore::open_in_memory().unwrap();
        let chunk = Chunk::new("r1", "1.1", "text");
        store.insert_chunk(&chunk).unwrap();

        // System row on the resource's chunk, system row on the resource,
        // an amortised row on the same chunk, and a row for another resource.
        store
            .insert_relationship(&rel("s1", &chunk.id, "k1", RelationKind::Introduces))
            .unwrap();
        store
            .insert_relationship(&rel("s1", "r1", "k1", RelationKind::Mentions))
            .unwrap();
        store
            .insert_relationship(
                &rel("s1", &chunk.id, "k2", RelationKind::Mentions)
                    .with_provenance(Provenance::Amortised),
            )
            .unwrap();
        store
            .insert_relationship(&rel("s1", "other-resource", "k1", RelationKind::Mentions))
            .unwrap();

        let removed = store
            .with_transaction(|conn| delete_system_relationships_tx(conn, "s1", "r1"))
            .unwrap();
        assert_eq!(removed, 2);

        let remaining = store.list_session_relationships("s1").unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|r| r.provenance == Provenance::Amortised));
        assert!(remaining.iter().any(|r| r.source_id == "other-resource"));
    }

    #[test]
    fn test_edge_exists() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .insert_relationship(&rel("s1", "c1", "k1", RelationKind::Mentions))
            .unwrap();

        let exists = store
            .with_connection(|conn| edge_exists_tx(conn, "s1", "c1", "k1"))
            .unwrap();
        let missing = store
            .with_connection(|conn| edge_exists_tx(conn, "s1", "c1", "k9"))
            .unwrap();
        assert!(exists);
        assert!(!missing);
    }
}
