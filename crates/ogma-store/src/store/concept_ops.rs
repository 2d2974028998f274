//! Concept row operations.
//!
//! Concept names are unique per session; callers canonicalize before
//! writing (see [`crate::matching::canonicalize_concept_name`]).

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use ogma_types::{Concept, Provenance};

use crate::error::Result;

use super::GraphStore;

fn row_to_concept(row: &Row<'_>) -> rusqlite::Result<Concept> {
    let aliases: String = row.get("aliases")?;
    let provenance: String = row.get("provenance")?;
    let created_at: String = row.get("created_at")?;
    Ok(Concept {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
        provenance: Provenance::from_db_str(&provenance),
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Insert a concept inside an existing transaction.
pub(crate) fn insert_concept_tx(conn: &Connection, concept: &Concept) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO concepts (id, session_id, name, description, aliases, provenance, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            concept.id,
            concept.session_id,
            concept.name,
            concept.description,
            serde_json::to_string(&concept.aliases)?,
            concept.provenance.as_str(),
            concept.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Look up a concept by canonical name inside an existing transaction.
pub(crate) fn get_concept_by_name_tx(
    conn: &Connection,
    session_id: &str,
    name: &str,
) -> Result<Option<Concept>> {
    let mut stmt =
        conn.prepare("SELECT * FROM concepts WHERE session_id = ?1 AND name = ?2")?;
    Ok(stmt
        .query_row(params![session_id, name], row_to_concept)
        .optional()?)
}

/// Update a concept's description inside an existing transaction.
pub(crate) fn update_description_tx(
    conn: &Connection,
    concept_id: &str,
    description: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE concepts SET description = ?2 WHERE id = ?1",
        params![concept_id, description],
    )?;
    Ok(())
}

/// Replace a concept's alias list inside an existing transaction.
pub(crate) fn update_aliases_tx(
    conn: &Connection,
    concept_id: &str,
    aliases: &[String],
) -> Result<()> {
    conn.execute(
        "UPDATE concepts SET aliases = ?2 WHERE id = ?1",
        params![concept_id, serde_json::to_string(aliases)?],
    )?;
    Ok(())
}

/// Delete a concept inside an existing transaction.
pub(crate) fn delete_concept_tx(conn: &Connection, concept_id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM concepts WHERE id = ?1", params![concept_id])?;
    Ok(changed > 0)
}

/// Load every concept in a session inside an existing transaction.
pub(crate) fn list_session_concepts_tx(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<Concept>> {
    let mut stmt =
        conn.prepare("SELECT * FROM concepts WHERE session_id = ?1 ORDER BY name ASC")?;
    let rows = stmt.query_map(params![session_id], row_to_concept)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl GraphStore {
    /// Insert a concept.
    pub fn insert_concept(&self, concept: &Concept) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_concept_tx(&conn, concept)
    }

    /// Get a concept by id.
    pub fn get_concept(&self, id: &str) -> Result<Option<Concept>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM concepts WHERE id = ?1")?;
        Ok(stmt.query_row(params![id], row_to_concept).optional()?)
    }

    /// Get a concept by canonical name within a session.
    pub fn get_concept_by_name(&self, session_id: &str, name: &str) -> Result<Option<Concept>> {
        let conn = self.conn.lock().unwrap();
        get_concept_by_name_tx(&conn, session_id, name)
    }

    /// List every concept in a session, by name.
    pub fn list_session_concepts(&self, session_id: &str) -> Result<Vec<Concept>> {
        let conn = self.conn.lock().unwrap();
        list_session_concepts_tx(&conn, session_id)
    }
}
