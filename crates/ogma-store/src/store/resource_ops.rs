//! Resource row operations.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

use ogma_types::{Resource, ResourceKind};

use crate::error::Result;

use super::GraphStore;

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    let kind: String = row.get("kind")?;
    let created_at: String = row.get("created_at")?;
    Ok(Resource {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        title: row.get("title")?,
        kind: ResourceKind::from_db_str(&kind),
        indexed: row.get::<_, i64>("indexed")? != 0,
        graph_indexed: row.get::<_, i64>("graph_indexed")? != 0,
        created_at: created_at
            .parse::<DateTime<Utc>>()
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Insert a resource inside an existing transaction.
pub(crate) fn insert_resource_tx(conn: &Connection, resource: &Resource) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO resources (id, session_id, title, kind, indexed, graph_indexed, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            resource.id,
            resource.session_id,
            resource.title,
            resource.kind.as_str(),
            resource.indexed as i64,
            resource.graph_indexed as i64,
            resource.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Load a resource inside an existing transaction.
pub(crate) fn get_resource_tx(conn: &Connection, id: &str) -> Result<Option<Resource>> {
    let mut stmt = conn.prepare("SELECT * FROM resources WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_resource(row)?)),
        None => Ok(None),
    }
}

/// Mark a resource graph-indexed inside an existing transaction.
pub(crate) fn set_graph_indexed_tx(conn: &Connection, resource_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE resources SET graph_indexed = 1 WHERE id = ?1",
        params![resource_id],
    )?;
    Ok(())
}

impl GraphStore {
    /// Insert a resource.
    pub fn insert_resource(&self, resource: &Resource) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_resource_tx(&conn, resource)
    }

    /// Get a resource by id.
    pub fn get_resource(&self, id: &str) -> Result<Option<Resource>> {
        let conn = self.conn.lock().unwrap();
        get_resource_tx(&conn, id)
    }

    /// List all resources in a session, oldest first.
    pub fn list_session_resources(&self, session_id: &str) -> Result<Vec<Resource>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM resources WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![session_id], row_to_resource)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mark a resource as content-indexed.
    pub fn set_indexed(&self, resource_id: &str, indexed: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE resources SET indexed = ?2 WHERE id = ?1",
            params![resource_id, indexed as i64],
        )?;
        Ok(())
    }
}
