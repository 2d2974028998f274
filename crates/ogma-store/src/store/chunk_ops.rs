//! Chunk row operations.

use rusqlite::{Connection, Row, params};

use ogma_types::{Chunk, ChunkKind};

use crate::error::Result;

use super::GraphStore;

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let kind: String = row.get("kind")?;
    Ok(Chunk {
        id: row.get("id")?,
        resource_id: row.get("resource_id")?,
        parent_id: row.get("parent_id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        depth: row.get::<_, i64>("depth")? as u32,
        kind: ChunkKind::from_db_str(&kind),
        position: row.get::<_, i64>("position")? as u32,
    })
}

/// Insert a chunk inside an existing transaction.
pub(crate) fn insert_chunk_tx(conn: &Connection, chunk: &Chunk) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO chunks (id, resource_id, parent_id, title, content, depth, kind, position)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            chunk.id,
            chunk.resource_id,
            chunk.parent_id,
            chunk.title,
            chunk.content,
            chunk.depth as i64,
            chunk.kind.as_str(),
            chunk.position as i64,
        ],
    )?;
    Ok(())
}

/// Load a resource's chunks in tree order inside an existing transaction.
pub(crate) fn list_resource_chunks_tx(conn: &Connection, resource_id: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM chunks WHERE resource_id = ?1 ORDER BY depth ASC, position ASC",
    )?;
    let rows = stmt.query_map(params![resource_id], row_to_chunk)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

impl GraphStore {
    /// Insert a chunk.
    pub fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_chunk_tx(&conn, chunk)
    }

    /// Get a chunk by id.
    pub fn get_chunk(&self, id: &str) -> Result<Option<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM chunks WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_chunk(row)?)),
            None => Ok(None),
        }
    }

    /// List a resource's chunks in tree order (depth, then position).
    pub fn list_resource_chunks(&self, resource_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        list_resource_chunks_tx(&conn, resource_id)
    }

    /// Search a session's chunks by title/content substring.
    pub fn search_session_chunks(&self, session_id: &str, query: &str) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.trim());
        let mut stmt = conn.prepare(
            r#"
            SELECT c.* FROM chunks c
            JOIN resources r ON c.resource_id = r.id
            WHERE r.session_id = ?1 AND (c.title LIKE ?2 OR c.content LIKE ?2)
            ORDER BY c.resource_id, c.depth ASC, c.position ASC
            "#,
        )?;
        let rows = stmt.query_map(params![session_id, pattern], row_to_chunk)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let store = GraphStore::open_in_memory().unwrap();
        let chunk = Chunk::new("r1", "1.1 Overview", "Intro").with_kind(ChunkKind::Section);
        store.insert_chunk(&chunk).unwrap();

        let loaded = store.get_chunk(&chunk.id).unwrap().unwrap();
        assert_eq!(loaded.title, "1.1 Overview");
        assert_eq!(loaded.kind, ChunkKind::Section);
    }

    #[test]
    fn test_tree_order() {
        let store = GraphStore::open_in_memory().unwrap();
        let mut root = Chunk::new("r1", "Root", "");
        root.position = 0;
        let mut child = Chunk::new("r1", "Child", "").with_parent(&root.id, 1);
        child.position = 0;
        let mut second = Chunk::new("r1", "Second Root", "");
        second.position = 1;

        // Insertion order deliberately scrambled
        store.insert_chunk(&child).unwrap();
        store.insert_chunk(&second).unwrap();
        store.insert_chunk(&root).unwrap();

        let chunks = store.list_resource_chunks("r1").unwrap();
        let titles: Vec<&str> = chunks.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Root", "Second Root", "Child"]);
    }

    #[test]
    fn test_search_session_chunks() {
        use ogma_types::{Resource, ResourceKind};

        let store = GraphStore::open_in_memory().unwrap();
        let resource = Resource::new("s1", "Notes", ResourceKind::Foundation);
        store.insert_resource(&resource).unwrap();
        store
            .insert_chunk(&Chunk::new(&resource.id, "Heat Equation", "derivation from flux"))
            .unwrap();
        store
            .insert_chunk(&Chunk::new(&resource.id, "Linear Algebra", "matrices"))
            .unwrap();
        // A chunk in another session must not match
        let other = Resource::new("s2", "Other", ResourceKind::Foundation);
        store.insert_resource(&other).unwrap();
        store
            .insert_chunk(&Chunk::new(&other.id, "Heat Equation", "same title"))
            .unwrap();

        let found = store.search_session_chunks("s1", "heat").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Heat Equation");

        let by_content = store.search_session_chunks("s1", "flux").unwrap();
        assert_eq!(by_content.len(), 1);
    }
}
