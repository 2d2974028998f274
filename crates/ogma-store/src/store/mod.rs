//! SQLite store implementation.
//!
//! Provides persistent storage for resources, chunks, concepts,
//! relationships, and question records using rusqlite. Uses WAL mode and
//! a `user_version`-tracked schema with additive migrations.
//!
//! All multi-step graph mutations go through [`GraphStore::with_transaction`];
//! the transaction boundary is the only serialization point in the system.

pub(crate) mod chunk_ops;
pub(crate) mod concept_ops;
pub(crate) mod question_ops;
pub(crate) mod relationship_ops;
pub(crate) mod resource_ops;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Graph Store
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge-graph store backed by SQLite.
///
/// The connection is wrapped in a `Mutex`; readers and the transaction API
/// serialize through it. WAL mode keeps concurrent readers cheap.
pub struct GraphStore {
    /// The SQLite connection.
    pub(crate) conn: Mutex<Connection>,
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore").finish_non_exhaustive()
    }
}

impl GraphStore {
    /// Open or create a graph store at the given path.
    ///
    /// Creates the database file and initializes the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|_| {
                    StoreError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!("Graph store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        debug!("In-memory graph store created");
        Ok(store)
    }

    /// Initialize the database with pragmas and schema.
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // WAL for better concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        self.create_schema(&conn)?;
        Ok(())
    }

    /// Create the database schema.
    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        info!(
            "Migrating schema from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        conn.execute_batch(
            r#"
            -- Study-material units
            CREATE TABLE IF NOT EXISTS resources (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                title TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'linking',
                indexed INTEGER NOT NULL DEFAULT 0,
                graph_indexed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_resources_session
                ON resources(session_id);

            -- Hierarchical content tree per resource
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                resource_id TEXT NOT NULL,
                parent_id TEXT,
                title TEXT NOT NULL,
                content TEXT NOT NULL DEFAULT '',
                depth INTEGER NOT NULL DEFAULT 0,
                kind TEXT NOT NULL DEFAULT 'section',
                position INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_resource
                ON chunks(resource_id);

            -- Canonical session-scoped topics
            CREATE TABLE IF NOT EXISTS concepts (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                aliases TEXT NOT NULL DEFAULT '[]',
                provenance TEXT NOT NULL DEFAULT 'system',
                created_at TEXT NOT NULL,
                UNIQUE(session_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_concepts_session
                ON concepts(session_id);

            -- Typed directed edges
            CREATE TABLE IF NOT EXISTS relationships (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                source_label TEXT NOT NULL DEFAULT '',
                target_type TEXT NOT NULL,
                target_id TEXT NOT NULL,
                target_label TEXT NOT NULL DEFAULT '',
                kind TEXT NOT NULL,
                confidence REAL NOT NULL DEFAULT 1.0,
                provenance TEXT NOT NULL DEFAULT 'system',
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_relationships_session
                ON relationships(session_id);
            CREATE INDEX IF NOT EXISTS idx_relationships_source
                ON relationships(source_id);
            CREATE INDEX IF NOT EXISTS idx_relationships_target
                ON relationships(target_id);

            -- Structured question records (enrich phase)
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                resource_id TEXT NOT NULL,
                chunk_id TEXT,
                label TEXT NOT NULL,
                marks INTEGER,
                mark_scheme TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_questions_resource
                ON questions(resource_id);

            -- Schema metadata
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        if current_version < 2 {
            self.migrate_v2(conn)?;
        }

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Migration v2: add the provenance column to concepts.
    fn migrate_v2(&self, conn: &Connection) -> Result<()> {
        // Fresh DBs already have the column in CREATE TABLE
        let has_column: bool = conn
            .prepare("SELECT provenance FROM concepts LIMIT 0")
            .is_ok();

        if !has_column {
            info!("Running migration v2: adding provenance column to concepts");
            conn.execute_batch(
                "ALTER TABLE concepts ADD COLUMN provenance TEXT NOT NULL DEFAULT 'system';",
            )?;
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

impl GraphStore {
    /// Execute a function within a transaction.
    ///
    /// All operations within the closure are executed atomically; if the
    /// closure returns an error, the transaction rolls back on drop.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => Err(e),
        }
    }

    /// Run a read-only closure against the connection.
    ///
    /// Read paths (amortiser matching, cleanup's query phase) use this
    /// instead of opening a transaction.
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Operations
// ─────────────────────────────────────────────────────────────────────────────

/// Row counts for a session's graph.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Number of resources.
    pub resource_count: usize,
    /// Number of concepts.
    pub concept_count: usize,
    /// Number of relationships.
    pub relationship_count: usize,
}

impl GraphStore {
    /// Get a metadata value.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Set a metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Get row counts for one session.
    pub fn session_stats(&self, session_id: &str) -> Result<SessionStats> {
        let conn = self.conn.lock().unwrap();

        let resource_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let concept_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM concepts WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        let relationship_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;

        Ok(SessionStats {
            resource_count: resource_count as usize,
            concept_count: concept_count as usize,
            relationship_count: relationship_count as usize,
        })
    }
}
