//! The point-in-time graph slice an agent runs against.
//!
//! Each task gets its own private snapshot directory, so concurrent tasks
//! never race on shared state, and a retry simply re-serializes a fresh
//! one. The tool server only ever reads the snapshot; the one write it
//! performs is the result artifact, a sibling file in the same directory.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ogma_types::{Chunk, Concept, Question, Relationship, Resource};

use crate::error::{ProtocolError, Result};

/// File name of the serialized snapshot inside a task workdir.
pub const SNAPSHOT_FILE: &str = "snapshot.json";

/// File name of the result artifact the agent submits.
pub const ARTIFACT_FILE: &str = "result.json";

/// A serialized slice of the session graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Session the slice was taken from.
    pub session_id: String,
    /// The resource under extraction, absent for session-wide tasks.
    #[serde(default)]
    pub resource: Option<Resource>,
    /// The resource's chunk tree (empty for session-wide tasks).
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    /// Every concept in the session at snapshot time.
    #[serde(default)]
    pub concepts: Vec<Concept>,
    /// Every relationship in the session at snapshot time.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    /// The resource's question records.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Snapshot {
    /// Write the snapshot into a directory, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SNAPSHOT_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Read a snapshot from a directory.
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(SNAPSHOT_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            ProtocolError::Snapshot(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}
