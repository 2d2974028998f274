//! Batch status snapshot types.
//!
//! Upstream callers poll this as a point-in-time view; it serializes to
//! the camelCase JSON shape the status API exposes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ogma_store::CleanupStats;
use ogma_types::IndexErrorKind;

/// Terminal and in-flight states of one resource's extraction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Pending,
    Indexing,
    Completed,
    Failed,
    Cancelled,
}

/// Status of one resource within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Resource id.
    pub id: String,
    /// Current state.
    pub status: ResourceState,
    /// Agent attempts consumed (0 until the unit starts).
    pub attempts: u32,
    /// Wall-clock duration of the unit, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Failure classification, when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<IndexErrorKind>,
    /// Failure detail, when failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ResourceStatus {
    /// A fresh pending entry.
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ResourceState::Pending,
            attempts: 0,
            duration_ms: None,
            error_type: None,
            error_message: None,
        }
    }
}

/// State of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Status of one phase, with phase-specific extras.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    /// Current state.
    pub status: PhaseState,
    /// Cross-link phase: links added.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_added: Option<usize>,
    /// Cleanup phase: per-category removal counts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CleanupSummary>,
    /// Unit-bearing phases: units that completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,
    /// Unit-bearing phases: units that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    /// Failure detail for non-fatal phase errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PhaseStatus {
    /// A fresh pending phase.
    pub fn pending() -> Self {
        Self {
            status: PhaseState::Pending,
            links_added: None,
            stats: None,
            completed: None,
            failed: None,
            message: None,
        }
    }
}

/// Cleanup removal counts in snapshot form.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    /// Duplicate relationships removed.
    pub duplicates_removed: usize,
    /// Orphaned concepts removed.
    pub orphans_removed: usize,
    /// Dangling relationships removed.
    pub dangling_removed: usize,
}

impl From<CleanupStats> for CleanupSummary {
    fn from(stats: CleanupStats) -> Self {
        Self {
            duplicates_removed: stats.duplicates_removed,
            orphans_removed: stats.orphans_removed,
            dangling_removed: stats.dangling_removed,
        }
    }
}

/// The per-phase breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOverview {
    /// Phase currently running (1-5), absent once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u8>,
    /// Foundation extraction.
    pub phase1: PhaseStatus,
    /// Linking extraction.
    pub phase2: PhaseStatus,
    /// Cross-linking.
    pub phase3: PhaseStatus,
    /// Cleanup.
    pub phase4: PhaseStatus,
    /// Enrichment.
    pub phase5: PhaseStatus,
}

impl PhaseOverview {
    /// All phases pending.
    pub fn pending() -> Self {
        Self {
            current: None,
            phase1: PhaseStatus::pending(),
            phase2: PhaseStatus::pending(),
            phase3: PhaseStatus::pending(),
            phase4: PhaseStatus::pending(),
            phase5: PhaseStatus::pending(),
        }
    }
}

/// Point-in-time snapshot of one session's indexing run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    /// Session id.
    pub session_id: String,
    /// Per-resource extraction status.
    pub resources: Vec<ResourceStatus>,
    /// Per-phase breakdown.
    pub phase: PhaseOverview,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl BatchStatus {
    /// A fresh status for the given resources, everything pending.
    pub fn new(session_id: impl Into<String>, resource_ids: &[String]) -> Self {
        Self {
            session_id: session_id.into(),
            resources: resource_ids
                .iter()
                .map(|id| ResourceStatus::pending(id.clone()))
                .collect(),
            phase: PhaseOverview::pending(),
            started_at: Utc::now(),
            cancelled: false,
        }
    }

    /// Mutable handle to one resource's status.
    pub fn resource_mut(&mut self, id: &str) -> Option<&mut ResourceStatus> {
        self.resources.iter_mut().find(|r| r.id == id)
    }

    /// True when every resource reached a terminal state.
    pub fn all_resources_terminal(&self) -> bool {
        self.resources.iter().all(|r| {
            matches!(
                r.status,
                ResourceState::Completed | ResourceState::Failed | ResourceState::Cancelled
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut status = BatchStatus::new("s1", &["r1".to_string()]);
        status.resources[0].status = ResourceState::Failed;
        status.resources[0].error_type = Some(IndexErrorKind::LlmError);
        status.resources[0].duration_ms = Some(1200);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["resources"][0]["status"], "failed");
        assert_eq!(json["resources"][0]["errorType"], "llm_error");
        assert_eq!(json["resources"][0]["durationMs"], 1200);
        assert!(json["startedAt"].is_string());
        assert_eq!(json["cancelled"], false);
        // Pending phases omit their optional extras
        assert!(json["phase"]["phase3"].get("linksAdded").is_none());
    }

    #[test]
    fn test_all_resources_terminal() {
        let mut status = BatchStatus::new("s1", &["r1".to_string(), "r2".to_string()]);
        assert!(!status.all_resources_terminal());

        status.resource_mut("r1").unwrap().status = ResourceState::Completed;
        status.resource_mut("r2").unwrap().status = ResourceState::Indexing;
        assert!(!status.all_resources_terminal());

        status.resource_mut("r2").unwrap().status = ResourceState::Cancelled;
        assert!(status.all_resources_terminal());
    }

    #[test]
    fn test_cleanup_summary_from_stats() {
        let stats = CleanupStats {
            duplicates_removed: 3,
            orphans_removed: 1,
            dangling_removed: 0,
        };
        let summary: CleanupSummary = stats.into();
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["duplicatesRemoved"], 3);
        assert_eq!(json["orphansRemoved"], 1);
    }
}
