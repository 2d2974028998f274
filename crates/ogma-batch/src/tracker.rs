//! Per-session batch progress and cooperative cancellation.
//!
//! Batch state is transient: it exists from `start` to `finish` and is
//! never persisted. The tracker is an explicit keyed store: all access
//! goes through accessor methods on a shared map, and each batch carries a
//! `CancellationToken` that units poll at coarse checkpoints (before
//! starting work, before a subprocess spawn). A unit already executing
//! runs to completion; completed results are never discarded.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BatchError, Result};

/// Internal per-batch state.
struct BatchState {
    unit_ids: Vec<String>,
    completed: Vec<String>,
    current: Option<String>,
    started_at: DateTime<Utc>,
    cancelled: bool,
    cancel_token: CancellationToken,
}

/// Point-in-time view of one batch.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    /// Session the batch belongs to.
    pub session_id: String,
    /// Every unit in the batch, in order.
    pub unit_ids: Vec<String>,
    /// Units that reached completion.
    pub completed: Vec<String>,
    /// Unit currently executing, if any.
    pub current: Option<String>,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// Whether cancellation has been requested.
    pub cancelled: bool,
}

/// Concurrency-safe keyed store of batch state, one entry per session.
#[derive(Clone, Default)]
pub struct SessionBatchTracker {
    inner: Arc<RwLock<HashMap<String, BatchState>>>,
}

impl SessionBatchTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking a batch.
    ///
    /// Fails if a batch is already active for the session.
    pub async fn start(&self, session_id: &str, unit_ids: Vec<String>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(session_id) {
            return Err(BatchError::AlreadyRunning(session_id.to_string()));
        }

        info!(session_id = %session_id, units = unit_ids.len(), "Batch started");
        inner.insert(
            session_id.to_string(),
            BatchState {
                unit_ids,
                completed: Vec::new(),
                current: None,
                started_at: Utc::now(),
                cancelled: false,
                cancel_token: CancellationToken::new(),
            },
        );
        Ok(())
    }

    /// Request cancellation.
    ///
    /// Idempotent: returns true the first time, false on repeats or when
    /// no batch exists. In-flight units run to completion; unstarted units
    /// observe the flag and skip.
    pub async fn cancel(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.get_mut(session_id) {
            Some(state) if !state.cancelled => {
                state.cancelled = true;
                state.cancel_token.cancel();
                info!(session_id = %session_id, "Batch cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Whether cancellation has been requested.
    pub async fn is_cancelled(&self, session_id: &str) -> bool {
        let inner = self.inner.read().await;
        inner.get(session_id).is_some_and(|s| s.cancelled)
    }

    /// The batch's cancellation token, for passing down async call chains.
    pub async fn token(&self, session_id: &str) -> Option<CancellationToken> {
        let inner = self.inner.read().await;
        inner.get(session_id).map(|s| s.cancel_token.clone())
    }

    /// Point-in-time snapshot of batch progress.
    pub async fn status(&self, session_id: &str) -> Option<BatchSnapshot> {
        let inner = self.inner.read().await;
        inner.get(session_id).map(|state| BatchSnapshot {
            session_id: session_id.to_string(),
            unit_ids: state.unit_ids.clone(),
            completed: state.completed.clone(),
            current: state.current.clone(),
            started_at: state.started_at,
            cancelled: state.cancelled,
        })
    }

    /// Record that a unit began executing.
    pub async fn mark_started(&self, session_id: &str, unit_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.get_mut(session_id) {
            state.current = Some(unit_id.to_string());
            debug!(session_id = %session_id, unit_id = %unit_id, "Unit started");
        }
    }

    /// Record that a unit finished (in any terminal state).
    pub async fn mark_completed(&self, session_id: &str, unit_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(state) = inner.get_mut(session_id) {
            if state.current.as_deref() == Some(unit_id) {
                state.current = None;
            }
            if !state.completed.iter().any(|u| u == unit_id) {
                state.completed.push(unit_id.to_string());
            }
        }
    }

    /// Discard the batch. State is transient and never persisted.
    pub async fn finish(&self, session_id: &str) {
        let mut inner = self.inner.write().await;
        if inner.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Batch discarded");
        }
    }
}
