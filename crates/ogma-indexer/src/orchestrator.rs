//! The five-phase session indexing state machine.
//!
//! Phases run in order, each independently skippable:
//!
//! 1. Foundation: sequential extraction of foundation material, so its
//!    concepts exist before anything depends on them.
//! 2. Linking: bounded-parallel extraction of the remaining resources.
//! 3. Cross-link: one whole-session agent pass for missing
//!    concept-to-concept links.
//! 4. Cleanup: dedup, orphan removal, integrity repair.
//! 5. Enrich: bounded-parallel structured metadata extraction.
//!
//! A phase begins only once every unit of the previous phase is terminal;
//! one unit's failure never blocks its siblings or the phase. The
//! orchestrator never retries a phase; per-task retry lives in the
//! runner. Cancellation is cooperative: units check the batch token before
//! starting, in-flight units run to completion, and the run reports
//! CANCELLED once the current phase drains. Failures in phases 3-5 are
//! recorded on status but never roll back committed work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ogma_batch::{SessionBatchTracker, WorkQueues};
use ogma_protocol::Snapshot;
use ogma_runner::{AgentTask, TaskOutcome, TaskRunner};
use ogma_store::{GraphCleanup, GraphStore, IngestReport, RelationshipStore, StoreError};
use ogma_types::{IndexError, Resource, ResourceKind, TaskKind, Thoroughness};

use crate::error::{IndexerError, Result};
use crate::status::{BatchStatus, PhaseState, PhaseStatus, ResourceState};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Effort tier for every agent task in the run.
    pub thoroughness: Thoroughness,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            thoroughness: Thoroughness::Quick,
        }
    }
}

/// Composes the store, runner, queues, and tracker into session-wide runs.
pub struct PhaseOrchestrator {
    store: Arc<GraphStore>,
    runner: Arc<dyn TaskRunner>,
    queues: Arc<WorkQueues>,
    tracker: SessionBatchTracker,
    statuses: RwLock<HashMap<String, Arc<Mutex<BatchStatus>>>>,
    config: OrchestratorConfig,
}

impl PhaseOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        store: Arc<GraphStore>,
        runner: Arc<dyn TaskRunner>,
        queues: Arc<WorkQueues>,
        tracker: SessionBatchTracker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            runner,
            queues,
            tracker,
            statuses: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// The batch tracker, for cancellation from other entry points.
    pub fn tracker(&self) -> &SessionBatchTracker {
        &self.tracker
    }

    /// Point-in-time status snapshot for a session's current or last run.
    pub async fn status(&self, session_id: &str) -> Option<BatchStatus> {
        let statuses = self.statuses.read().await;
        match statuses.get(session_id) {
            Some(status) => Some(status.lock().await.clone()),
            None => None,
        }
    }

    /// Request cancellation of a running batch.
    pub async fn cancel(&self, session_id: &str) -> bool {
        self.tracker.cancel(session_id).await
    }

    /// Run the full five-phase pipeline for one session.
    pub async fn run_session(&self, session_id: &str) -> Result<BatchStatus> {
        let resources = self.store.list_session_resources(session_id)?;
        let ids: Vec<String> = resources.iter().map(|r| r.id.clone()).collect();

        self.tracker.start(session_id, ids.clone()).await?;
        let token = self
            .tracker
            .token(session_id)
            .await
            .unwrap_or_default();

        let status = Arc::new(Mutex::new(BatchStatus::new(session_id, &ids)));
        self.statuses
            .write()
            .await
            .insert(session_id.to_string(), status.clone());

        info!(session_id = %session_id, resources = ids.len(), "Indexing run started");

        let (foundation, linking): (Vec<Resource>, Vec<Resource>) = resources
            .into_iter()
            .partition(|r| r.kind == ResourceKind::Foundation);

        // Phase 1: foundation, strictly sequential
        self.run_extraction_phase(session_id, 1, &foundation, true, &status, &token)
            .await;

        // Phase 2: linking, bounded parallel
        self.run_extraction_phase(session_id, 2, &linking, false, &status, &token)
            .await;

        // Phase 3: one cross-link pass over the accumulated graph
        self.run_cross_link_phase(session_id, &status, &token).await;

        // Phase 4: cleanup
        self.run_cleanup_phase(session_id, &status, &token).await;

        // Phase 5: enrichment
        let all_resources: Vec<Resource> = foundation.into_iter().chain(linking).collect();
        self.run_enrich_phase(session_id, &all_resources, &status, &token)
            .await;

        // Terminal state
        let cancelled = self.tracker.is_cancelled(session_id).await;
        let final_status = {
            let mut s = status.lock().await;
            s.cancelled = cancelled;
            s.phase.current = None;
            if cancelled {
                for resource in &mut s.resources {
                    if resource.status == ResourceState::Pending {
                        resource.status = ResourceState::Cancelled;
                    }
                }
            }
            s.clone()
        };
        self.tracker.finish(session_id).await;

        info!(
            session_id = %session_id,
            cancelled,
            "Indexing run {}",
            if cancelled { "CANCELLED" } else { "COMPLETED" }
        );
        Ok(final_status)
    }

    /// Index a single resource outside any batch.
    pub async fn index_resource(&self, resource_id: &str) -> Result<IngestReport> {
        let resource = self
            .store
            .get_resource(resource_id)?
            .ok_or_else(|| IndexerError::NotFound(format!("resource {resource_id}")))?;
        let token = CancellationToken::new();

        let snapshot = build_snapshot(&self.store, &resource.session_id, Some(&resource))?;
        let task = extraction_task(&resource, snapshot, self.config.thoroughness);
        let report = self.runner.run_extraction(&task, &token).await;

        match report.outcome {
            Ok(TaskOutcome::Output(result)) => {
                let rels = RelationshipStore::new(self.store.clone());
                Ok(rels.apply_extraction(resource_id, &result)?)
            }
            Ok(TaskOutcome::NoOutput) | Ok(TaskOutcome::Cancelled) => Ok(IngestReport::default()),
            Err(e) => Err(IndexerError::Unit(IndexError::new(
                e.classify(),
                e.to_string(),
            ))),
        }
    }

    /// Run one unit-bearing extraction phase (1 or 2).
    async fn run_extraction_phase(
        &self,
        session_id: &str,
        phase: u8,
        resources: &[Resource],
        sequential: bool,
        status: &Arc<Mutex<BatchStatus>>,
        token: &CancellationToken,
    ) {
        if resources.is_empty() {
            set_phase(status, phase, |p| p.status = PhaseState::Skipped).await;
            return;
        }
        if self.tracker.is_cancelled(session_id).await {
            set_phase(status, phase, |p| p.status = PhaseState::Skipped).await;
            return;
        }

        set_phase(status, phase, |p| p.status = PhaseState::Running).await;
        status.lock().await.phase.current = Some(phase);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        for resource in resources {
            let unit = extraction_unit(
                self.store.clone(),
                self.runner.clone(),
                self.tracker.clone(),
                status.clone(),
                token.clone(),
                session_id.to_string(),
                resource.clone(),
                self.config.thoroughness,
            );
            let done = done_tx.clone();
            self.queues.graph.enqueue(async move {
                unit.await;
                let _ = done.send(());
            });
            if sequential {
                // Foundation units run one at a time: wait for this unit
                // before admitting the next.
                let _ = done_rx.recv().await;
            }
        }
        drop(done_tx);
        // Phase barrier: every unit terminal before the phase ends
        while done_rx.recv().await.is_some() {}

        let phase_ids: Vec<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut s = status.lock().await;
        let completed = s
            .resources
            .iter()
            .filter(|r| phase_ids.contains(&r.id.as_str()) && r.status == ResourceState::Completed)
            .count();
        let failed = s
            .resources
            .iter()
            .filter(|r| phase_ids.contains(&r.id.as_str()) && r.status == ResourceState::Failed)
            .count();
        let p = phase_mut(&mut s, phase);
        p.status = PhaseState::Completed;
        p.completed = Some(completed);
        p.failed = Some(failed);
    }

    /// Phase 3: a single cross-link agent run over the whole session graph.
    async fn run_cross_link_phase(
        &self,
        session_id: &str,
        status: &Arc<Mutex<BatchStatus>>,
        token: &CancellationToken,
    ) {
        if self.tracker.is_cancelled(session_id).await {
            set_phase(status, 3, |p| p.status = PhaseState::Skipped).await;
            return;
        }
        let has_concepts = match self.store.session_stats(session_id) {
            Ok(stats) => stats.concept_count > 0,
            Err(e) => {
                set_phase(status, 3, |p| {
                    p.status = PhaseState::Failed;
                    p.message = Some(e.to_string());
                })
                .await;
                return;
            }
        };
        if !has_concepts {
            set_phase(status, 3, |p| p.status = PhaseState::Skipped).await;
            return;
        }

        set_phase(status, 3, |p| p.status = PhaseState::Running).await;
        status.lock().await.phase.current = Some(3);

        let result = self.cross_link_once(session_id, token).await;
        set_phase(status, 3, |p| match result {
            Ok(Some(links_added)) => {
                p.status = PhaseState::Completed;
                p.links_added = Some(links_added);
            }
            Ok(None) => {
                p.status = PhaseState::Skipped;
                p.message = Some("cancelled".to_string());
            }
            Err(ref e) => {
                p.status = PhaseState::Failed;
                p.message = Some(e.to_string());
            }
        })
        .await;
    }

    /// Returns `Ok(None)` when cancellation fired mid-run.
    async fn cross_link_once(
        &self,
        session_id: &str,
        token: &CancellationToken,
    ) -> Result<Option<usize>> {
        let snapshot = build_snapshot(&self.store, session_id, None)?;
        let task = AgentTask {
            kind: TaskKind::CrossLink,
            session_id: session_id.to_string(),
            resource_id: None,
            instruction: "Analyze the accumulated concept graph and propose missing \
                          concept-to-concept relationships across resources."
                .to_string(),
            thoroughness: self.config.thoroughness,
            snapshot,
        };

        let report = self.runner.run_extraction(&task, token).await;
        match report.outcome {
            Ok(TaskOutcome::Output(result)) => {
                let rels = RelationshipStore::new(self.store.clone());
                Ok(Some(rels.apply_concept_links(session_id, &result)?))
            }
            Ok(TaskOutcome::NoOutput) => Ok(Some(0)),
            Ok(TaskOutcome::Cancelled) => Ok(None),
            Err(e) => Err(IndexerError::Unit(IndexError::new(
                e.classify(),
                e.to_string(),
            ))),
        }
    }

    /// Phase 4: dedup + orphan removal + integrity repair.
    async fn run_cleanup_phase(
        &self,
        session_id: &str,
        status: &Arc<Mutex<BatchStatus>>,
        token: &CancellationToken,
    ) {
        if self.tracker.is_cancelled(session_id).await || token.is_cancelled() {
            set_phase(status, 4, |p| p.status = PhaseState::Skipped).await;
            return;
        }

        set_phase(status, 4, |p| p.status = PhaseState::Running).await;
        status.lock().await.phase.current = Some(4);

        let cleanup = GraphCleanup::new(self.store.clone());
        let result = cleanup.run(session_id);
        set_phase(status, 4, |p| match result {
            Ok(stats) => {
                p.status = PhaseState::Completed;
                p.stats = Some(stats.into());
            }
            Err(ref e) => {
                p.status = PhaseState::Failed;
                p.message = Some(e.to_string());
            }
        })
        .await;
    }

    /// Phase 5: per-resource enrichment, bounded parallel.
    async fn run_enrich_phase(
        &self,
        session_id: &str,
        resources: &[Resource],
        status: &Arc<Mutex<BatchStatus>>,
        token: &CancellationToken,
    ) {
        if resources.is_empty() || self.tracker.is_cancelled(session_id).await {
            set_phase(status, 5, |p| p.status = PhaseState::Skipped).await;
            return;
        }

        set_phase(status, 5, |p| {
            p.status = PhaseState::Running;
            p.completed = Some(0);
            p.failed = Some(0);
        })
        .await;
        status.lock().await.phase.current = Some(5);

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        for resource in resources {
            let unit = enrichment_unit(
                self.store.clone(),
                self.runner.clone(),
                status.clone(),
                token.clone(),
                resource.clone(),
                self.config.thoroughness,
            );
            let done = done_tx.clone();
            self.queues.graph.enqueue(async move {
                unit.await;
                let _ = done.send(());
            });
        }
        drop(done_tx);
        while done_rx.recv().await.is_some() {}

        set_phase(status, 5, |p| p.status = PhaseState::Completed).await;
    }
}

/// Update one phase's status under the lock.
async fn set_phase<F>(status: &Arc<Mutex<BatchStatus>>, phase: u8, f: F)
where
    F: FnOnce(&mut PhaseStatus),
{
    let mut s = status.lock().await;
    f(phase_mut(&mut s, phase));
}

fn phase_mut(status: &mut BatchStatus, phase: u8) -> &mut PhaseStatus {
    match phase {
        1 => &mut status.phase.phase1,
        2 => &mut status.phase.phase2,
        3 => &mut status.phase.phase3,
        4 => &mut status.phase.phase4,
        _ => &mut status.phase.phase5,
    }
}

/// Serialize the graph slice a task runs against.
fn build_snapshot(
    store: &GraphStore,
    session_id: &str,
    resource: Option<&Resource>,
) -> std::result::Result<Snapshot, StoreError> {
    let mut snapshot = Snapshot {
        session_id: session_id.to_string(),
        concepts: store.list_session_concepts(session_id)?,
        relationships: store.list_session_relationships(session_id)?,
        ..Default::default()
    };
    if let Some(resource) = resource {
        snapshot.chunks = store.list_resource_chunks(&resource.id)?;
        snapshot.questions = store.list_resource_questions(&resource.id)?;
        snapshot.resource = Some(resource.clone());
    }
    Ok(snapshot)
}

fn extraction_task(resource: &Resource, snapshot: Snapshot, thoroughness: Thoroughness) -> AgentTask {
    AgentTask {
        kind: TaskKind::Extract,
        session_id: resource.session_id.clone(),
        resource_id: Some(resource.id.clone()),
        instruction: format!(
            "Extract the key concepts from the resource \"{}\" and link each one to the \
             chunks and questions that introduce, explain, define, or test it.",
            resource.title
        ),
        thoroughness,
        snapshot,
    }
}

/// One extraction unit: cancellation check, snapshot, agent run, ingest.
#[allow(clippy::too_many_arguments)]
async fn extraction_unit(
    store: Arc<GraphStore>,
    runner: Arc<dyn TaskRunner>,
    tracker: SessionBatchTracker,
    status: Arc<Mutex<BatchStatus>>,
    token: CancellationToken,
    session_id: String,
    resource: Resource,
    thoroughness: Thoroughness,
) {
    // Cancellation checkpoint at unit start: skip as cancelled, not failed
    if token.is_cancelled() {
        let mut s = status.lock().await;
        if let Some(r) = s.resource_mut(&resource.id) {
            r.status = ResourceState::Cancelled;
        }
        drop(s);
        tracker.mark_completed(&session_id, &resource.id).await;
        return;
    }

    {
        let mut s = status.lock().await;
        if let Some(r) = s.resource_mut(&resource.id) {
            r.status = ResourceState::Indexing;
        }
    }
    tracker.mark_started(&session_id, &resource.id).await;
    let started = Instant::now();

    let snapshot = match build_snapshot(&store, &session_id, Some(&resource)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            finish_unit(
                &status,
                &tracker,
                &session_id,
                &resource.id,
                ResourceState::Failed,
                0,
                started,
                Some(IndexError::db(e.to_string())),
            )
            .await;
            return;
        }
    };

    let task = extraction_task(&resource, snapshot, thoroughness);
    let report = runner.run_extraction(&task, &token).await;
    let attempts = report.attempts;

    let (state, error) = match report.outcome {
        Ok(TaskOutcome::Output(result)) => {
            let rels = RelationshipStore::new(store.clone());
            match rels.apply_extraction(&resource.id, &result) {
                Ok(ingest) => {
                    info!(
                        resource_id = %resource.id,
                        inserted = ingest.relationships_inserted,
                        concepts = ingest.concepts_created,
                        "Resource indexed"
                    );
                    (ResourceState::Completed, None)
                }
                Err(e) => (
                    ResourceState::Failed,
                    Some(IndexError::db(e.to_string())),
                ),
            }
        }
        Ok(TaskOutcome::NoOutput) => (ResourceState::Completed, None),
        Ok(TaskOutcome::Cancelled) => (ResourceState::Cancelled, None),
        Err(e) => (
            ResourceState::Failed,
            Some(IndexError::new(e.classify(), e.to_string())),
        ),
    };

    finish_unit(
        &status,
        &tracker,
        &session_id,
        &resource.id,
        state,
        attempts,
        started,
        error,
    )
    .await;
}

#[allow(clippy::too_many_arguments)]
async fn finish_unit(
    status: &Arc<Mutex<BatchStatus>>,
    tracker: &SessionBatchTracker,
    session_id: &str,
    resource_id: &str,
    state: ResourceState,
    attempts: u32,
    started: Instant,
    error: Option<IndexError>,
) {
    if let Some(ref e) = error {
        warn!(resource_id = %resource_id, error = %e, "Resource indexing failed");
    }
    {
        let mut s = status.lock().await;
        if let Some(r) = s.resource_mut(resource_id) {
            r.status = state;
            r.attempts = attempts;
            r.duration_ms = Some(started.elapsed().as_millis() as u64);
            if let Some(e) = error {
                r.error_type = Some(e.kind);
                r.error_message = Some(e.message);
            }
        }
    }
    tracker.mark_completed(session_id, resource_id).await;
}

/// One enrichment unit. Outcomes land in the phase-5 counters, not on the
/// per-resource extraction status.
async fn enrichment_unit(
    store: Arc<GraphStore>,
    runner: Arc<dyn TaskRunner>,
    status: Arc<Mutex<BatchStatus>>,
    token: CancellationToken,
    resource: Resource,
    thoroughness: Thoroughness,
) {
    if token.is_cancelled() {
        return;
    }

    let snapshot = match build_snapshot(&store, &resource.session_id, Some(&resource)) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(resource_id = %resource.id, error = %e, "Enrichment snapshot failed");
            bump_phase5(&status, false).await;
            return;
        }
    };

    let task = AgentTask {
        kind: TaskKind::Enrich,
        session_id: resource.session_id.clone(),
        resource_id: Some(resource.id.clone()),
        instruction: format!(
            "Extract structured question records (label, marks, mark scheme) and concept \
             description content from the resource \"{}\".",
            resource.title
        ),
        thoroughness,
        snapshot,
    };

    let report = runner.run_enrichment(&task, &token).await;
    match report.outcome {
        Ok(TaskOutcome::Output(result)) => {
            let rels = RelationshipStore::new(store.clone());
            match rels.apply_enrichment(&resource.id, &result) {
                Ok(_) => bump_phase5(&status, true).await,
                Err(e) => {
                    warn!(resource_id = %resource.id, error = %e, "Enrichment apply failed");
                    bump_phase5(&status, false).await;
                }
            }
        }
        Ok(TaskOutcome::NoOutput) => bump_phase5(&status, true).await,
        Ok(TaskOutcome::Cancelled) => {}
        Err(e) => {
            warn!(resource_id = %resource.id, error = %e, "Enrichment agent failed");
            bump_phase5(&status, false).await;
        }
    }
}

async fn bump_phase5(status: &Arc<Mutex<BatchStatus>>, success: bool) {
    let mut s = status.lock().await;
    let p = &mut s.phase.phase5;
    if success {
        p.completed = Some(p.completed.unwrap_or(0) + 1);
    } else {
        p.failed = Some(p.failed.unwrap_or(0) + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use ogma_runner::{RunReport, RunnerError};
    use ogma_types::{
        AgentResult, ChunkLink, ConceptEntry, ConceptLink, EnrichResult, IndexErrorKind,
        QuestionRecord,
    };

    /// Scriptable stand-in for the real agent runner.
    ///
    /// Mirrors the real runner's contract: checks the cancellation token
    /// before "spawning", counts spawns, and fails configured resources.
    struct MockRunner {
        spawn_count: AtomicUsize,
        fail_resources: HashSet<String>,
        no_output: bool,
        delay: Duration,
    }

    impl MockRunner {
        fn new() -> Self {
            Self {
                spawn_count: AtomicUsize::new(0),
                fail_resources: HashSet::new(),
                no_output: false,
                delay: Duration::ZERO,
            }
        }

        fn failing(resource_ids: &[&str]) -> Self {
            let mut runner = Self::new();
            runner.fail_resources = resource_ids.iter().map(|s| s.to_string()).collect();
            runner
        }

        fn spawns(&self) -> usize {
            self.spawn_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskRunner for MockRunner {
        async fn run_extraction(
            &self,
            task: &AgentTask,
            cancel: &CancellationToken,
        ) -> RunReport<AgentResult> {
            if cancel.is_cancelled() {
                return RunReport {
                    outcome: Ok(TaskOutcome::Cancelled),
                    attempts: 0,
                };
            }
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;

            if let Some(resource_id) = &task.resource_id {
                if self.fail_resources.contains(resource_id) {
                    return RunReport {
                        outcome: Err(RunnerError::NonZeroExit { code: 1 }),
                        attempts: 3,
                    };
                }
            }
            if self.no_output {
                return RunReport {
                    outcome: Ok(TaskOutcome::NoOutput),
                    attempts: 1,
                };
            }

            let result = match task.kind {
                TaskKind::CrossLink => {
                    // Propose a link between the first two known concepts
                    let mut links = vec![];
                    if task.snapshot.concepts.len() >= 2 {
                        links.push(ConceptLink {
                            source_concept: task.snapshot.concepts[0].name.clone(),
                            target_concept: task.snapshot.concepts[1].name.clone(),
                            relationship: "related_to".to_string(),
                            confidence: Some(0.8),
                        });
                    }
                    AgentResult {
                        concept_links: links,
                        ..Default::default()
                    }
                }
                _ => {
                    let resource = task.snapshot.resource.as_ref().unwrap();
                    let mut result = AgentResult {
                        concepts: vec![ConceptEntry {
                            name: format!("{} concept", resource.title),
                            description: String::new(),
                            aliases: vec![],
                        }],
                        ..Default::default()
                    };
                    if let Some(chunk) = task.snapshot.chunks.first() {
                        result.chunk_links.push(ChunkLink {
                            concept_name: format!("{} concept", resource.title),
                            relationship: "introduces".to_string(),
                            chunk_title: chunk.title.clone(),
                            confidence: None,
                        });
                    }
                    result
                }
            };
            RunReport {
                outcome: Ok(TaskOutcome::Output(result)),
                attempts: 1,
            }
        }

        async fn run_enrichment(
            &self,
            task: &AgentTask,
            cancel: &CancellationToken,
        ) -> RunReport<EnrichResult> {
            if cancel.is_cancelled() {
                return RunReport {
                    outcome: Ok(TaskOutcome::Cancelled),
                    attempts: 0,
                };
            }
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            let chunk_title = task
                .snapshot
                .chunks
                .first()
                .map(|c| c.title.clone())
                .unwrap_or_default();
            RunReport {
                outcome: Ok(TaskOutcome::Output(EnrichResult {
                    questions: vec![QuestionRecord {
                        chunk_title,
                        label: "1(a)".to_string(),
                        marks: Some(2),
                        mark_scheme: None,
                    }],
                    concept_content: vec![],
                })),
                attempts: 1,
            }
        }
    }

    fn seed_resource(store: &GraphStore, session: &str, title: &str, kind: ResourceKind) -> Resource {
        let resource = Resource::new(session, title, kind);
        store.insert_resource(&resource).unwrap();
        let chunk = ogma_types::Chunk::new(&resource.id, format!("{title} 1.1"), "content");
        store.insert_chunk(&chunk).unwrap();
        resource
    }

    fn make_orchestrator(runner: Arc<dyn TaskRunner>) -> (Arc<GraphStore>, PhaseOrchestrator) {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let orchestrator = PhaseOrchestrator::new(
            store.clone(),
            runner,
            Arc::new(WorkQueues::new(2)),
            SessionBatchTracker::new(),
            OrchestratorConfig::default(),
        );
        (store, orchestrator)
    }

    #[tokio::test]
    async fn test_full_run_completes_all_phases() {
        let runner = Arc::new(MockRunner::new());
        let (store, orchestrator) = make_orchestrator(runner.clone());
        seed_resource(&store, "s1", "Lecture Notes", ResourceKind::Foundation);
        seed_resource(&store, "s1", "Problem Sheet", ResourceKind::Linking);
        seed_resource(&store, "s1", "Past Paper", ResourceKind::Linking);

        let status = orchestrator.run_session("s1").await.unwrap();

        assert!(!status.cancelled);
        assert!(status.phase.current.is_none());
        for resource in &status.resources {
            assert_eq!(resource.status, ResourceState::Completed, "{resource:?}");
            assert_eq!(resource.attempts, 1);
            assert!(resource.duration_ms.is_some());
        }
        assert_eq!(status.phase.phase1.status, PhaseState::Completed);
        assert_eq!(status.phase.phase1.completed, Some(1));
        assert_eq!(status.phase.phase2.completed, Some(2));
        assert_eq!(status.phase.phase3.status, PhaseState::Completed);
        assert_eq!(status.phase.phase3.links_added, Some(1));
        assert_eq!(status.phase.phase4.status, PhaseState::Completed);
        assert!(status.phase.phase4.stats.is_some());
        assert_eq!(status.phase.phase5.status, PhaseState::Completed);
        assert_eq!(status.phase.phase5.completed, Some(3));

        // Graph state: one concept per resource, edges in place
        assert_eq!(store.list_session_concepts("s1").unwrap().len(), 3);
        assert!(!store.list_session_relationships("s1").unwrap().is_empty());
        // Enrichment stored question records
        let resources = store.list_session_resources("s1").unwrap();
        assert!(resources.iter().all(|r| r.graph_indexed));
        assert!(
            resources
                .iter()
                .any(|r| !store.list_resource_questions(&r.id).unwrap().is_empty())
        );
    }

    #[tokio::test]
    async fn test_unit_failure_never_blocks_siblings() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        let good = seed_resource(&store, "s1", "Good", ResourceKind::Linking);
        let bad = seed_resource(&store, "s1", "Bad", ResourceKind::Linking);

        let runner = Arc::new(MockRunner::failing(&[bad.id.as_str()]));
        let orchestrator = PhaseOrchestrator::new(
            store.clone(),
            runner,
            Arc::new(WorkQueues::new(2)),
            SessionBatchTracker::new(),
            OrchestratorConfig::default(),
        );

        let status = orchestrator.run_session("s1").await.unwrap();

        assert!(!status.cancelled);
        let good_status = status.resources.iter().find(|r| r.id == good.id).unwrap();
        let bad_status = status.resources.iter().find(|r| r.id == bad.id).unwrap();
        assert_eq!(good_status.status, ResourceState::Completed);
        assert_eq!(bad_status.status, ResourceState::Failed);
        assert_eq!(bad_status.error_type, Some(IndexErrorKind::LlmError));
        assert_eq!(bad_status.attempts, 3);

        // The phase records one failure and later phases still ran
        assert_eq!(status.phase.phase2.completed, Some(1));
        assert_eq!(status.phase.phase2.failed, Some(1));
        assert_eq!(status.phase.phase4.status, PhaseState::Completed);
    }

    #[tokio::test]
    async fn test_cancellation_skips_unstarted_units() {
        let store = Arc::new(GraphStore::open_in_memory().unwrap());
        seed_resource(&store, "s1", "First", ResourceKind::Foundation);
        seed_resource(&store, "s1", "Second", ResourceKind::Foundation);
        seed_resource(&store, "s1", "Third", ResourceKind::Foundation);

        let mut mock = MockRunner::new();
        mock.delay = Duration::from_millis(80);
        let runner = Arc::new(mock);
        let tracker = SessionBatchTracker::new();
        let orchestrator = Arc::new(PhaseOrchestrator::new(
            store.clone(),
            runner.clone(),
            Arc::new(WorkQueues::new(2)),
            tracker.clone(),
            OrchestratorConfig::default(),
        ));

        // Cancel while the first (sequential) unit is in flight
        let tracker_clone = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tracker_clone.cancel("s1").await;
        });

        let status = orchestrator.run_session("s1").await.unwrap();

        assert!(status.cancelled);
        // The one in-flight unit ran to completion; its committed work survives
        let completed = status
            .resources
            .iter()
            .filter(|r| r.status == ResourceState::Completed)
            .count();
        assert_eq!(completed, 1);
        assert_eq!(store.list_session_concepts("s1").unwrap().len(), 1);

        // Every unstarted unit reports cancelled, and no further agent ran
        let cancelled = status
            .resources
            .iter()
            .filter(|r| r.status == ResourceState::Cancelled)
            .count();
        assert_eq!(cancelled, 2);
        assert_eq!(runner.spawns(), 1, "no subprocess after the flag was observed");

        // Later phases were skipped
        assert_eq!(status.phase.phase2.status, PhaseState::Skipped);
        assert_eq!(status.phase.phase3.status, PhaseState::Skipped);
        assert_eq!(status.phase.phase4.status, PhaseState::Skipped);
        assert_eq!(status.phase.phase5.status, PhaseState::Skipped);
    }

    #[tokio::test]
    async fn test_empty_phases_are_skipped() {
        let runner = Arc::new(MockRunner::new());
        let (store, orchestrator) = make_orchestrator(runner);
        seed_resource(&store, "s1", "Only Linking", ResourceKind::Linking);

        let status = orchestrator.run_session("s1").await.unwrap();

        assert_eq!(status.phase.phase1.status, PhaseState::Skipped);
        assert_eq!(status.phase.phase2.status, PhaseState::Completed);
        // Only one concept exists, so the mock proposes no cross-links
        assert_eq!(status.phase.phase3.status, PhaseState::Completed);
        assert_eq!(status.phase.phase3.links_added, Some(0));
    }

    #[tokio::test]
    async fn test_no_output_extraction_skips_cross_link() {
        let mut mock = MockRunner::new();
        mock.no_output = true;
        let runner = Arc::new(mock);
        let (store, orchestrator) = make_orchestrator(runner);
        seed_resource(&store, "s1", "Quiet", ResourceKind::Foundation);

        let status = orchestrator.run_session("s1").await.unwrap();

        // No-output extraction is a valid completion, not a failure
        assert_eq!(status.resources[0].status, ResourceState::Completed);
        // With zero concepts in the graph, phase 3 has nothing to do
        assert_eq!(status.phase.phase3.status, PhaseState::Skipped);
        assert_eq!(status.phase.phase4.status, PhaseState::Completed);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let runner = Arc::new(MockRunner::new());
        let (store, orchestrator) = make_orchestrator(runner);
        seed_resource(&store, "s1", "A", ResourceKind::Linking);

        let orchestrator = Arc::new(orchestrator);
        let tracker = orchestrator.tracker().clone();
        tracker.start("s1", vec!["held".to_string()]).await.unwrap();

        let result = orchestrator.run_session("s1").await;
        assert!(matches!(
            result,
            Err(IndexerError::Batch(ogma_batch::BatchError::AlreadyRunning(_)))
        ));
        let _ = store;
    }

    #[tokio::test]
    async fn test_status_polling_after_run() {
        let runner = Arc::new(MockRunner::new());
        let (store, orchestrator) = make_orchestrator(runner);
        seed_resource(&store, "s1", "A", ResourceKind::Linking);

        assert!(orchestrator.status("s1").await.is_none());
        orchestrator.run_session("s1").await.unwrap();

        // The last run's snapshot remains pollable after the batch is
        // discarded from the tracker
        let status = orchestrator.status("s1").await.unwrap();
        assert!(status.all_resources_terminal());
        assert!(orchestrator.tracker().status("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_index_resource_single_unit() {
        let runner = Arc::new(MockRunner::new());
        let (store, orchestrator) = make_orchestrator(runner);
        let resource = seed_resource(&store, "s1", "Solo", ResourceKind::Linking);

        let report = orchestrator.index_resource(&resource.id).await.unwrap();
        assert_eq!(report.concepts_created, 1);
        assert_eq!(report.relationships_inserted, 1);
        assert!(store.get_resource(&resource.id).unwrap().unwrap().graph_indexed);

        let missing = orchestrator.index_resource("nope").await;
        assert!(matches!(missing, Err(IndexerError::NotFound(_))));
    }
}
