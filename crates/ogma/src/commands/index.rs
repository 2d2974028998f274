//! The index command: run a session batch or a single resource.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use tracing::info;

use ogma_batch::{SessionBatchTracker, WorkQueues};
use ogma_indexer::PhaseOrchestrator;
use ogma_runner::AgentRunner;
use ogma_store::GraphStore;

use crate::config::OgmaConfig;

/// Arguments for the index command.
#[derive(Args)]
pub struct IndexArgs {
    /// Index every resource in this session (five-phase pipeline)
    #[arg(long, conflicts_with = "resource")]
    pub session: Option<String>,

    /// Index one resource outside any batch
    #[arg(long)]
    pub resource: Option<String>,

    /// Use the thorough effort tier (larger turn budget)
    #[arg(long)]
    pub thorough: bool,
}

pub async fn run(args: IndexArgs, config: &OgmaConfig, json: bool) -> Result<()> {
    let store = Arc::new(GraphStore::open(&config.db_path)?);
    let runner = Arc::new(AgentRunner::new(config.runner_config()));
    let orchestrator = Arc::new(PhaseOrchestrator::new(
        store,
        runner,
        Arc::new(WorkQueues::new(config.graph_ceiling)),
        SessionBatchTracker::new(),
        config.orchestrator_config(args.thorough),
    ));

    match (args.session, args.resource) {
        (Some(session_id), None) => {
            // Ctrl-C requests cooperative cancellation; in-flight units
            // run to completion and their work is kept.
            let tracker = orchestrator.tracker().clone();
            let cancel_session = session_id.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!(session_id = %cancel_session, "Interrupt received, cancelling batch");
                    tracker.cancel(&cancel_session).await;
                }
            });

            let status = orchestrator.run_session(&session_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                let completed = status
                    .resources
                    .iter()
                    .filter(|r| r.status == ogma_indexer::ResourceState::Completed)
                    .count();
                let failed = status
                    .resources
                    .iter()
                    .filter(|r| r.status == ogma_indexer::ResourceState::Failed)
                    .count();
                println!(
                    "{}: {completed}/{} resources indexed, {failed} failed",
                    if status.cancelled { "CANCELLED" } else { "COMPLETED" },
                    status.resources.len(),
                );
                for resource in &status.resources {
                    let detail = resource
                        .error_message
                        .as_deref()
                        .map(|m| format!(" ({m})"))
                        .unwrap_or_default();
                    println!(
                        "  {} {:?} attempts={}{}",
                        resource.id, resource.status, resource.attempts, detail
                    );
                }
            }
        }
        (None, Some(resource_id)) => {
            let report = orchestrator.index_resource(&resource_id).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "conceptsCreated": report.concepts_created,
                        "conceptsUpdated": report.concepts_updated,
                        "relationshipsInserted": report.relationships_inserted,
                        "relationshipsRemoved": report.relationships_removed,
                        "linksSkipped": report.links_skipped,
                    })
                );
            } else {
                println!(
                    "Indexed {resource_id}: {} concepts created, {} relationships inserted \
                     ({} stale removed)",
                    report.concepts_created,
                    report.relationships_inserted,
                    report.relationships_removed
                );
            }
        }
        _ => bail!("provide exactly one of --session or --resource"),
    }

    Ok(())
}
