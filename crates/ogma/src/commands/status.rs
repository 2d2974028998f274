//! The status command: graph and resource state for a session.

use anyhow::Result;
use clap::Args;

use ogma_store::GraphStore;

use crate::config::OgmaConfig;

/// Arguments for the status command.
#[derive(Args)]
pub struct StatusArgs {
    /// Session to report on
    #[arg(long)]
    pub session: String,
}

pub fn run(args: StatusArgs, config: &OgmaConfig, json: bool) -> Result<()> {
    let store = GraphStore::open(&config.db_path)?;
    let stats = store.session_stats(&args.session)?;
    let resources = store.list_session_resources(&args.session)?;

    if json {
        let resources: Vec<_> = resources
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "title": r.title,
                    "kind": r.kind,
                    "indexed": r.indexed,
                    "graphIndexed": r.graph_indexed,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "sessionId": args.session,
                "resources": resources,
                "conceptCount": stats.concept_count,
                "relationshipCount": stats.relationship_count,
            }))?
        );
    } else {
        println!(
            "Session {}: {} resources, {} concepts, {} relationships",
            args.session, stats.resource_count, stats.concept_count, stats.relationship_count
        );
        for resource in &resources {
            println!(
                "  {} \"{}\" [{}]{}",
                resource.id,
                resource.title,
                resource.kind.as_str(),
                if resource.graph_indexed { " indexed" } else { "" }
            );
        }
    }
    Ok(())
}
