//! The cleanup command: dedup, orphan removal, integrity repair.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use ogma_store::{GraphCleanup, GraphStore};

use crate::config::OgmaConfig;

/// Arguments for the cleanup command.
#[derive(Args)]
pub struct CleanupArgs {
    /// Session to clean up
    #[arg(long)]
    pub session: String,
}

pub fn run(args: CleanupArgs, config: &OgmaConfig, json: bool) -> Result<()> {
    let store = Arc::new(GraphStore::open(&config.db_path)?);
    let stats = GraphCleanup::new(store).run(&args.session)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "duplicatesRemoved": stats.duplicates_removed,
                "orphansRemoved": stats.orphans_removed,
                "danglingRemoved": stats.dangling_removed,
            })
        );
    } else {
        println!(
            "Cleanup removed {} duplicates, {} orphaned concepts, {} dangling relationships",
            stats.duplicates_removed, stats.orphans_removed, stats.dangling_removed
        );
    }
    Ok(())
}
