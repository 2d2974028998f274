//! The merge command: fold duplicate concepts into a canonical one.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use ogma_store::{GraphCleanup, GraphStore};

use crate::config::OgmaConfig;

/// Arguments for the merge command.
#[derive(Args)]
pub struct MergeArgs {
    /// Session the concepts live in
    #[arg(long)]
    pub session: String,

    /// Canonical concept name to merge into
    #[arg(long)]
    pub canonical: String,

    /// Duplicate concept names to fold in (repeatable)
    #[arg(long = "into", required = true)]
    pub merge_names: Vec<String>,
}

pub fn run(args: MergeArgs, config: &OgmaConfig, json: bool) -> Result<()> {
    let store = Arc::new(GraphStore::open(&config.db_path)?);
    let stats =
        GraphCleanup::new(store).merge_concepts(&args.session, &args.canonical, &args.merge_names)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "conceptsMerged": stats.concepts_merged,
                "relationshipsRedirected": stats.relationships_redirected,
                "duplicatesRemoved": stats.duplicates_removed,
            })
        );
    } else {
        println!(
            "Merged {} concepts into \"{}\" ({} relationships redirected, {} duplicate edges removed)",
            stats.concepts_merged, args.canonical, stats.relationships_redirected,
            stats.duplicates_removed
        );
    }
    Ok(())
}
