//! The amortise command: drive the read/search densifier by hand.

use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;

use ogma_store::{Amortiser, GraphStore};

use crate::config::OgmaConfig;

/// Arguments for the amortise command.
#[derive(Args)]
pub struct AmortiseArgs {
    /// Session to amortise within
    #[arg(long)]
    pub session: String,

    /// Amortise a search: match this query and link results
    #[arg(long, conflicts_with = "chunk")]
    pub query: Option<String>,

    /// Amortise a read of this chunk id
    #[arg(long)]
    pub chunk: Option<String>,
}

pub fn run(args: AmortiseArgs, config: &OgmaConfig, json: bool) -> Result<()> {
    let store = Arc::new(GraphStore::open(&config.db_path)?);
    let amortiser = Amortiser::new(store.clone());

    let outcome = match (args.query, args.chunk) {
        (Some(query), None) => {
            let results = store.search_session_chunks(&args.session, &query)?;
            let chunk_ids: Vec<String> = results.iter().map(|c| c.id.clone()).collect();
            amortiser.on_search(&args.session, &query, &chunk_ids)
        }
        (None, Some(chunk_id)) => amortiser.on_read(&args.session, &chunk_id),
        _ => bail!("provide exactly one of --query or --chunk"),
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "created": outcome.created,
                "matchedConcepts": outcome.matched_concepts,
            })
        );
    } else {
        println!(
            "Amortisation created {} edges from {} matched concepts",
            outcome.created, outcome.matched_concepts
        );
    }
    Ok(())
}
