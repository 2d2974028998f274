//! Ogma - knowledge-graph indexing of study materials.
//!
//! Main entry point for the ogma CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{amortise, cleanup, index, merge, status};
use config::OgmaConfig;

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Ogma - knowledge-graph indexing of study materials
#[derive(Parser)]
#[command(name = "ogma")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file path (default: $XDG_CONFIG_HOME/ogma/ogma.toml)
    #[arg(long, global = true, env = "OGMA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the indexing pipeline for a session or a single resource
    Index(index::IndexArgs),

    /// Show graph and resource state for a session
    Status(status::StatusArgs),

    /// Run the dedup/orphan/integrity cleanup passes
    Cleanup(cleanup::CleanupArgs),

    /// Merge duplicate concepts into a canonical one
    Merge(merge::MergeArgs),

    /// Amortise a search or read into low-confidence edges
    Amortise(amortise::AmortiseArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "ogma=debug,ogma_indexer=debug,ogma_runner=debug,ogma_store=debug,ogma_batch=debug,info"
    } else {
        "ogma=info,ogma_indexer=info,ogma_runner=info,ogma_store=info,warn"
    };

    let log_dir = config::xdg_data_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "ogma.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "ogma=debug,ogma_indexer=debug,ogma_runner=debug,ogma_store=debug,info",
                )),
        )
        .init();

    let config = OgmaConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Index(args) => index::run(args, &config, cli.json).await,
        Commands::Status(args) => status::run(args, &config, cli.json),
        Commands::Cleanup(args) => cleanup::run(args, &config, cli.json),
        Commands::Merge(args) => merge::run(args, &config, cli.json),
        Commands::Amortise(args) => amortise::run(args, &config, cli.json),
    }
}
