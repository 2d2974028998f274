//! ogma-toolserver: serves one snapshot over stdio.
//!
//! Launched by the external agent from the `tools.json` definition the
//! runner stages into each task workdir. Stdout carries the protocol, so
//! diagnostics go to stderr.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ogma_protocol::{ARTIFACT_FILE, Snapshot, ToolServer};

/// Snapshot-backed tool server for Ogma extraction agents.
#[derive(Parser)]
#[command(name = "ogma-toolserver")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing snapshot.json.
    #[arg(long)]
    snapshot: PathBuf,

    /// Where to write the result artifact (defaults to <snapshot>/result.json).
    #[arg(long)]
    artifact: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let snapshot = Snapshot::read_from(&args.snapshot)?;
    let artifact = args
        .artifact
        .unwrap_or_else(|| args.snapshot.join(ARTIFACT_FILE));

    let mut server = ToolServer::new(snapshot, artifact);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut reader = BufReader::new(stdin.lock());
    let mut writer = BufWriter::new(stdout.lock());
    server.serve(&mut reader, &mut writer)?;

    Ok(())
}
