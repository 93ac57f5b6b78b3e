use anyhow::{Context, Result};
use clap::Parser;
use config::LoaderConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Workspace crates that log during a run.
const DEFAULT_LOG_FILTER: &str = "bulkload=info,loader=info,segment=info,builder=info";

/// Build sorted table segment files from hourly page-view dumps.
///
/// Settings come from the environment: BULKLOAD_OUTPUT_DIR, BULKLOAD_HASH,
/// BULKLOAD_SEGMENT_ROWS, BULKLOAD_SEGMENT_KB, BULKLOAD_JOBS.
#[derive(Parser)]
#[command(name = "bulkload")]
#[command(version)]
struct Cli {
    /// Input files named data-yyyyMMddHHmm.gz
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = LoaderConfig::from_env().context("invalid configuration")?;
    info!(schema = %config.schema, "table");

    let summary = bulkload::run(&config, &cli.files).context("load aborted")?;
    println!("{}", summary);
    Ok(())
}
