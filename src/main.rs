//! `kennel-ingest`: loads PA kennel inspection PDFs into a SQLite store.
//!
//! `inventory` lists the corpus, `ingest` extracts and persists reports in resumable batches
//! and `status` summarizes what the store already holds.

mod cli;
mod commands;
mod model;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Overrides `RUST_LOG` for this tool only.
const LOG_ENV: &str = "KENNEL_INGEST_LOG";

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "kennel-ingest failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Commands::Inventory(args) => commands::inventory::run(args),
        Commands::Ingest(args) => commands::ingest::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|value| EnvFilter::try_new(value).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn init_tracing() {
    let directives = std::env::var(LOG_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
