use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "kennel-ingest",
    version,
    about = "Parallel, resumable import of PA kennel inspection reports into SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Inventory(InventoryArgs),
    Ingest(IngestArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct InventoryArgs {
    #[arg(long, default_value = "kennel_inspections")]
    pub corpus_root: PathBuf,

    #[arg(long, default_value = ".cache/kennel-ingest")]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, default_value = "kennel_inspections")]
    pub corpus_root: PathBuf,

    #[arg(long, default_value = ".cache/kennel-ingest")]
    pub cache_root: PathBuf,

    #[arg(long, default_value = "kennel_inspections.db")]
    pub db_path: PathBuf,

    #[arg(long)]
    pub corpus_manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub run_manifest_path: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub refresh_corpus: bool,

    /// Parser workers; defaults to the number of logical CPUs.
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long, default_value_t = 32)]
    pub max_workers: usize,

    #[arg(long, default_value_t = 500)]
    pub batch_size: usize,

    /// First corpus index to process (0-based, inclusive).
    #[arg(long)]
    pub start: Option<usize>,

    /// Last corpus index to process (exclusive).
    #[arg(long)]
    pub end: Option<usize>,

    /// Skip documents whose import already committed.
    #[arg(long, alias = "skip-existing", default_value_t = false)]
    pub resume: bool,

    #[arg(long, default_value_t = false)]
    pub no_schema: bool,

    #[arg(long)]
    pub channel_capacity: Option<usize>,

    #[arg(long, default_value_t = 10)]
    pub grace_period_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub extract_timeout_secs: u64,

    /// Converter invoked as `<program> -layout -enc UTF-8 <pdf> <out>`.
    #[arg(long, default_value = "pdftotext")]
    pub pdftotext: PathBuf,

    #[arg(long, default_value_t = 15)]
    pub progress_interval_secs: u64,

    /// Restrict the corpus to the failures recorded in a previous run manifest.
    #[arg(long)]
    pub retry_failures_from: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "kennel_inspections")]
    pub corpus_root: PathBuf,

    #[arg(long, default_value = "kennel_inspections.db")]
    pub db_path: PathBuf,
}
