use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use super::DB_SCHEMA_VERSION;
use super::batch::{PipelineOptions, RunReport, run_batches};
use super::db_setup::{configure_connection, ensure_schema, verify_schema};
use super::dispatch::{CancelToken, DispatchOptions, default_channel_capacity, resolve_worker_count};
use super::errors::FatalConfigError;
use super::extract::PdfToText;
use super::parse::InspectionParser;
use super::types::DocumentRef;
use crate::cli::IngestArgs;
use crate::commands::inventory;
use crate::model::{
    CorpusManifest, IngestPaths, IngestRunManifest, IngestSettings, OutcomeCounts,
};
use crate::util::{ensure_directory, now_utc_string, read_json, utc_compact_string, write_json_pretty};

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let cache_root = args.cache_root.clone();
    let manifest_dir = cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;

    let corpus_manifest_path = args
        .corpus_manifest_path
        .clone()
        .unwrap_or_else(|| inventory::default_manifest_path(&cache_root));
    let run_manifest_path = args.run_manifest_path.clone().unwrap_or_else(|| {
        manifest_dir.join(format!("ingest_run_{}.json", utc_compact_string(started_ts)))
    });

    info!(
        corpus_root = %args.corpus_root.display(),
        db_path = %args.db_path.display(),
        run_id = %run_id,
        "starting ingest"
    );

    let corpus = load_or_refresh_corpus(
        &args.corpus_root,
        &corpus_manifest_path,
        args.refresh_corpus,
    )
    .map_err(|error| FatalConfigError::Corpus(format!("{error:#}")))?;

    let mut documents = corpus
        .documents
        .iter()
        .map(DocumentRef::from)
        .collect::<Vec<_>>();
    if let Some(previous_run) = &args.retry_failures_from {
        documents = select_previous_failures(&documents, previous_run)?;
    }

    let (start, end) = resolve_range(args.start, args.end, documents.len())?;
    let selected = &documents[start..end];

    let mut connection = Connection::open(&args.db_path).map_err(|error| {
        FatalConfigError::Store(format!("failed to open {}: {error}", args.db_path.display()))
    })?;
    configure_connection(&connection)?;
    if args.no_schema {
        verify_schema(&connection)?;
    } else {
        ensure_schema(&connection).context("failed to initialize store schema")?;
    }

    let workers = resolve_worker_count(args.workers, args.max_workers);
    let channel_capacity = args
        .channel_capacity
        .unwrap_or_else(|| default_channel_capacity(workers));
    let options = PipelineOptions {
        batch_size: args.batch_size,
        resume: args.resume,
        dispatch: DispatchOptions {
            workers,
            channel_capacity,
            grace_period: Duration::from_secs(args.grace_period_secs),
        },
        progress_interval: Duration::from_secs(args.progress_interval_secs),
    };

    let parser = InspectionParser::new()?;
    let extractor = PdfToText::new(Duration::from_secs(args.extract_timeout_secs))
        .with_program(&args.pdftotext);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("interrupt received; finishing in-flight documents");
        handler_token.cancel();
    })
    .context("failed to install interrupt handler")?;

    info!(
        documents = selected.len(),
        start,
        end,
        workers,
        channel_capacity,
        batch_size = args.batch_size,
        resume = args.resume,
        "ingest configured"
    );

    let report = run_batches(
        &mut connection,
        selected,
        start,
        &extractor,
        &parser,
        &options,
        &cancel,
    );
    log_summary(&report);

    let status = if report.halted_at.is_some() {
        "aborted"
    } else {
        "completed"
    };
    let manifest = IngestRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        db_schema_version: DB_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_ingest_command(&args),
        paths: IngestPaths {
            corpus_root: args.corpus_root.display().to_string(),
            corpus_manifest_path: corpus_manifest_path.display().to_string(),
            db_path: args.db_path.display().to_string(),
        },
        settings: IngestSettings {
            workers,
            batch_size: args.batch_size,
            channel_capacity,
            start,
            end,
            resume: args.resume,
            schema_init: !args.no_schema,
        },
        batches_completed: report.batches_completed,
        counts: report.counts,
        halted_at: report.halted_at.clone(),
        failures: report.failures.clone(),
    };
    write_json_pretty(&run_manifest_path, &manifest)?;
    info!(path = %run_manifest_path.display(), status, "wrote ingest run manifest");

    if let Some(halted) = &report.halted_at {
        bail!(
            "ingest aborted at batch {} (corpus offset {}, {} documents not attempted): {}; \
             rerun with --resume --start {} to continue",
            halted.batch_index,
            halted.corpus_offset,
            halted.not_attempted,
            halted.reason,
            halted.corpus_offset
        );
    }

    Ok(())
}

fn load_or_refresh_corpus(
    corpus_root: &Path,
    corpus_manifest_path: &Path,
    refresh_corpus: bool,
) -> Result<CorpusManifest> {
    if refresh_corpus || !corpus_manifest_path.exists() {
        let manifest = inventory::build_manifest(corpus_root)?;
        write_json_pretty(corpus_manifest_path, &manifest)?;
        info!(
            path = %corpus_manifest_path.display(),
            document_count = manifest.document_count,
            "refreshed corpus manifest"
        );
        return Ok(manifest);
    }

    let manifest: CorpusManifest = read_json(corpus_manifest_path)?;
    if manifest.documents.is_empty() {
        bail!("corpus manifest {} lists no documents", corpus_manifest_path.display());
    }

    info!(
        path = %corpus_manifest_path.display(),
        document_count = manifest.document_count,
        "loaded existing corpus manifest"
    );

    Ok(manifest)
}

/// Keeps the corpus documents that failed in `previous_run`, in that manifest's order.
pub(super) fn select_previous_failures(
    documents: &[DocumentRef],
    previous_run: &Path,
) -> Result<Vec<DocumentRef>> {
    let manifest: IngestRunManifest = read_json(previous_run)?;
    let by_path = documents
        .iter()
        .map(|document| (document.path_key(), document))
        .collect::<HashMap<_, _>>();

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for failure in &manifest.failures {
        if !seen.insert(failure.path.as_str()) {
            continue;
        }
        match by_path.get(&failure.path) {
            Some(document) => selected.push((*document).clone()),
            None => warn!(path = %failure.path, "previous failure is no longer in the corpus"),
        }
    }

    info!(
        path = %previous_run.display(),
        previous_failures = manifest.failures.len(),
        selected = selected.len(),
        "restricted corpus to previous failures"
    );

    Ok(selected)
}

pub(super) fn resolve_range(
    start: Option<usize>,
    end: Option<usize>,
    len: usize,
) -> Result<(usize, usize), FatalConfigError> {
    let end = end.unwrap_or(len).min(len);
    let start = start.unwrap_or(0);
    if start > end {
        return Err(FatalConfigError::Corpus(format!(
            "start index {start} is past end index {end} (corpus has {len} documents)"
        )));
    }
    Ok((start, end))
}

fn log_summary(report: &RunReport) {
    let OutcomeCounts {
        seen,
        imported,
        skipped_already_done,
        skipped_unresolved_owner,
        parse_failed,
        persist_failed,
        not_attempted,
    } = report.counts;

    info!(
        seen,
        imported,
        skipped_already_done,
        skipped_unresolved_owner,
        parse_failed,
        persist_failed,
        not_attempted,
        batches = report.batches_completed,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "ingest summary"
    );
}

pub(super) fn render_ingest_command(args: &IngestArgs) -> String {
    let mut command = vec![
        "kennel-ingest".to_string(),
        "ingest".to_string(),
        "--corpus-root".to_string(),
        args.corpus_root.display().to_string(),
        "--db-path".to_string(),
        args.db_path.display().to_string(),
        "--batch-size".to_string(),
        args.batch_size.to_string(),
    ];

    if let Some(path) = &args.corpus_manifest_path {
        command.push("--corpus-manifest-path".to_string());
        command.push(path.display().to_string());
    }
    if args.refresh_corpus {
        command.push("--refresh-corpus".to_string());
    }
    if let Some(workers) = args.workers {
        command.push("--workers".to_string());
        command.push(workers.to_string());
    }
    if let Some(start) = args.start {
        command.push("--start".to_string());
        command.push(start.to_string());
    }
    if let Some(end) = args.end {
        command.push("--end".to_string());
        command.push(end.to_string());
    }
    if args.resume {
        command.push("--resume".to_string());
    }
    if args.no_schema {
        command.push("--no-schema".to_string());
    }
    if let Some(path) = &args.retry_failures_from {
        command.push("--retry-failures-from".to_string());
        command.push(path.display().to_string());
    }

    command.join(" ")
}
