use std::time::{Duration, Instant};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::dispatch::{CancelToken, DispatchEvent, DispatchOptions, dispatch_batch};
use super::extract::TextExtractor;
use super::parse::InspectionParser;
use super::persist::apply_result;
use super::resume::prune_completed;
use super::types::{DocumentRef, ImportOutcome};
use crate::model::{HaltedBoundary, OutcomeCounts, RunFailure};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub resume: bool,
    pub dispatch: DispatchOptions,
    pub progress_interval: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub counts: OutcomeCounts,
    pub batches_completed: usize,
    pub halted_at: Option<HaltedBoundary>,
    pub failures: Vec<RunFailure>,
    pub elapsed: Duration,
}

struct ProgressReporter {
    started: Instant,
    last_report: Instant,
    interval: Duration,
}

impl ProgressReporter {
    fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last_report: now,
            interval,
        }
    }

    fn maybe_report(&mut self, counts: &OutcomeCounts) {
        if self.last_report.elapsed() >= self.interval {
            self.report(counts, "ingest progress");
        }
    }

    fn report(&mut self, counts: &OutcomeCounts, message: &str) {
        self.last_report = Instant::now();
        info!(
            seen = counts.seen,
            imported = counts.imported,
            skipped = counts.skipped(),
            failed = counts.failed(),
            elapsed_secs = self.started.elapsed().as_secs(),
            "{message}"
        );
    }
}

/// Processes `documents` batch by batch, persisting every result through `connection`.
///
/// `corpus_offset` is the corpus index of `documents[0]`, used to report where a halted run
/// stopped. Halting never returns an error; it is recorded in [`RunReport::halted_at`].
pub fn run_batches<E>(
    connection: &mut Connection,
    documents: &[DocumentRef],
    corpus_offset: usize,
    extractor: &E,
    parser: &InspectionParser,
    options: &PipelineOptions,
    cancel: &CancelToken,
) -> RunReport
where
    E: TextExtractor + ?Sized,
{
    let batch_size = options.batch_size.max(1);
    let mut report = RunReport::default();
    let mut progress = ProgressReporter::new(options.progress_interval);

    for (batch_index, batch) in documents.chunks(batch_size).enumerate() {
        let batch_start = batch_index * batch_size;
        let remaining_after_batch = documents.len() - batch_start - batch.len();
        let boundary = |not_attempted: usize, reason: String| HaltedBoundary {
            batch_index,
            corpus_offset: corpus_offset + batch_start,
            not_attempted,
            reason,
        };

        if cancel.is_cancelled() {
            report.halted_at = Some(boundary(
                batch.len() + remaining_after_batch,
                "cancelled before batch start".to_string(),
            ));
            break;
        }

        let pending = if options.resume {
            match prune_completed(connection, batch) {
                Ok((pending, completed)) => {
                    for _ in 0..completed {
                        ImportOutcome::SkippedAlreadyDone.tally(&mut report.counts);
                    }
                    pending
                }
                Err(error) => {
                    report.halted_at = Some(boundary(
                        batch.len() + remaining_after_batch,
                        format!("resume lookup failed: {error}"),
                    ));
                    break;
                }
            }
        } else {
            batch.to_vec()
        };

        info!(
            batch = batch_index,
            corpus_offset = corpus_offset + batch_start,
            documents = batch.len(),
            pending = pending.len(),
            "dispatching batch"
        );

        let seen_before_dispatch = report.counts.seen;
        let counts = &mut report.counts;
        let failures = &mut report.failures;
        let dispatched = dispatch_batch(
            &pending,
            extractor,
            parser,
            &options.dispatch,
            cancel,
            |event| {
                let result = match event {
                    DispatchEvent::Completed(result) => result,
                    DispatchEvent::Idle => {
                        progress.maybe_report(counts);
                        return Ok(());
                    }
                };
                let outcome = apply_result(connection, &result)?;
                outcome.tally(counts);
                match &outcome {
                    ImportOutcome::Imported {
                        inspection_id,
                        violations,
                    } => debug!(
                        path = %result.document.path.display(),
                        inspection_id,
                        violations,
                        "imported"
                    ),
                    ImportOutcome::SkippedUnresolvedOwner { owner_key } => debug!(
                        path = %result.document.path.display(),
                        owner_key = %owner_key,
                        "no kennel matches document owner"
                    ),
                    _ => {}
                }
                if let Some(reason) = outcome.failure_reason() {
                    warn!(
                        path = %result.document.path.display(),
                        outcome = outcome.label(),
                        reason = %reason,
                        "document not imported"
                    );
                    failures.push(RunFailure {
                        path: result.document.path_key(),
                        owner_key: result.document.owner_key.clone(),
                        outcome: outcome.label().to_string(),
                        reason: reason.to_string(),
                    });
                }
                progress.maybe_report(counts);
                Ok(())
            },
        );

        let (delivered, halt_reason) = match dispatched {
            Ok(dispatch) if dispatch.delivered < pending.len() => {
                let reason = if dispatch.cancelled {
                    "cancelled during batch"
                } else {
                    "workers stopped before the batch drained"
                };
                (dispatch.delivered, Some(reason.to_string()))
            }
            Ok(dispatch) => (dispatch.delivered, None),
            // The result that failed was received but never tallied.
            Err(error) => (
                report.counts.seen - seen_before_dispatch,
                Some(format!("{error:#}")),
            ),
        };

        if let Some(reason) = halt_reason {
            let not_attempted = pending.len().saturating_sub(delivered) + remaining_after_batch;
            report.halted_at = Some(boundary(not_attempted, reason));
            break;
        }

        report.batches_completed += 1;
        progress.report(&report.counts, "batch completed");
    }

    if let Some(halted) = &report.halted_at {
        report.counts.not_attempted = halted.not_attempted;
        warn!(
            batch = halted.batch_index,
            corpus_offset = halted.corpus_offset,
            not_attempted = halted.not_attempted,
            reason = %halted.reason,
            "ingest halted"
        );
    }
    report.elapsed = progress.started.elapsed();
    report
}
