use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{RecvTimeoutError, bounded};
use tracing::{debug, warn};

use super::extract::TextExtractor;
use super::parse::InspectionParser;
use super::types::{DocumentRef, ParseFailure, ParsedRecord, WorkResult};

const RECV_POLL: Duration = Duration::from_millis(100);

/// Shared stop signal; set from the interrupt handler or by a failing consumer.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub workers: usize,
    pub channel_capacity: usize,
    pub grace_period: Duration,
}

/// What the consumer sees on each turn of the receive loop.
#[derive(Debug)]
pub enum DispatchEvent {
    Completed(WorkResult),
    /// No result arrived within the receive poll interval.
    Idle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub cancelled: bool,
}

pub fn resolve_worker_count(requested: Option<usize>, max_workers: usize) -> usize {
    requested
        .unwrap_or_else(num_cpus::get)
        .clamp(1, max_workers.max(1))
}

pub fn default_channel_capacity(workers: usize) -> usize {
    (workers * 2).max(4)
}

/// Runs extraction and parsing for `documents` on `options.workers` threads and hands every
/// result to `consume` on the calling thread, in completion order. `consume` also receives
/// [`DispatchEvent::Idle`] whenever a receive poll times out.
///
/// Producers block when the bounded result channel is full. After cancellation no new
/// document is started; results already in flight are still consumed until the grace period
/// runs out, after which the rest are dropped.
pub fn dispatch_batch<E, F>(
    documents: &[DocumentRef],
    extractor: &E,
    parser: &InspectionParser,
    options: &DispatchOptions,
    cancel: &CancelToken,
    mut consume: F,
) -> Result<DispatchReport>
where
    E: TextExtractor + ?Sized,
    F: FnMut(DispatchEvent) -> Result<()>,
{
    if documents.is_empty() {
        return Ok(DispatchReport::default());
    }

    let workers = options.workers.clamp(1, documents.len());
    let halt_flag = AtomicBool::new(false);
    let halt = &halt_flag;
    let should_stop = move || cancel.is_cancelled() || halt.load(Ordering::SeqCst);

    thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<&DocumentRef>(workers);
        let (result_tx, result_rx) = bounded::<WorkResult>(options.channel_capacity.max(1));

        scope.spawn(move || {
            for document in documents {
                if should_stop() || job_tx.send(document).is_err() {
                    break;
                }
            }
        });

        for worker_index in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                let mut processed = 0usize;
                for document in job_rx.iter() {
                    if should_stop() {
                        break;
                    }
                    let record = extract_and_parse(extractor, parser, document);
                    let result = WorkResult {
                        document: document.clone(),
                        record,
                    };
                    if result_tx.send(result).is_err() {
                        break;
                    }
                    processed += 1;
                }
                debug!(worker = worker_index, processed, "worker finished");
            });
        }
        drop(job_rx);
        drop(result_tx);

        let mut report = DispatchReport::default();
        let mut drain_deadline: Option<Instant> = None;
        let mut outcome = Ok(());

        loop {
            if drain_deadline.is_none() && cancel.is_cancelled() {
                warn!(
                    grace_secs = options.grace_period.as_secs_f64(),
                    "cancellation requested; draining in-flight documents"
                );
                drain_deadline = Some(Instant::now() + options.grace_period);
            }
            if let Some(deadline) = drain_deadline {
                if Instant::now() >= deadline {
                    warn!("grace period elapsed; abandoning in-flight documents");
                    break;
                }
            }

            let (event, completed) = match result_rx.recv_timeout(RECV_POLL) {
                Ok(result) => (DispatchEvent::Completed(result), true),
                Err(RecvTimeoutError::Timeout) => (DispatchEvent::Idle, false),
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if let Err(error) = consume(event) {
                halt.store(true, Ordering::SeqCst);
                outcome = Err(error);
                break;
            }
            if completed {
                report.delivered += 1;
            }
        }

        // Workers blocked on handoff see a closed channel and exit.
        drop(result_rx);
        report.cancelled = cancel.is_cancelled();
        outcome.map(|()| report)
    })
}

fn extract_and_parse<E>(extractor: &E, parser: &InspectionParser, document: &DocumentRef) -> ParsedRecord
where
    E: TextExtractor + ?Sized,
{
    let text = match extractor.extract(document) {
        Ok(text) => text,
        Err(error) => return ParsedRecord::Failed(ParseFailure::Extraction(error)),
    };

    match parser.parse(&text) {
        Ok(record) => ParsedRecord::Parsed(Box::new(record)),
        Err(error) => ParsedRecord::Failed(ParseFailure::Parse(error)),
    }
}
