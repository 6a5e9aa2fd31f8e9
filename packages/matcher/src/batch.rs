//! Parallel batch resolution.
//!
//! Rows are dealt round-robin to a fixed pool of blocking workers. Each
//! worker owns its reference store connection and candidate cache, tags
//! every result with the row's original position, and bumps a shared
//! completion counter. A separate task polls the counter for progress
//! display; nothing in the matching path ever reads it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use geomatch_matcher_models::{AddressRecord, BatchSummary, MatchResult};
use tokio::sync::oneshot;

use crate::MatcherError;
use crate::engine::Matcher;
use crate::index::{ReferenceSource, ReferenceStore};
use crate::progress::{ProgressCallback, status_line};

/// Cooperative cancellation shared between the caller and the workers.
///
/// Workers check the flag between rows: a row already being resolved is
/// finished, the rest of the slice is left unprocessed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Results of a batch, aligned with the input rows.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Exactly one result per input row, in input order.
    pub results: Vec<MatchResult>,
    /// Positions skipped due to cancellation. They carry the empty result.
    pub unprocessed: Vec<usize>,
    /// Advisory counts and timing.
    pub summary: BatchSummary,
}

/// Resolves every row with `matcher.config().worker_count` parallel
/// workers.
///
/// Every worker opens its own store before any row is processed, so an
/// unreachable store fails the batch up front.
///
/// # Errors
///
/// Returns [`MatcherError::Retrieval`] if a store cannot be opened, or
/// [`MatcherError::Join`] if a worker task panics.
pub async fn run_batch(
    matcher: Arc<Matcher>,
    source: Arc<dyn ReferenceSource>,
    rows: Vec<AddressRecord>,
    progress: Arc<dyn ProgressCallback>,
    cancel: CancelFlag,
) -> Result<BatchOutcome, MatcherError> {
    let start = Instant::now();
    let total = rows.len();
    let worker_count = matcher.config().worker_count.min(total).max(1);

    log::info!("Resolving {total} rows with {worker_count} workers");

    let mut stores = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        stores.push(source.open()?);
    }

    progress.set_total(total as u64);

    let rows = Arc::new(rows);
    let completed = Arc::new(AtomicU64::new(0));
    let (stop_tx, stop_rx) = oneshot::channel();

    let reporter = tokio::spawn(report_progress(
        Arc::clone(&completed),
        total as u64,
        Duration::from_millis(matcher.config().progress_interval_ms),
        Arc::clone(&progress),
        start,
        stop_rx,
    ));

    let workers = stores.into_iter().enumerate().map(|(worker, store)| {
        let matcher = Arc::clone(&matcher);
        let rows = Arc::clone(&rows);
        let completed = Arc::clone(&completed);
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            resolve_slice(
                &matcher,
                store,
                &rows,
                worker,
                worker_count,
                &completed,
                &cancel,
            )
        })
    });

    let slices = futures::future::join_all(workers).await;

    let _ = stop_tx.send(());
    reporter.await?;

    let mut merged: Vec<Option<MatchResult>> = vec![None; total];
    for slice in slices {
        for (position, result) in slice? {
            merged[position] = Some(result);
        }
    }

    let mut unprocessed = Vec::new();
    let results: Vec<MatchResult> = merged
        .into_iter()
        .enumerate()
        .map(|(position, result)| {
            result.unwrap_or_else(|| {
                unprocessed.push(position);
                MatchResult::empty()
            })
        })
        .collect();

    let summary = summarize(&results, start.elapsed());
    let done = completed.load(Ordering::Relaxed);

    progress.set_position(done);
    progress.finish(format!(
        "{} | {} matched",
        status_line(done, total as u64, start.elapsed().as_secs()),
        summary.matched
    ));

    if unprocessed.is_empty() {
        log::info!(
            "Matched {}/{} rows ({:.1}%) in {:.1}s",
            summary.matched,
            summary.total,
            summary.match_rate(),
            summary.elapsed_secs
        );
    } else {
        log::warn!(
            "Batch cancelled: {} of {total} rows left unprocessed",
            unprocessed.len()
        );
    }

    Ok(BatchOutcome {
        results,
        unprocessed,
        summary,
    })
}

/// Resolves rows `worker, worker + worker_count, ...` in order.
fn resolve_slice(
    matcher: &Matcher,
    store: Box<dyn ReferenceStore>,
    rows: &[AddressRecord],
    worker: usize,
    worker_count: usize,
    completed: &AtomicU64,
    cancel: &CancelFlag,
) -> Vec<(usize, MatchResult)> {
    let mut index = matcher.index(store);
    let mut results = Vec::with_capacity(rows.len() / worker_count + 1);

    for position in (worker..rows.len()).step_by(worker_count) {
        if cancel.is_cancelled() {
            log::debug!("Worker {worker} stopping after {} rows", results.len());
            break;
        }
        results.push((position, matcher.resolve(&rows[position], &mut index)));
        completed.fetch_add(1, Ordering::Relaxed);
    }

    log::debug!(
        "Worker {worker} finished {} rows ({} cached pools)",
        results.len(),
        index.cached_pools()
    );
    results
}

async fn report_progress(
    completed: Arc<AtomicU64>,
    total: u64,
    every: Duration,
    progress: Arc<dyn ProgressCallback>,
    start: Instant,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                let done = completed.load(Ordering::Relaxed);
                progress.set_position(done);
                progress.set_message(status_line(done, total, start.elapsed().as_secs()));
            }
        }
    }
}

fn summarize(results: &[MatchResult], elapsed: Duration) -> BatchSummary {
    let mut per_tier: BTreeMap<String, u64> = BTreeMap::new();
    let mut matched = 0;

    for result in results.iter().filter(|r| r.is_match()) {
        matched += 1;
        if let Some(tier) = &result.tier {
            *per_tier.entry(tier.clone()).or_default() += 1;
        }
    }

    let total = results.len() as u64;
    BatchSummary {
        total,
        matched,
        unmatched: total - matched,
        per_tier,
        elapsed_secs: elapsed.as_secs_f64(),
    }
}
