//! Batched traversal of URL lists with bounded parallelism.
//!
//! The cycle's URL snapshot is split into fixed-size batches. Batches run
//! in parallel up to a cap; within one batch the work function owns the
//! sequential per-URL loop. Cancellation stops dispatch of new batches and
//! is propagated to the ones already running.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How often the progress callback fires, in items.
const PROGRESS_STRIDE: usize = 10;

/// Static description of one batch handed to the work function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRef {
    /// 1-based index within the cycle.
    pub batch_index: usize,
    pub total_batches: usize,
    pub batch_size: usize,
}

/// What one batch's work function reports back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchWorkReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Set when the work function observed cancellation mid-batch.
    pub interrupted: bool,
}

/// Per-batch outcome collected by the processor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchResult {
    pub batch_index: usize,
    pub size: usize,
    pub report: BatchWorkReport,
}

/// Outcome of a whole batched run.
#[derive(Clone, Debug, Default)]
pub struct BatchRunOutcome {
    pub batches: Vec<BatchResult>,
    /// 1-based index of the first interrupted or undispatched batch.
    pub interrupted_at: Option<usize>,
}

impl BatchRunOutcome {
    pub fn processed(&self) -> usize {
        self.batches.iter().map(|batch| batch.report.processed).sum()
    }

    pub fn failed(&self) -> usize {
        self.batches.iter().map(|batch| batch.report.failed).sum()
    }

    pub fn skipped(&self) -> usize {
        self.batches.iter().map(|batch| batch.report.skipped).sum()
    }
}

/// Cumulative progress snapshot passed to the progress callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub failed: usize,
}

/// Callback fired approximately every [`PROGRESS_STRIDE`] items and at
/// batch boundaries.
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// Shared progress counters handed into batch work functions.
#[derive(Clone)]
pub struct ProgressReporter {
    processed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    callback: Option<ProgressCallback>,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("processed", &self.processed.load(Ordering::Relaxed))
            .field("failed", &self.failed.load(Ordering::Relaxed))
            .finish()
    }
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            processed: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            callback,
        }
    }

    /// Record one finished item and maybe fire the callback.
    pub fn record(&self, ok: bool) {
        let counter = if ok { &self.processed } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
        let total =
            self.processed.load(Ordering::Relaxed) + self.failed.load(Ordering::Relaxed);
        if total % PROGRESS_STRIDE == 0 {
            self.fire();
        }
    }

    /// Fire the callback unconditionally, for batch boundaries.
    pub fn flush(&self) {
        self.fire();
    }

    fn fire(&self) {
        if let Some(callback) = &self.callback {
            callback(Progress {
                processed: self.processed.load(Ordering::Relaxed),
                failed: self.failed.load(Ordering::Relaxed),
            });
        }
    }
}

/// Splits URL lists into batches and runs them under a concurrency cap.
#[derive(Clone, Copy, Debug)]
pub struct BatchProcessor {
    batch_size: usize,
    max_concurrent: usize,
}

impl BatchProcessor {
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Batching only pays for itself past one batch's worth of URLs.
    pub fn should_use_batching(&self, count: usize) -> bool {
        count > self.batch_size
    }

    /// Number of batches a list of `count` URLs splits into.
    pub fn total_batches(&self, count: usize) -> usize {
        count.div_ceil(self.batch_size)
    }

    /// Run `work` once per batch, up to `max_concurrent` batches at a
    /// time. URLs keep their input order within each batch; no ordering
    /// holds across batches.
    pub async fn process_batches<F, Fut>(
        &self,
        urls: Vec<String>,
        token: CancellationToken,
        work: F,
        progress: Option<ProgressCallback>,
    ) -> BatchRunOutcome
    where
        F: Fn(CancellationToken, Vec<String>, BatchRef, ProgressReporter) -> Fut
            + Send
            + Sync
            + Clone
            + 'static,
        Fut: Future<Output = BatchWorkReport> + Send + 'static,
    {
        let mut outcome = BatchRunOutcome::default();
        if urls.is_empty() {
            return outcome;
        }

        let total_batches = self.total_batches(urls.len());
        let reporter = ProgressReporter::new(progress);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks: JoinSet<BatchResult> = JoinSet::new();

        let mut batches = urls
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .enumerate();

        for (index, batch) in &mut batches {
            let batch_index = index + 1;
            if token.is_cancelled() {
                outcome.interrupted_at = Some(batch_index);
                debug!(batch_index, total_batches, "stopping batch dispatch");
                break;
            }

            let permit = tokio::select! {
                _ = token.cancelled() => {
                    outcome.interrupted_at = Some(batch_index);
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    permit.expect("semaphore never closed")
                }
            };

            let batch_ref = BatchRef {
                batch_index,
                total_batches,
                batch_size: self.batch_size,
            };
            let work = work.clone();
            let token = token.clone();
            let reporter = reporter.clone();
            let size = batch.len();
            tasks.spawn(async move {
                let report = work(token, batch, batch_ref, reporter.clone()).await;
                reporter.flush();
                drop(permit);
                BatchResult {
                    batch_index,
                    size,
                    report,
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    if result.report.interrupted {
                        outcome.interrupted_at = Some(
                            outcome
                                .interrupted_at
                                .map_or(result.batch_index, |at| at.min(result.batch_index)),
                        );
                    }
                    outcome.batches.push(result);
                }
                Err(join_error) => {
                    warn!(%join_error, "batch worker panicked");
                }
            }
        }
        outcome.batches.sort_by_key(|batch| batch.batch_index);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn urls(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("https://host{i}.example/x"))
            .collect()
    }

    #[test]
    fn batching_threshold_is_strict() {
        let processor = BatchProcessor::new(25, 4);
        assert!(!processor.should_use_batching(25));
        assert!(processor.should_use_batching(26));
        assert_eq!(processor.total_batches(100), 4);
        assert_eq!(processor.total_batches(101), 5);
    }

    #[tokio::test]
    async fn all_batches_run_and_report() {
        let processor = BatchProcessor::new(10, 2);
        let outcome = processor
            .process_batches(
                urls(25),
                CancellationToken::new(),
                |_token, batch, batch_ref, reporter| async move {
                    assert!(batch_ref.batch_index >= 1 && batch_ref.batch_index <= 3);
                    assert_eq!(batch_ref.total_batches, 3);
                    for _ in &batch {
                        reporter.record(true);
                    }
                    BatchWorkReport {
                        processed: batch.len(),
                        ..Default::default()
                    }
                },
                None,
            )
            .await;
        assert_eq!(outcome.batches.len(), 3);
        assert_eq!(outcome.processed(), 25);
        assert_eq!(outcome.interrupted_at, None);
        // tail batch is smaller
        assert_eq!(outcome.batches[2].size, 5);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch() {
        let processor = BatchProcessor::new(10, 1);
        let token = CancellationToken::new();
        let cancel_after_first = token.clone();
        let outcome = processor
            .process_batches(
                urls(40),
                token,
                move |_token, batch, _batch_ref, _reporter| {
                    let cancel = cancel_after_first.clone();
                    async move {
                        cancel.cancel();
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        BatchWorkReport {
                            processed: batch.len(),
                            ..Default::default()
                        }
                    }
                },
                None,
            )
            .await;
        assert!(outcome.interrupted_at.is_some());
        assert!(outcome.batches.len() < 4);
    }

    #[tokio::test]
    async fn progress_callback_sees_cumulative_counts() {
        let seen: Arc<std::sync::Mutex<Vec<Progress>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |progress| {
            sink.lock().unwrap().push(progress);
        });

        let processor = BatchProcessor::new(10, 1);
        processor
            .process_batches(
                urls(20),
                CancellationToken::new(),
                |_token, batch, _batch_ref, reporter| async move {
                    for (position, _) in batch.iter().enumerate() {
                        reporter.record(position % 7 != 0);
                    }
                    BatchWorkReport::default()
                },
                Some(callback),
            )
            .await;

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        let last = seen.last().unwrap();
        assert_eq!(last.processed + last.failed, 20);
    }
}
