//! Composition root of the monitoring engine.
//!
//! The service owns the URL set, lock table, cycle tracker, checker,
//! batch processor, aggregator and resource limiter for its lifetime, and
//! implements [`CycleRunner`] for the scheduler.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webvigil_contracts::{Differ, HistoryStore, HtmlDiffReporter, JsAnalyzer, Notifier};
use webvigil_model::{BatchInfo, BatchStats, CycleSummary, FetchErrorInfo, FileChangeInfo, InterruptInfo};

use crate::aggregator::EventAggregator;
use crate::batch::{BatchProcessor, BatchRef, BatchWorkReport, ProgressCallback, ProgressReporter};
use crate::checker::UrlChecker;
use crate::config::EngineConfig;
use crate::cycle::CycleTracker;
use crate::error::{MonitorError, Result};
use crate::extract::PathExtractor;
use crate::fetch::Fetcher;
use crate::limiter::ResourceLimiter;
use crate::lock_table::UrlLockTable;
use crate::pool::BufferPool;
use crate::scheduler::CycleRunner;
use crate::url_set::{LoadOutcome, UrlSet};

/// Bounded wait for an in-flight cycle to drain during stop.
const STOP_GRACE: Duration = Duration::from_secs(10);

const INTERRUPT_REASON: &str = "context_canceled";

/// Injected collaborators the service is composed with.
pub struct Collaborators {
    pub history: Arc<dyn HistoryStore>,
    pub notifier: Arc<dyn Notifier>,
    pub reporter: Option<Arc<dyn HtmlDiffReporter>>,
    pub differ: Option<Arc<dyn Differ>>,
    pub analyzer: Option<Arc<dyn JsAnalyzer>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("reporter", &self.reporter.is_some())
            .field("differ", &self.differ.is_some())
            .field("analyzer", &self.analyzer.is_some())
            .finish()
    }
}

/// Top-level monitoring service.
pub struct MonitoringService {
    config: EngineConfig,
    url_set: Arc<UrlSet>,
    lock_table: Arc<UrlLockTable>,
    tracker: Arc<CycleTracker>,
    checker: Arc<UrlChecker>,
    batch: BatchProcessor,
    aggregator: Arc<EventAggregator>,
    limiter: Arc<ResourceLimiter>,
    notifier: Arc<dyn Notifier>,
    reporter: Option<Arc<dyn HtmlDiffReporter>>,
    /// Governs cycles, the scheduler and the limiter. Replaceable via
    /// [`MonitoringService::set_parent_context`].
    service_token: std::sync::Mutex<CancellationToken>,
    stopped: AtomicBool,
    /// Held for the duration of a cycle; `try_lock` failure means one is
    /// already active.
    cycle_gate: Arc<tokio::sync::Mutex<()>>,
    #[allow(dead_code)]
    pool: Arc<BufferPool>,
}

impl fmt::Debug for MonitoringService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitoringService")
            .field("monitored", &self.url_set.count())
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish()
    }
}

impl MonitoringService {
    /// Compose the engine. Fails on invalid configuration or when
    /// monitoring is disabled; the service never starts half-built.
    ///
    /// `parent` is the injectable root context; cancellation of it reaches
    /// every cycle and background loop. Call [`Self::start`] afterwards to
    /// launch the aggregator and limiter.
    pub fn new(
        config: EngineConfig,
        collaborators: Collaborators,
        parent: Option<&CancellationToken>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if !config.monitor.enabled {
            return Err(MonitorError::Config("monitor.enabled must be true".into()));
        }

        let pool = Arc::new(BufferPool::default());
        let fetcher = Fetcher::new(&config.monitor, Arc::clone(&pool))?;
        let extractor = Arc::new(PathExtractor::new(
            config.path_extractor.clone(),
            &config.extractor,
            collaborators.analyzer,
        ));
        let checker = Arc::new(UrlChecker::new(
            &config.monitor,
            fetcher,
            collaborators.history,
            collaborators.differ,
            Some(extractor),
        ));
        let batch = BatchProcessor::new(
            config.batch.batch_size,
            config
                .batch
                .effective_concurrency(config.monitor.max_concurrent_checks),
        );
        let service_token = parent
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let aggregator = Arc::new(EventAggregator::new(
            Arc::clone(&collaborators.notifier),
            Duration::from_secs(config.monitor.aggregation_interval_seconds),
            config.monitor.max_aggregated_events,
            parent.cloned().unwrap_or_default(),
        ));
        let limiter = Arc::new(ResourceLimiter::new(
            config.resource_limiter.clone(),
            Arc::clone(&pool),
        ));

        Ok(Arc::new(Self {
            config,
            url_set: Arc::new(UrlSet::new()),
            lock_table: Arc::new(UrlLockTable::new()),
            tracker: Arc::new(CycleTracker::new()),
            checker,
            batch,
            aggregator,
            limiter,
            notifier: collaborators.notifier,
            reporter: collaborators.reporter,
            service_token: std::sync::Mutex::new(service_token),
            stopped: AtomicBool::new(false),
            cycle_gate: Arc::new(tokio::sync::Mutex::new(())),
            pool,
        }))
    }

    /// Launch the aggregator timer and resource-limiter loops.
    pub fn start(self: &Arc<Self>) {
        let token = self.service_token();
        self.aggregator.start();
        self.limiter.start(&token);
        info!(
            monitored = self.url_set.count(),
            interval_secs = self.config.monitor.check_interval_seconds,
            "monitoring service started"
        );
    }

    /// Replace the service context with a child of `parent`. The previous
    /// context is cancelled first. Intended to be called before
    /// [`Self::start`]; loops already running on the old context stop.
    pub fn set_parent_context(&self, parent: &CancellationToken) {
        let previous = {
            let mut guard = self.lock_token();
            std::mem::replace(&mut *guard, parent.child_token())
        };
        previous.cancel();
    }

    /// Current service context token.
    pub fn service_token(&self) -> CancellationToken {
        self.lock_token().clone()
    }

    /// Resource limiter handle, for wiring a shutdown callback.
    pub fn limiter(&self) -> Arc<ResourceLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Number of monitored URLs.
    pub fn monitored_count(&self) -> usize {
        self.url_set.count()
    }

    /// Add URLs to the monitored set ahead of the next cycle.
    pub fn preload<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.url_set.add_all(urls);
        let total = self.url_set.count();
        info!(
            added,
            total,
            batches = self.batch.total_batches(total),
            batch_size = self.batch.batch_size(),
            "preloaded monitored URLs"
        );
    }

    /// Bulk-load monitored URLs from a file (one per line).
    pub async fn load_urls_from_file(&self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        self.url_set.load_from_file(path).await
    }

    /// Run one cycle now, under the current service context.
    pub async fn run_once(&self) -> Result<CycleSummary> {
        let token = self.service_token().child_token();
        self.run_cycle(token).await
    }

    /// Idempotent shutdown: cancel the context, drain the active cycle
    /// within a bounded grace period, stop the aggregator and limiter, and
    /// GC the lock table.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("stopping monitoring service");

        let cycle_active = self.cycle_gate.try_lock().is_err();
        self.service_token().cancel();
        if cycle_active {
            // The running cycle observes cancellation and emits the
            // interrupt notification; give it time to drain.
            if tokio::time::timeout(STOP_GRACE, self.cycle_gate.lock())
                .await
                .is_err()
            {
                warn!(
                    grace_secs = STOP_GRACE.as_secs(),
                    "cycle did not drain within the stop grace period"
                );
            }
        }

        self.aggregator.shutdown().await;
        self.limiter.stop().await;

        let active: HashSet<String> = self.url_set.snapshot().into_iter().collect();
        let removed = self.lock_table.gc(&active).await;
        info!(locks_removed = removed, "monitoring service stopped");
    }

    async fn run_cycle(&self, cycle_token: CancellationToken) -> Result<CycleSummary> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(MonitorError::Cancelled("service stopped".into()));
        }
        let Ok(_active) = self.cycle_gate.try_lock() else {
            return Err(MonitorError::Internal("cycle already in progress".into()));
        };

        let cycle_id = self.tracker.start_cycle();
        let snapshot = self.url_set.snapshot();
        let total = snapshot.len();
        let started_at = Utc::now();
        let clock = Instant::now();
        let batch_stats = BatchStats {
            total_batches: self.batch.total_batches(total),
            batch_size: self.batch.batch_size(),
            max_concurrent: self.batch.max_concurrent(),
        };
        info!(cycle_id, total, "starting monitoring cycle");

        if total == 0 {
            let summary = CycleSummary {
                cycle_id: cycle_id.clone(),
                total_monitored: 0,
                processed: 0,
                failed: 0,
                skipped: 0,
                changed_urls: Vec::new(),
                report_paths: Vec::new(),
                batch_stats,
                interrupted: false,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
            };
            self.dispatch_cycle_complete(&summary).await;
            self.tracker.end_cycle();
            return Ok(summary);
        }

        let outcome = self
            .batch
            .process_batches(
                snapshot.clone(),
                cycle_token.clone(),
                self.batch_work_fn(&cycle_id),
                Some(progress_logger(cycle_id.clone())),
            )
            .await;

        let processed = outcome.processed();
        let failed = outcome.failed();
        let skipped = outcome.skipped();
        let interrupted = outcome.interrupted_at.is_some() || cycle_token.is_cancelled();
        let (_, changed_urls) = self.tracker.snapshot();

        if interrupted {
            let interrupt = InterruptInfo {
                cycle_id: cycle_id.clone(),
                total_targets: total,
                processed_targets: processed + failed,
                reason: INTERRUPT_REASON.into(),
                last_activity: Utc::now(),
            };
            if let Err(error) = self.notifier.send_monitor_interrupt(&interrupt).await {
                warn!(cycle_id, %error, "failed to deliver interrupt notification");
            }
            let summary = CycleSummary {
                cycle_id: cycle_id.clone(),
                total_monitored: total,
                processed,
                failed,
                skipped,
                changed_urls,
                report_paths: Vec::new(),
                batch_stats,
                interrupted: true,
                started_at,
                duration_ms: clock.elapsed().as_millis() as u64,
            };
            self.tracker.end_cycle();
            info!(
                cycle_id,
                processed = summary.processed,
                total,
                "cycle interrupted"
            );
            return Ok(summary);
        }

        // Reporting covers the whole monitored set; the reporter reflects
        // which URLs actually changed.
        let report_paths = match &self.reporter {
            Some(reporter) => match reporter.generate_diff_report(&snapshot, &cycle_id).await {
                Ok(paths) => paths,
                Err(error) => {
                    warn!(cycle_id, %error, "diff report generation failed");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let summary = CycleSummary {
            cycle_id: cycle_id.clone(),
            total_monitored: total,
            processed,
            failed,
            skipped,
            changed_urls,
            report_paths,
            batch_stats,
            interrupted: false,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        self.dispatch_cycle_complete(&summary).await;
        self.tracker.end_cycle();
        info!(
            cycle_id,
            processed = summary.processed,
            failed = summary.failed,
            changed = summary.changed_urls.len(),
            duration_ms = summary.duration_ms,
            "cycle complete"
        );
        Ok(summary)
    }

    async fn dispatch_cycle_complete(&self, summary: &CycleSummary) {
        if let Err(error) = self.notifier.send_cycle_complete(summary).await {
            warn!(cycle_id = %summary.cycle_id, %error, "failed to deliver cycle-complete notification");
        }
    }

    /// Per-batch work: sequential URL loop under the per-URL lock, feeding
    /// the tracker and aggregator.
    fn batch_work_fn(
        &self,
        cycle_id: &str,
    ) -> impl Fn(
        CancellationToken,
        Vec<String>,
        BatchRef,
        ProgressReporter,
    ) -> futures::future::BoxFuture<'static, BatchWorkReport>
    + Clone
    + use<> {
        let checker = Arc::clone(&self.checker);
        let lock_table = Arc::clone(&self.lock_table);
        let tracker = Arc::clone(&self.tracker);
        let aggregator = Arc::clone(&self.aggregator);
        let limiter = Arc::clone(&self.limiter);
        let diff_reporter = self.reporter.clone();
        let cycle_id = cycle_id.to_string();

        move |token: CancellationToken,
              batch: Vec<String>,
              batch_ref: BatchRef,
              reporter: ProgressReporter| {
            let checker = Arc::clone(&checker);
            let lock_table = Arc::clone(&lock_table);
            let tracker = Arc::clone(&tracker);
            let aggregator = Arc::clone(&aggregator);
            let limiter = Arc::clone(&limiter);
            let diff_reporter = diff_reporter.clone();
            let cycle_id = cycle_id.clone();

            Box::pin(async move {
                let mut report = BatchWorkReport::default();
                for (position, url) in batch.iter().enumerate() {
                    if token.is_cancelled() {
                        report.interrupted = true;
                        break;
                    }
                    if !limiter.check_memory_limit() {
                        warn!(url, cycle_id, "skipping URL under memory pressure");
                        report.skipped += 1;
                        continue;
                    }

                    let _guard = lock_table.acquire(url).await;
                    let batch_info = BatchInfo {
                        batch_index: batch_ref.batch_index,
                        total_batches: batch_ref.total_batches,
                        batch_size: batch_ref.batch_size,
                        position_in_batch: position,
                    };
                    let result = checker
                        .check(url, &token, &cycle_id, Some(batch_info))
                        .await;

                    if result.changed {
                        tracker.mark_changed(url);
                        let diff_report_path = match (&diff_reporter, &result.diff) {
                            (Some(diff_reporter), Some(diff)) => {
                                match diff_reporter
                                    .generate_single_diff_report(
                                        &result.url,
                                        diff,
                                        &result.old_hash,
                                        &result.new_hash,
                                        result.content.as_deref().unwrap_or_default(),
                                    )
                                    .await
                                {
                                    Ok(path) => Some(path),
                                    Err(error) => {
                                        warn!(url, cycle_id, %error, "single diff report failed");
                                        None
                                    }
                                }
                            }
                            _ => None,
                        };
                        aggregator
                            .add_change(FileChangeInfo {
                                url: result.url.clone(),
                                old_hash: result.old_hash.clone(),
                                new_hash: result.new_hash.clone(),
                                content_type: result.content_type.clone(),
                                change_time: result.processed_at,
                                diff_report_path,
                                extracted_paths: result.extracted_paths.clone(),
                                cycle_id: cycle_id.clone(),
                            })
                            .await;
                    }

                    match &result.error {
                        Some(error) => {
                            aggregator
                                .add_error(FetchErrorInfo {
                                    url: result.url.clone(),
                                    error_message: error.message.clone(),
                                    source: error.source,
                                    occurred_at: result.processed_at,
                                    cycle_id: cycle_id.clone(),
                                })
                                .await;
                            report.failed += 1;
                            reporter.record(false);
                        }
                        None => {
                            report.processed += 1;
                            reporter.record(true);
                        }
                    }
                }
                report
            })
        }
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.service_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CycleRunner for MonitoringService {
    async fn execute_cycle(&self, token: CancellationToken) -> Result<CycleSummary> {
        self.run_cycle(token).await
    }
}

fn progress_logger(cycle_id: String) -> ProgressCallback {
    Arc::new(move |progress| {
        debug!(
            cycle_id,
            processed = progress.processed,
            failed = progress.failed,
            "cycle progress"
        );
    })
}
