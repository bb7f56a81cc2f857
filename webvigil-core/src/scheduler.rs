//! Interval-driven cycle scheduling.
//!
//! The scheduler consumes a [`CycleRunner`] rather than the concrete
//! service so tests can supply fakes. The first cycle runs immediately on
//! start; afterwards cycles fire on a fixed interval. A cycle that outruns
//! the interval causes the missed ticks to be skipped, never stacked.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webvigil_model::CycleSummary;

use crate::error::{MonitorError, Result};

/// Bounded wait for the active cycle to drain on stop.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Anything that can run one monitoring cycle under a cancellation token.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn execute_cycle(&self, token: CancellationToken) -> Result<CycleSummary>;
}

/// Fires cycles on a fixed cadence against an injected [`CycleRunner`].
pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    interval: Duration,
    grace: Duration,
    token: std::sync::Mutex<CancellationToken>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("grace", &self.grace)
            .finish()
    }
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, interval: Duration, grace: Duration) -> Self {
        Self {
            runner,
            interval,
            grace,
            token: std::sync::Mutex::new(CancellationToken::new()),
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the scheduling loop as a child of `parent`. The initial cycle
    /// starts immediately.
    pub fn start(&self, parent: &CancellationToken) {
        let token = parent.child_token();
        *self.lock_token() = token.clone();

        let runner = Arc::clone(&self.runner);
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately and drives the initial
            // cycle.
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let started = tokio::time::Instant::now();
                run_one(runner.as_ref(), &token).await;
                if started.elapsed() > interval {
                    info!(
                        elapsed_secs = started.elapsed().as_secs(),
                        interval_secs = interval.as_secs(),
                        "cycle outlasted the check interval; skipping missed ticks"
                    );
                }
            }
        });
        *self.lock_handle() = Some(handle);
    }

    /// Cancel the loop and wait up to the grace period for the active
    /// cycle to drain, then force-return.
    pub async fn stop(&self) {
        self.lock_token().cancel();
        let handle = self.lock_handle().take();
        let Some(handle) = handle else { return };
        match tokio::time::timeout(self.grace, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(join_error)) => warn!(%join_error, "scheduler loop failed"),
            Err(_) => warn!(
                grace_secs = self.grace.as_secs(),
                "active cycle did not drain within the stop grace period"
            ),
        }
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handle(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_one(runner: &dyn CycleRunner, token: &CancellationToken) {
    match runner.execute_cycle(token.child_token()).await {
        Ok(summary) => {
            info!(
                cycle_id = %summary.cycle_id,
                processed = summary.processed,
                failed = summary.failed,
                changed = summary.changed_urls.len(),
                interrupted = summary.interrupted,
                "cycle finished"
            );
        }
        Err(MonitorError::Cancelled(reason)) => {
            info!(%reason, "cycle cancelled");
        }
        Err(error) => {
            warn!(%error, "cycle execution failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use webvigil_model::BatchStats;

    struct CountingRunner {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn execute_cycle(&self, _token: CancellationToken) -> Result<CycleSummary> {
            let index = self.cycles.fetch_add(1, Ordering::SeqCst);
            Ok(CycleSummary {
                cycle_id: format!("monitor-test-{index}"),
                total_monitored: 0,
                processed: 0,
                failed: 0,
                skipped: 0,
                changed_urls: Vec::new(),
                report_paths: Vec::new(),
                batch_stats: BatchStats::default(),
                interrupted: false,
                started_at: Utc::now(),
                duration_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn initial_cycle_runs_immediately() {
        let runner = Arc::new(CountingRunner {
            cycles: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(
            Arc::clone(&runner) as Arc<dyn CycleRunner>,
            Duration::from_secs(3600),
            Duration::from_secs(1),
        );
        let parent = CancellationToken::new();
        scheduler.start(&parent);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runner.cycles.load(Ordering::SeqCst), 1);
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn cancelling_the_parent_stops_the_loop() {
        let runner = Arc::new(CountingRunner {
            cycles: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new(
            Arc::clone(&runner) as Arc<dyn CycleRunner>,
            Duration::from_millis(10),
            Duration::from_secs(1),
        );
        let parent = CancellationToken::new();
        scheduler.start(&parent);
        tokio::time::sleep(Duration::from_millis(35)).await;
        parent.cancel();
        scheduler.stop().await;

        let after_stop = runner.cycles.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runner.cycles.load(Ordering::SeqCst), after_stop);
        assert!(after_stop >= 2);
    }
}
