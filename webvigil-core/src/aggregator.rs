//! Buffered delivery of change and error events.
//!
//! Events accumulate in two buffers and flush on a timer, when a buffer
//! reaches the configured threshold, or at shutdown. Flushing detaches the
//! buffer under its lock and delivers outside it, so producers are never
//! blocked on the notification transport.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;
use webvigil_contracts::Notifier;
use webvigil_model::{FetchErrorInfo, FileChangeInfo};

struct AggregatorInner {
    notifier: Arc<dyn Notifier>,
    changes: Mutex<Vec<FileChangeInfo>>,
    errors: Mutex<Vec<FetchErrorInfo>>,
    /// Serializes flushes; shutdown waits on it to drain in-flight work.
    flush_gate: Mutex<()>,
    shutdown: AtomicBool,
    max_events: usize,
    /// Liveness of the owning service; a cancelled context skips the
    /// final flush at shutdown.
    service_context: CancellationToken,
}

impl AggregatorInner {
    async fn flush_changes(&self) {
        let _gate = self.flush_gate.lock().await;
        let batch: Vec<FileChangeInfo> = {
            let mut changes = self.changes.lock().await;
            changes.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }
        let flush_id = Uuid::now_v7();
        debug!(%flush_id, events = batch.len(), "flushing aggregated file changes");
        if let Err(error) = self
            .notifier
            .send_aggregated_file_changes(&batch, None)
            .await
        {
            warn!(%flush_id, %error, "failed to deliver aggregated file changes");
        }
    }

    async fn flush_errors(&self) {
        let _gate = self.flush_gate.lock().await;
        let batch: Vec<FetchErrorInfo> = {
            let mut errors = self.errors.lock().await;
            errors.drain(..).collect()
        };
        if batch.is_empty() {
            return;
        }
        let flush_id = Uuid::now_v7();
        debug!(%flush_id, events = batch.len(), "flushing aggregated fetch errors");
        if let Err(error) = self.notifier.send_aggregated_fetch_errors(&batch).await {
            warn!(%flush_id, %error, "failed to deliver aggregated fetch errors");
        }
    }

    async fn flush_all(&self) {
        self.flush_changes().await;
        self.flush_errors().await;
    }
}

/// Buffers [`FileChangeInfo`] and [`FetchErrorInfo`] events and delivers
/// them in batches.
pub struct EventAggregator {
    inner: Arc<AggregatorInner>,
    interval: Duration,
    timer_token: CancellationToken,
    timer: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for EventAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventAggregator")
            .field("interval", &self.interval)
            .field("max_events", &self.inner.max_events)
            .field("shutdown", &self.inner.shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl EventAggregator {
    /// `interval` of zero makes the aggregator a pass-through: every add
    /// flushes immediately.
    pub fn new(
        notifier: Arc<dyn Notifier>,
        interval: Duration,
        max_events: usize,
        service_context: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                notifier,
                changes: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
                flush_gate: Mutex::new(()),
                shutdown: AtomicBool::new(false),
                max_events: max_events.max(1),
                service_context,
            }),
            interval,
            timer_token: CancellationToken::new(),
            timer: std::sync::Mutex::new(None),
        }
    }

    /// Spawn the periodic flush task. No-op in pass-through mode.
    pub fn start(&self) {
        if self.interval.is_zero() {
            return;
        }
        let inner = Arc::clone(&self.inner);
        let token = self.timer_token.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The immediate first tick would flush empty buffers.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => inner.flush_all().await,
                }
            }
        });
        *self.lock_timer() = Some(handle);
    }

    /// Buffer one change event. No-op after shutdown.
    pub async fn add_change(&self, change: FileChangeInfo) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        let ready = {
            let mut changes = self.inner.changes.lock().await;
            changes.push(change);
            changes.len() >= self.inner.max_events
        };
        if self.interval.is_zero() {
            self.inner.flush_changes().await;
        } else if ready {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.flush_changes().await });
        }
    }

    /// Buffer one error event. No-op after shutdown.
    pub async fn add_error(&self, error: FetchErrorInfo) {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return;
        }
        let ready = {
            let mut errors = self.inner.errors.lock().await;
            errors.push(error);
            errors.len() >= self.inner.max_events
        };
        if self.interval.is_zero() {
            self.inner.flush_errors().await;
        } else if ready {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.flush_errors().await });
        }
    }

    /// Buffered event counts `(changes, errors)`, for introspection.
    pub async fn pending(&self) -> (usize, usize) {
        let changes = self.inner.changes.lock().await.len();
        let errors = self.inner.errors.lock().await.len();
        (changes, errors)
    }

    /// Stop the timer, wait for in-flight flushes, and emit a final flush
    /// unless the owning service context is already cancelled.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.timer_token.cancel();
        let handle = self.lock_timer().take();
        if let Some(handle) = handle {
            if let Err(join_error) = handle.await {
                warn!(%join_error, "aggregator timer task failed");
            }
        }
        if self.inner.service_context.is_cancelled() {
            debug!("service context cancelled; skipping final aggregator flush");
            return;
        }
        self.inner.flush_all().await;
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
