//! Process and system resource sampling with threshold actions.
//!
//! The limiter samples process RSS, alive-task count, system memory and
//! CPU on a cadence. Breaching the memory ceilings triggers forced
//! reclamation (the buffer pool free list is dropped) and, when still
//! breached and configured to, an orderly-shutdown callback. The checker
//! consults [`ResourceLimiter::check_memory_limit`] before each URL.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ResourceLimiterConfig;
use crate::pool::BufferPool;

/// Consecutive CPU-threshold breaches before the advisory log fires.
const SUSTAINED_CPU_SAMPLES: u32 = 3;

/// Callback invoked when limits stay breached after reclamation.
pub type ShutdownCallback = Arc<dyn Fn() + Send + Sync>;

/// One point-in-time resource reading.
#[derive(Clone, Copy, Debug)]
pub struct ResourceSample {
    pub process_rss_mb: u64,
    pub alive_tasks: usize,
    /// Used fraction of system memory, 0..=1.
    pub system_memory_fraction: f64,
    /// Global CPU usage fraction, 0..=1.
    pub cpu_fraction: f64,
    pub sampled_at: DateTime<Utc>,
}

/// Periodic sampler enforcing the configured resource ceilings.
pub struct ResourceLimiter {
    config: ResourceLimiterConfig,
    pool: Arc<BufferPool>,
    system: tokio::sync::Mutex<sysinfo::System>,
    shutdown_cb: std::sync::Mutex<Option<ShutdownCallback>>,
    shutdown_fired: AtomicBool,
    token: std::sync::Mutex<CancellationToken>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for ResourceLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLimiter")
            .field("config", &self.config)
            .field("shutdown_fired", &self.shutdown_fired.load(Ordering::Relaxed))
            .finish()
    }
}

impl ResourceLimiter {
    pub fn new(config: ResourceLimiterConfig, pool: Arc<BufferPool>) -> Self {
        Self {
            config,
            pool,
            system: tokio::sync::Mutex::new(sysinfo::System::new()),
            shutdown_cb: std::sync::Mutex::new(None),
            shutdown_fired: AtomicBool::new(false),
            token: std::sync::Mutex::new(CancellationToken::new()),
            task: std::sync::Mutex::new(None),
        }
    }

    /// Register the orderly-shutdown hook invoked on sustained breach.
    pub fn set_shutdown_callback(&self, callback: ShutdownCallback) {
        *self.lock_cb() = Some(callback);
    }

    /// Spawn the sampling loop as a child of `parent`.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        let token = parent.child_token();
        *self.lock_token() = token.clone();

        let limiter = Arc::clone(self);
        let interval = Duration::from_secs(self.config.check_interval_secs.max(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            let mut cpu_breaches: u32 = 0;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let sample = limiter.sample().await;
                        limiter.evaluate(&sample, &mut cpu_breaches);
                    }
                }
            }
        });
        *self.lock_task() = Some(handle);
    }

    /// Cancel and await the sampling loop.
    pub async fn stop(&self) {
        self.lock_token().cancel();
        let handle = self.lock_task().take();
        if let Some(handle) = handle {
            if let Err(join_error) = handle.await {
                warn!(%join_error, "resource limiter task failed");
            }
        }
    }

    /// Cheap pre-check consulted before each URL check. On breach the
    /// limiter reclaims and re-checks; a URL is only admitted when the
    /// process is back under its ceiling.
    pub fn check_memory_limit(&self) -> bool {
        if self.config.max_memory_mb == 0 {
            return true;
        }
        let rss = process_rss_mb();
        if rss <= self.config.max_memory_mb {
            return true;
        }
        self.reclaim("per-check memory gate");
        let rss = process_rss_mb();
        let admitted = rss <= self.config.max_memory_mb;
        if !admitted {
            warn!(
                rss_mb = rss,
                limit_mb = self.config.max_memory_mb,
                "process memory still over limit after reclamation"
            );
        }
        admitted
    }

    /// Take one reading of process and system resources.
    pub async fn sample(&self) -> ResourceSample {
        let mut system = self.system.lock().await;
        system.refresh_memory();
        system.refresh_cpu_usage();
        let total = system.total_memory();
        let used = system.used_memory();
        let cpu_fraction = f64::from(system.global_cpu_usage()) / 100.0;
        drop(system);

        ResourceSample {
            process_rss_mb: process_rss_mb(),
            alive_tasks: alive_tasks(),
            system_memory_fraction: if total == 0 {
                0.0
            } else {
                used as f64 / total as f64
            },
            cpu_fraction,
            sampled_at: Utc::now(),
        }
    }

    fn evaluate(&self, sample: &ResourceSample, cpu_breaches: &mut u32) {
        debug!(
            rss_mb = sample.process_rss_mb,
            tasks = sample.alive_tasks,
            system_memory = sample.system_memory_fraction,
            cpu = sample.cpu_fraction,
            "resource sample"
        );

        if sample.alive_tasks > self.config.task_warning {
            warn!(
                tasks = sample.alive_tasks,
                threshold = self.config.task_warning,
                "alive task count above warning threshold"
            );
        }

        if sample.cpu_fraction > self.config.cpu_threshold {
            *cpu_breaches += 1;
            if *cpu_breaches >= SUSTAINED_CPU_SAMPLES {
                info!(
                    cpu = sample.cpu_fraction,
                    threshold = self.config.cpu_threshold,
                    samples = *cpu_breaches,
                    "sustained CPU usage above threshold"
                );
            }
        } else {
            *cpu_breaches = 0;
        }

        let process_breach = self.config.max_memory_mb > 0
            && sample.process_rss_mb > self.config.max_memory_mb;
        let system_breach = sample.system_memory_fraction > self.config.system_mem_threshold;
        if !(process_breach || system_breach) {
            return;
        }

        warn!(
            rss_mb = sample.process_rss_mb,
            limit_mb = self.config.max_memory_mb,
            system_memory = sample.system_memory_fraction,
            "memory ceiling breached; forcing reclamation"
        );
        self.reclaim("sampling loop");

        let rss_after = process_rss_mb();
        let still_breached = self.config.max_memory_mb > 0
            && rss_after > self.config.max_memory_mb;
        if still_breached && self.config.enable_auto_shutdown {
            self.fire_shutdown(rss_after);
        }
    }

    fn reclaim(&self, reason: &str) {
        let dropped = self.pool.clear();
        debug!(reason, dropped_buffers = dropped, "reclaimed pooled memory");
    }

    fn fire_shutdown(&self, rss_mb: u64) {
        if self.shutdown_fired.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!(
            rss_mb,
            limit_mb = self.config.max_memory_mb,
            "memory limit still breached after reclamation; requesting shutdown"
        );
        let callback = self.lock_cb().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn lock_cb(&self) -> std::sync::MutexGuard<'_, Option<ShutdownCallback>> {
        self.shutdown_cb
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_token(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn process_rss_mb() -> u64 {
    memory_stats::memory_stats()
        .map(|stats| (stats.physical_mem / (1024 * 1024)) as u64)
        .unwrap_or(0)
}

fn alive_tasks() -> usize {
    tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(config: ResourceLimiterConfig) -> Arc<ResourceLimiter> {
        Arc::new(ResourceLimiter::new(config, Arc::new(BufferPool::default())))
    }

    #[test]
    fn zero_limit_disables_the_memory_gate() {
        let limiter = limiter(ResourceLimiterConfig {
            max_memory_mb: 0,
            ..Default::default()
        });
        assert!(limiter.check_memory_limit());
    }

    #[test]
    fn generous_limit_admits_checks() {
        let limiter = limiter(ResourceLimiterConfig {
            max_memory_mb: 1024 * 1024,
            ..Default::default()
        });
        assert!(limiter.check_memory_limit());
    }

    #[test]
    fn impossible_limit_skips_checks() {
        // 1 MiB RSS limit is below any running test process.
        let limiter = limiter(ResourceLimiterConfig {
            max_memory_mb: 1,
            ..Default::default()
        });
        assert!(!limiter.check_memory_limit());
    }

    #[tokio::test]
    async fn sample_reports_plausible_values() {
        let limiter = limiter(ResourceLimiterConfig::default());
        let sample = limiter.sample().await;
        assert!(sample.process_rss_mb > 0);
        assert!((0.0..=1.0).contains(&sample.system_memory_fraction));
    }

    #[tokio::test]
    async fn shutdown_callback_fires_once_on_sustained_breach() {
        let fired = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let limiter = limiter(ResourceLimiterConfig {
            max_memory_mb: 1,
            enable_auto_shutdown: true,
            ..Default::default()
        });
        limiter.set_shutdown_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let sample = limiter.sample().await;
        let mut cpu_breaches = 0;
        limiter.evaluate(&sample, &mut cpu_breaches);
        limiter.evaluate(&sample, &mut cpu_breaches);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_and_stop_are_clean() {
        let limiter = limiter(ResourceLimiterConfig {
            check_interval_secs: 1,
            ..Default::default()
        });
        let parent = CancellationToken::new();
        limiter.start(&parent);
        limiter.stop().await;
    }
}
