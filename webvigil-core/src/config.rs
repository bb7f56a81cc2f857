//! Engine configuration.
//!
//! All knobs carry defaults so embedders can adopt the engine with a
//! minimal configuration payload. Loading from a configuration file is the
//! embedder's concern; these structs only define the shape and the
//! validation rules.

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

const DEFAULT_MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024;

/// Top-level engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Cycle cadence, fetch limits and aggregation tuning.
    pub monitor: MonitorConfig,
    /// Batch sizing for cycle traversal.
    pub batch: BatchConfig,
    /// Accept/reject filters and scan patterns for extracted URLs.
    pub extractor: ExtractorConfig,
    /// Strategy toggles for the path extractor.
    pub path_extractor: PathExtractorConfig,
    /// Memory/CPU/task sampling thresholds.
    pub resource_limiter: ResourceLimiterConfig,
}

impl EngineConfig {
    /// Reject configurations the engine cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.monitor.validate()?;
        self.batch.validate()?;
        self.resource_limiter.validate()
    }
}

/// Cycle cadence and per-URL fetch behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Must be true for the service to start.
    pub enabled: bool,
    /// Seconds between cycle starts.
    pub check_interval_seconds: u64,
    /// Upper bound on URLs checked in parallel.
    pub max_concurrent_checks: usize,
    /// Per-request ceiling, seconds.
    pub http_timeout_seconds: u64,
    /// Response body cap, bytes.
    pub max_content_size: usize,
    /// Skip TLS certificate verification on monitored hosts.
    #[serde(alias = "monitor_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
    /// Store full response bytes on changed records.
    pub store_full_content_on_change: bool,
    /// Seconds between aggregator flushes. 0 makes every add flush.
    pub aggregation_interval_seconds: u64,
    /// Buffered events that force an eager flush.
    pub max_aggregated_events: usize,
    /// Disable conditional request headers entirely.
    pub bypass_cache: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 300,
            max_concurrent_checks: 10,
            http_timeout_seconds: 30,
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            insecure_skip_verify: false,
            store_full_content_on_change: false,
            aggregation_interval_seconds: 30,
            max_aggregated_events: 100,
            bypass_cache: false,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_interval_seconds == 0 {
            return Err(MonitorError::Config(
                "monitor.check_interval_seconds must be > 0".into(),
            ));
        }
        if self.max_concurrent_checks == 0 {
            return Err(MonitorError::Config(
                "monitor.max_concurrent_checks must be > 0".into(),
            ));
        }
        if self.http_timeout_seconds == 0 {
            return Err(MonitorError::Config(
                "monitor.http_timeout_seconds must be > 0".into(),
            ));
        }
        if self.max_aggregated_events == 0 {
            return Err(MonitorError::Config(
                "monitor.max_aggregated_events must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Batch sizing for cycle traversal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// URLs per batch.
    pub batch_size: usize,
    /// Batches run in parallel. Derived from `max_concurrent_checks` when
    /// unset.
    pub max_concurrent_batch: Option<usize>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_concurrent_batch: None,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MonitorError::Config(
                "monitor_batch.batch_size must be > 0".into(),
            ));
        }
        if self.max_concurrent_batch == Some(0) {
            return Err(MonitorError::Config(
                "monitor_batch.max_concurrent_batch must be > 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// Effective parallel-batch cap for a given worker cap.
    pub fn effective_concurrency(&self, max_concurrent_checks: usize) -> usize {
        self.max_concurrent_batch
            .unwrap_or(max_concurrent_checks)
            .max(1)
    }
}

/// Accept/reject filters and scan patterns for extracted URLs.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Accept only absolute URLs matching one of these patterns. Empty
    /// means accept everything not denied.
    pub allowlist: Vec<String>,
    /// Reject absolute URLs matching any of these patterns.
    pub denylist: Vec<String>,
    /// Full-content scan patterns, applied in order.
    pub custom_regexes: Vec<String>,
}

/// Strategy toggles for the path extractor.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PathExtractorConfig {
    pub enable_js_analysis: bool,
    pub enable_manual_regex: bool,
    /// Content larger than this is not scanned at all.
    pub max_content_size: usize,
    /// Characters captured on each side of a regex match.
    pub context_snippet_size: usize,
}

impl Default for PathExtractorConfig {
    fn default() -> Self {
        Self {
            enable_js_analysis: true,
            enable_manual_regex: true,
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            context_snippet_size: 50,
        }
    }
}

/// Memory/CPU/task sampling thresholds for the resource limiter.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimiterConfig {
    /// Process RSS ceiling, MiB. 0 disables the process-memory check.
    pub max_memory_mb: u64,
    /// Alive-task ceiling before the limiter escalates.
    #[serde(alias = "max_goroutines")]
    pub max_tasks: usize,
    /// Seconds between samples.
    pub check_interval_secs: u64,
    /// Fraction of `max_memory_mb` at which reclamation starts.
    pub memory_threshold: f64,
    /// System memory fraction that triggers reclamation.
    pub system_mem_threshold: f64,
    /// CPU fraction that triggers an advisory log.
    pub cpu_threshold: f64,
    /// Alive-task count that triggers a warning log.
    #[serde(alias = "goroutine_warning")]
    pub task_warning: usize,
    /// Invoke the registered shutdown callback when limits stay breached
    /// after reclamation.
    pub enable_auto_shutdown: bool,
}

impl Default for ResourceLimiterConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024,
            max_tasks: 10_000,
            check_interval_secs: 30,
            memory_threshold: 0.8,
            system_mem_threshold: 0.85,
            cpu_threshold: 0.9,
            task_warning: 5_000,
            enable_auto_shutdown: false,
        }
    }
}

impl ResourceLimiterConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("memory_threshold", self.memory_threshold),
            ("system_mem_threshold", self.system_mem_threshold),
            ("cpu_threshold", self.cpu_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MonitorError::Config(format!(
                    "resource_limiter.{name} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }
}
