//! Core engine for webvigil: continuous file-change monitoring of web
//! assets.
//!
//! The engine periodically fetches a configured set of HTTP(S) resources,
//! detects content changes by SHA-256 digest, produces structured diffs,
//! extracts referenced paths from changed JavaScript, persists history
//! records, and aggregates per-cycle notifications.
//!
//! Composition happens through [`MonitoringService`] plus the collaborator
//! traits of `webvigil-contracts`; the [`Scheduler`] drives cycles on a
//! fixed cadence.

pub mod aggregator;
pub mod batch;
pub mod checker;
pub mod config;
pub mod cycle;
pub mod diff;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod limiter;
pub mod lock_table;
pub mod pool;
pub mod processor;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod url_set;
pub mod validate;

pub use aggregator::EventAggregator;
pub use batch::{BatchProcessor, BatchRunOutcome, Progress, ProgressReporter};
pub use checker::UrlChecker;
pub use config::{
    BatchConfig, EngineConfig, ExtractorConfig, MonitorConfig, PathExtractorConfig,
    ResourceLimiterConfig,
};
pub use cycle::{CycleTracker, generate_cycle_id};
pub use diff::ContentDiffer;
pub use error::{MonitorError, Result};
pub use extract::{DEFAULT_FINDING_TYPE, PathExtractor, js::TreeSitterAnalyzer};
pub use fetch::{CacheHints, FetchOutcome, FetchResult, Fetcher};
pub use limiter::{ResourceLimiter, ResourceSample, ShutdownCallback};
pub use lock_table::{UrlLockGuard, UrlLockTable};
pub use pool::BufferPool;
pub use processor::{ContentProcessor, hash_bytes};
pub use scheduler::{CycleRunner, DEFAULT_STOP_GRACE, Scheduler};
pub use service::{Collaborators, MonitoringService};
pub use store::MemoryHistoryStore;
pub use url_set::{LoadOutcome, UrlSet};
pub use validate::{ValidationError, validate};
