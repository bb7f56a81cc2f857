//! Shared data models for the webvigil monitoring engine.
//!
//! Everything in this crate is a plain serde-serializable value type: the
//! engine core and the injected collaborators (history store, notifier,
//! diff reporter) exchange these and nothing else.

pub mod check;
pub mod diff;
pub mod events;
pub mod extract;
pub mod history;

pub use check::{BatchInfo, BatchStats, CheckError, CheckResult, CycleSummary, MonitoredUpdate};
pub use diff::{ChangeKind, DiffLine, DiffResult, DiffStats};
pub use events::{ErrorSource, FetchErrorInfo, FileChangeInfo, InterruptInfo};
pub use extract::ExtractedPath;
pub use history::HistoryRecord;
