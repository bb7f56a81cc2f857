//! Outcomes of individual URL checks and whole cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffResult;
use crate::events::ErrorSource;
use crate::extract::ExtractedPath;

/// Hashed packaging of one fetched response body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MonitoredUpdate {
    pub url: String,
    /// Lowercase-hex SHA-256 of `content`.
    pub hash: String,
    pub content_type: String,
    pub fetched_at: DateTime<Utc>,
    pub content: Vec<u8>,
}

/// Provenance of a URL inside a batched cycle run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// 1-based index of the batch within the cycle.
    pub batch_index: usize,
    pub total_batches: usize,
    pub batch_size: usize,
    /// 0-based position of the URL within its batch.
    pub position_in_batch: usize,
}

/// Error captured by a check step, never raised past the checker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckError {
    pub source: ErrorSource,
    pub message: String,
}

impl CheckError {
    pub fn new(source: ErrorSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

/// Immutable outcome of one URL check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub url: String,
    pub changed: bool,
    pub new_hash: String,
    /// Empty string on first observation.
    pub old_hash: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffResult>,
    pub extracted_paths: Vec<ExtractedPath>,
    pub processed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchInfo>,
}

impl CheckResult {
    /// A skeleton result carrying only the error for a failed step.
    pub fn failed(url: impl Into<String>, error: CheckError) -> Self {
        Self {
            url: url.into(),
            changed: false,
            new_hash: String::new(),
            old_hash: String::new(),
            content_type: String::new(),
            content: None,
            diff: None,
            extracted_paths: Vec::new(),
            processed_at: Utc::now(),
            error: Some(error),
            batch: None,
        }
    }

    /// True when this check observed the URL for the first time.
    pub fn first_observation(&self) -> bool {
        self.changed && self.old_hash.is_empty()
    }
}

/// Batch sizing statistics attached to cycle-complete notifications.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_batches: usize,
    pub batch_size: usize,
    pub max_concurrent: usize,
}

/// Aggregate outcome of one full monitoring cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub total_monitored: usize,
    pub processed: usize,
    pub failed: usize,
    /// URLs skipped by the resource limiter before their check started.
    pub skipped: usize,
    pub changed_urls: Vec<String>,
    pub report_paths: Vec<String>,
    pub batch_stats: BatchStats,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_requires_change_and_empty_old_hash() {
        let mut result = CheckResult::failed("https://a.example/x", CheckError::new(ErrorSource::Fetch, "boom"));
        assert!(!result.first_observation());

        result.error = None;
        result.changed = true;
        assert!(result.first_observation());

        result.old_hash = "deadbeef".into();
        assert!(!result.first_observation());
    }
}
