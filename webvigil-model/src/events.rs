//! Event payloads buffered by the aggregator and shipped to the notifier.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractedPath;

/// Pipeline step that produced a check error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Fetch,
    Process,
    ChangeDetection,
    Store,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fetch => "fetch",
            Self::Process => "process",
            Self::ChangeDetection => "change_detection",
            Self::Store => "store",
        };
        f.write_str(label)
    }
}

/// Change event surfaced to the aggregator for one URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileChangeInfo {
    pub url: String,
    /// Empty string on first observation.
    pub old_hash: String,
    pub new_hash: String,
    pub content_type: String,
    pub change_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_report_path: Option<String>,
    pub extracted_paths: Vec<ExtractedPath>,
    pub cycle_id: String,
}

/// Fetch/processing failure surfaced to the aggregator for one URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetchErrorInfo {
    pub url: String,
    pub error_message: String,
    pub source: ErrorSource,
    pub occurred_at: DateTime<Utc>,
    pub cycle_id: String,
}

/// Payload of the interrupt notification sent when a cycle is cancelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterruptInfo {
    pub cycle_id: String,
    pub total_targets: usize,
    pub processed_targets: usize,
    pub reason: String,
    pub last_activity: DateTime<Utc>,
}
