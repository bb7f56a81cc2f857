//! Persisted per-URL observation records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One appended observation of a monitored URL.
///
/// Records are keyed by `(url, timestamp_ms)` in the backing store. `hash`
/// uniquely identifies the observed byte sequence; `content` is present only
/// when full-content storage is enabled and the record represents a change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub url: String,
    /// Observation time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Lowercase-hex SHA-256 of the response body.
    pub hash: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    /// Serialized [`crate::DiffResult`], when a change produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_json: Option<String>,
    /// Serialized list of [`crate::ExtractedPath`], when extraction ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_paths_json: Option<String>,
}

impl HistoryRecord {
    /// Observation time as a `DateTime`, for display and ordering.
    pub fn observed_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp_ms)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted_when_absent() {
        let record = HistoryRecord {
            url: "https://a.example/app.js".into(),
            timestamp_ms: 1_700_000_000_000,
            hash: "ab".repeat(32),
            content_type: "application/javascript".into(),
            etag: None,
            last_modified: None,
            content: None,
            diff_json: None,
            extracted_paths_json: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("etag"));
        assert!(!json.contains("content\""));
    }
}
