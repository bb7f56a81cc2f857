//! Paths and URLs discovered inside monitored content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One path or URL reference discovered in fetched content.
///
/// Within a single extraction run no two entries share an `absolute_url`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPath {
    /// URL of the document the path was found in.
    pub source_url: String,
    /// The path exactly as it appeared in the content.
    pub raw_path: String,
    /// Normalized absolute form of `raw_path`.
    pub absolute_url: String,
    /// Snippet of surrounding content, for triage.
    pub context: String,
    /// Discovery strategy label, e.g. `manual_config_regex_0`.
    #[serde(rename = "type")]
    pub path_type: String,
    pub discovered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_type_serializes_under_type_key() {
        let path = ExtractedPath {
            source_url: "https://a.example/app.js".into(),
            raw_path: "/api/v1".into(),
            absolute_url: "https://a.example/api/v1".into(),
            context: "fetch('/api/v1')".into(),
            path_type: "manual_config_regex_0".into(),
            discovered_at: Utc::now(),
        };
        let json = serde_json::to_string(&path).unwrap();
        assert!(json.contains("\"type\":\"manual_config_regex_0\""));
        let back: ExtractedPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
