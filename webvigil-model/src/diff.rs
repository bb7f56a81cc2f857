//! Structured diffs between two observed content versions.

use serde::{Deserialize, Serialize};

/// Classification of one diff entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Equal,
    Delete,
    Insert,
}

/// One line (text diffs) or run (byte diffs) of a structured diff.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: ChangeKind,
    /// Line index in the old content, absent for insertions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_index: Option<usize>,
    /// Line index in the new content, absent for deletions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_index: Option<usize>,
    pub content: String,
}

/// Insertion/deletion totals for quick triage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
}

/// Content-type-aware diff between two content buffers.
///
/// Text content carries per-line entries; binary content carries only the
/// byte-run statistics with `text = false` and an empty `lines`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub content_type: String,
    /// Empty string when diffing against a first observation.
    pub old_hash: String,
    pub new_hash: String,
    pub text: bool,
    pub lines: Vec<DiffLine>,
    pub stats: DiffStats,
}

impl DiffResult {
    /// True when the diff recorded no insertions or deletions.
    pub fn is_unchanged(&self) -> bool {
        self.stats.insertions == 0 && self.stats.deletions == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_round_trips_through_json() {
        let diff = DiffResult {
            content_type: "text/javascript".into(),
            old_hash: "aa".repeat(32),
            new_hash: "bb".repeat(32),
            text: true,
            lines: vec![
                DiffLine {
                    kind: ChangeKind::Delete,
                    old_index: Some(0),
                    new_index: None,
                    content: "fetch('/a')\n".into(),
                },
                DiffLine {
                    kind: ChangeKind::Insert,
                    old_index: None,
                    new_index: Some(0),
                    content: "fetch('/b')\n".into(),
                },
            ],
            stats: DiffStats {
                insertions: 1,
                deletions: 1,
            },
        };
        let json = serde_json::to_string(&diff).unwrap();
        let back: DiffResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, diff);
        assert!(!back.is_unchanged());
    }
}
