//! Default content differ: line-based for textual content, byte-run
//! statistics otherwise.

use similar::{Algorithm, ChangeTag, DiffTag, TextDiff, capture_diff_slices};
use webvigil_contracts::Differ;
use webvigil_model::{ChangeKind, DiffLine, DiffResult, DiffStats};

const TEXTUAL_MARKERS: &[&str] = &["text/", "json", "javascript", "ecmascript", "xml", "html"];

fn is_textual(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    TEXTUAL_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// [`Differ`] implementation over the `similar` engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentDiffer;

impl ContentDiffer {
    pub fn new() -> Self {
        Self
    }
}

impl Differ for ContentDiffer {
    fn generate_diff(
        &self,
        old: &[u8],
        new: &[u8],
        content_type: &str,
        old_hash: &str,
        new_hash: &str,
    ) -> anyhow::Result<DiffResult> {
        if is_textual(content_type) {
            let old_text = String::from_utf8_lossy(old);
            let new_text = String::from_utf8_lossy(new);
            let diff = TextDiff::from_lines(old_text.as_ref(), new_text.as_ref());

            let mut lines = Vec::new();
            let mut stats = DiffStats::default();
            for change in diff.iter_all_changes() {
                let kind = match change.tag() {
                    ChangeTag::Equal => ChangeKind::Equal,
                    ChangeTag::Delete => {
                        stats.deletions += 1;
                        ChangeKind::Delete
                    }
                    ChangeTag::Insert => {
                        stats.insertions += 1;
                        ChangeKind::Insert
                    }
                };
                lines.push(DiffLine {
                    kind,
                    old_index: change.old_index(),
                    new_index: change.new_index(),
                    content: change.value().to_string(),
                });
            }

            return Ok(DiffResult {
                content_type: content_type.to_string(),
                old_hash: old_hash.to_string(),
                new_hash: new_hash.to_string(),
                text: true,
                lines,
                stats,
            });
        }

        let mut stats = DiffStats::default();
        for op in capture_diff_slices(Algorithm::Myers, old, new) {
            match op.tag() {
                DiffTag::Equal => {}
                DiffTag::Delete => stats.deletions += op.old_range().len(),
                DiffTag::Insert => stats.insertions += op.new_range().len(),
                DiffTag::Replace => {
                    stats.deletions += op.old_range().len();
                    stats.insertions += op.new_range().len();
                }
            }
        }
        Ok(DiffResult {
            content_type: content_type.to_string(),
            old_hash: old_hash.to_string(),
            new_hash: new_hash.to_string(),
            text: false,
            lines: Vec::new(),
            stats,
        })
    }
}
