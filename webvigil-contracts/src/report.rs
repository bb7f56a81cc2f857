//! HTML diff report rendering contract.

use async_trait::async_trait;
use webvigil_model::DiffResult;

/// Renders human-readable HTML comparison pages from observed content.
#[async_trait]
pub trait HtmlDiffReporter: Send + Sync {
    /// Consolidated report over `urls` for the named cycle. Returns the
    /// generated file paths; may be empty when there is nothing to show.
    async fn generate_diff_report(
        &self,
        urls: &[String],
        cycle_id: &str,
    ) -> anyhow::Result<Vec<String>>;

    /// Standalone report page for a single change.
    async fn generate_single_diff_report(
        &self,
        url: &str,
        diff: &DiffResult,
        old_hash: &str,
        new_hash: &str,
        content: &[u8],
    ) -> anyhow::Result<String>;
}
