//! Notification transport contract.

use async_trait::async_trait;
use webvigil_model::{CycleSummary, FetchErrorInfo, FileChangeInfo, InterruptInfo};

/// Delivery channel for cycle reports and aggregated events.
///
/// Delivery failures are the transport's to report; the engine logs them
/// and moves on — a broken webhook never aborts a cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// End-of-cycle report. Fired once per completed cycle, with an empty
    /// change list when nothing changed.
    async fn send_cycle_complete(&self, summary: &CycleSummary) -> anyhow::Result<()>;

    /// Sent when a cycle is cancelled before all URLs complete.
    async fn send_monitor_interrupt(&self, info: &InterruptInfo) -> anyhow::Result<()>;

    /// Aggregated file-change events, flushed on timer or threshold.
    async fn send_aggregated_file_changes(
        &self,
        changes: &[FileChangeInfo],
        report_path: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Aggregated fetch-error events, flushed on timer or threshold.
    async fn send_aggregated_fetch_errors(&self, errors: &[FetchErrorInfo])
    -> anyhow::Result<()>;
}
