//! History persistence contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use webvigil_model::HistoryRecord;

/// Append-only store of per-URL observation records.
///
/// Implementations must be safe for concurrent appends from parallel URL
/// checks and provide at-least-once durability for stored records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Most recent record for `url`, or `None` when the URL is unseen.
    async fn get_last_record(&self, url: &str) -> anyhow::Result<Option<HistoryRecord>>;

    /// Append one record. Keyed by `(url, timestamp_ms)`.
    async fn store_record(&self, record: HistoryRecord) -> anyhow::Result<()>;

    /// All records for `url`, oldest first, optionally bounded below.
    async fn list_records(
        &self,
        url: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<HistoryRecord>>;
}
