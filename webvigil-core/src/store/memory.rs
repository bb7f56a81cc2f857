//! In-memory history store, for tests and small embedded deployments.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use webvigil_contracts::HistoryStore;
use webvigil_model::HistoryRecord;

/// [`HistoryStore`] holding records in a per-URL vector, append order.
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<String, Vec<HistoryRecord>>>,
}

impl fmt::Debug for MemoryHistoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MemoryHistoryStore");
        match self.records.try_read() {
            Ok(records) => debug.field("urls", &records.len()),
            Err(_) => debug.field("urls", &"<locked>"),
        };
        debug.finish()
    }
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records across all URLs.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn get_last_record(&self, url: &str) -> anyhow::Result<Option<HistoryRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(url)
            .and_then(|records| records.last())
            .cloned())
    }

    async fn store_record(&self, record: HistoryRecord) -> anyhow::Result<()> {
        self.records
            .write()
            .await
            .entry(record.url.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn list_records(
        &self,
        url: &str,
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<HistoryRecord>> {
        let floor = since.map(|since| since.timestamp_millis());
        Ok(self
            .records
            .read()
            .await
            .get(url)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| floor.is_none_or(|floor| record.timestamp_ms >= floor))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
