//! Per-URL change-detection pipeline.
//!
//! One check runs fetch → hash → compare-against-history → diff → extract
//! → persist, sequentially. Every step failure is captured as a value on
//! the returned [`CheckResult`]; a check never panics and never aborts the
//! surrounding batch.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;
use webvigil_contracts::{Differ, HistoryStore};
use webvigil_model::{
    BatchInfo, CheckError, CheckResult, ErrorSource, HistoryRecord, MonitoredUpdate,
};

use crate::config::MonitorConfig;
use crate::extract::PathExtractor;
use crate::fetch::{CacheHints, FetchOutcome, Fetcher};
use crate::processor::ContentProcessor;

const EXTRACTABLE_MARKERS: &[&str] = &["javascript", "html", "json"];

/// Orchestrates the check pipeline for a single URL.
pub struct UrlChecker {
    fetcher: Fetcher,
    processor: ContentProcessor,
    history: Arc<dyn HistoryStore>,
    differ: Option<Arc<dyn Differ>>,
    extractor: Option<Arc<PathExtractor>>,
    store_full_content_on_change: bool,
    bypass_cache: bool,
}

impl std::fmt::Debug for UrlChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlChecker")
            .field("differ", &self.differ.is_some())
            .field("extractor", &self.extractor.is_some())
            .field("store_full_content_on_change", &self.store_full_content_on_change)
            .field("bypass_cache", &self.bypass_cache)
            .finish()
    }
}

impl UrlChecker {
    pub fn new(
        config: &MonitorConfig,
        fetcher: Fetcher,
        history: Arc<dyn HistoryStore>,
        differ: Option<Arc<dyn Differ>>,
        extractor: Option<Arc<PathExtractor>>,
    ) -> Self {
        Self {
            fetcher,
            processor: ContentProcessor::new(),
            history,
            differ,
            extractor,
            store_full_content_on_change: config.store_full_content_on_change,
            bypass_cache: config.bypass_cache,
        }
    }

    /// Run one check. The per-URL lock is the caller's responsibility.
    pub async fn check(
        &self,
        url: &str,
        token: &CancellationToken,
        cycle_id: &str,
        batch: Option<BatchInfo>,
    ) -> CheckResult {
        let last = match self.history.get_last_record(url).await {
            Ok(last) => last,
            Err(error) => {
                warn!(url, cycle_id, source = %ErrorSource::ChangeDetection, %error, "history read failed");
                let mut result = CheckResult::failed(
                    url,
                    CheckError::new(ErrorSource::ChangeDetection, error.to_string()),
                );
                result.batch = batch;
                return result;
            }
        };

        let hints = match (&last, self.bypass_cache) {
            (Some(last), false) => CacheHints {
                etag: last.etag.clone(),
                last_modified: last.last_modified.clone(),
            },
            _ => CacheHints::default(),
        };

        let fetched = match self.fetcher.fetch(url, token, &hints, self.bypass_cache).await {
            Ok(FetchOutcome::Fetched(fetched)) => fetched,
            Ok(FetchOutcome::NotModified { .. }) => {
                debug!(url, cycle_id, "not modified");
                let (old_hash, content_type) = last
                    .map(|last| (last.hash, last.content_type))
                    .unwrap_or_default();
                return CheckResult {
                    url: url.to_string(),
                    changed: false,
                    new_hash: old_hash.clone(),
                    old_hash,
                    content_type,
                    content: None,
                    diff: None,
                    extracted_paths: Vec::new(),
                    processed_at: Utc::now(),
                    error: None,
                    batch,
                };
            }
            Err(error) => {
                warn!(url, cycle_id, source = %ErrorSource::Fetch, %error, "fetch failed");
                let mut result =
                    CheckResult::failed(url, CheckError::new(ErrorSource::Fetch, error.to_string()));
                result.batch = batch;
                return result;
            }
        };

        let update = self
            .processor
            .process(url, &fetched.body, &fetched.content_type);

        let (changed, old_hash, old_content) = match &last {
            None => (true, String::new(), Vec::new()),
            Some(last) if last.hash == update.hash => (false, last.hash.clone(), Vec::new()),
            Some(last) => (
                true,
                last.hash.clone(),
                last.content.clone().unwrap_or_default(),
            ),
        };

        if !changed {
            debug!(url, cycle_id, hash = %update.hash, "content unchanged");
            return CheckResult {
                url: url.to_string(),
                changed: false,
                new_hash: update.hash,
                old_hash,
                content_type: update.content_type,
                content: None,
                diff: None,
                extracted_paths: Vec::new(),
                processed_at: Utc::now(),
                error: None,
                batch,
            };
        }

        let diff = self.differ.as_deref().and_then(|differ| {
            match differ.generate_diff(
                &old_content,
                &update.content,
                &update.content_type,
                &old_hash,
                &update.hash,
            ) {
                Ok(diff) => Some(diff),
                Err(error) => {
                    // Non-fatal: the change is still recorded without a diff.
                    warn!(url, cycle_id, source = %ErrorSource::Process, %error, "diff generation failed");
                    None
                }
            }
        });

        let extracted_paths = self.extract_paths(url, &update);

        let mut error = None;
        match self.build_record(&update, &fetched.etag, &fetched.last_modified, &diff, &extracted_paths) {
            Ok(record) => {
                if let Err(store_error) = self.history.store_record(record).await {
                    warn!(url, cycle_id, source = %ErrorSource::Store, error = %store_error, "history write failed");
                    error = Some(CheckError::new(ErrorSource::Store, store_error.to_string()));
                }
            }
            Err(serialize_error) => {
                warn!(url, cycle_id, source = %ErrorSource::Store, error = %serialize_error, "record serialization failed");
                error = Some(CheckError::new(ErrorSource::Store, serialize_error.to_string()));
            }
        }

        CheckResult {
            url: url.to_string(),
            changed: true,
            new_hash: update.hash,
            old_hash,
            content_type: update.content_type,
            content: Some(update.content),
            diff,
            extracted_paths,
            processed_at: Utc::now(),
            error,
            batch,
        }
    }

    fn extract_paths(
        &self,
        url: &str,
        update: &MonitoredUpdate,
    ) -> Vec<webvigil_model::ExtractedPath> {
        let Some(extractor) = self.extractor.as_deref() else {
            return Vec::new();
        };
        if !is_extractable(&update.content_type) {
            return Vec::new();
        }
        let Ok(parsed) = Url::parse(url) else {
            debug!(url, "unparsable source URL; skipping extraction");
            return Vec::new();
        };
        extractor.extract(&parsed, &update.content, &update.content_type)
    }

    fn build_record(
        &self,
        update: &MonitoredUpdate,
        etag: &Option<String>,
        last_modified: &Option<String>,
        diff: &Option<webvigil_model::DiffResult>,
        extracted_paths: &[webvigil_model::ExtractedPath],
    ) -> serde_json::Result<HistoryRecord> {
        let diff_json = diff.as_ref().map(serde_json::to_string).transpose()?;
        let extracted_paths_json = if extracted_paths.is_empty() {
            None
        } else {
            Some(serde_json::to_string(extracted_paths)?)
        };
        Ok(HistoryRecord {
            url: update.url.clone(),
            timestamp_ms: update.fetched_at.timestamp_millis(),
            hash: update.hash.clone(),
            content_type: update.content_type.clone(),
            etag: etag.clone(),
            last_modified: last_modified.clone(),
            content: self
                .store_full_content_on_change
                .then(|| update.content.clone()),
            diff_json,
            extracted_paths_json,
        })
    }
}

fn is_extractable(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    EXTRACTABLE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extractable_content_types() {
        assert!(is_extractable("application/javascript; charset=utf-8"));
        assert!(is_extractable("text/html"));
        assert!(is_extractable("application/json"));
        assert!(!is_extractable("image/png"));
        assert!(!is_extractable(""));
    }
}
