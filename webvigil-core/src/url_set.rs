//! Thread-safe set of monitored URLs.

use std::fmt;
use std::path::Path;

use dashmap::DashSet;
use tracing::{debug, info};

use crate::error::Result;
use crate::validate;

/// Outcome of a bulk load from file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    pub added: usize,
    pub rejected: usize,
}

/// Set of monitored URLs, safe under concurrent mutation and enumeration.
///
/// Additions are idempotent; empty strings are rejected silently. URLs
/// survive cycles until explicitly removed.
#[derive(Default)]
pub struct UrlSet {
    urls: DashSet<String>,
}

impl fmt::Debug for UrlSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSet")
            .field("count", &self.urls.len())
            .finish()
    }
}

impl UrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one URL. Returns false for empty input or duplicates.
    pub fn add(&self, url: &str) -> bool {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return false;
        }
        self.urls.insert(trimmed.to_string())
    }

    /// Insert many URLs; returns how many were newly added.
    pub fn add_all<I, S>(&self, urls: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        urls.into_iter()
            .filter(|url| self.add(url.as_ref()))
            .count()
    }

    pub fn remove(&self, url: &str) -> bool {
        self.urls.remove(url).is_some()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Stable point-in-time copy of the set, sorted for deterministic
    /// traversal order.
    pub fn snapshot(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.urls.iter().map(|entry| entry.key().clone()).collect();
        urls.sort();
        urls
    }

    pub fn count(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Load URLs from a file, one per line. Blank lines and `#` comments
    /// are skipped; entries must validate as absolute monitorable URLs.
    pub async fn load_from_file(&self, path: impl AsRef<Path>) -> Result<LoadOutcome> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;

        let mut outcome = LoadOutcome::default();
        for line in contents.lines() {
            let candidate = line.trim();
            if candidate.is_empty() || candidate.starts_with('#') {
                continue;
            }
            match validate::validate(candidate, None, None) {
                Ok(url) => {
                    if self.add(url.as_str()) {
                        outcome.added += 1;
                    }
                }
                Err(reason) => {
                    outcome.rejected += 1;
                    debug!(candidate, %reason, "skipping unmonitorable line");
                }
            }
        }

        info!(
            path = %path.display(),
            added = outcome.added,
            rejected = outcome.rejected,
            total = self.count(),
            "loaded monitored URLs from file"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn add_is_idempotent_and_rejects_empty() {
        let set = UrlSet::new();
        assert!(set.add("https://a.example/app.js"));
        assert!(!set.add("https://a.example/app.js"));
        assert!(!set.add("   "));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn remove_reports_membership() {
        let set = UrlSet::new();
        set.add("https://a.example/app.js");
        assert!(set.remove("https://a.example/app.js"));
        assert!(!set.remove("https://a.example/app.js"));
        assert!(set.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_and_detached() {
        let set = UrlSet::new();
        set.add("https://b.example/b.js");
        set.add("https://a.example/a.js");
        let snapshot = set.snapshot();
        assert_eq!(
            snapshot,
            vec![
                "https://a.example/a.js".to_string(),
                "https://b.example/b.js".to_string()
            ]
        );
        set.add("https://c.example/c.js");
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn load_from_file_skips_comments_and_invalid_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# monitored assets").unwrap();
        writeln!(file, "https://a.example/app.js").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   https://b.example/main.js  ").unwrap();
        writeln!(file, "not-a-url").unwrap();
        writeln!(file, "https://localhost/x").unwrap();
        file.flush().unwrap();

        let set = UrlSet::new();
        let outcome = set.load_from_file(file.path()).await.unwrap();
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.rejected, 2);
        assert!(set.contains("https://a.example/app.js"));
        assert!(set.contains("https://b.example/main.js"));
    }
}
