//! Per-URL serialization locks.
//!
//! Two checks for the same URL must never run concurrently. The table maps
//! URL → mutex with double-checked lazy insertion: a cheap read-lock probe
//! first, then a write-lock create-if-absent for the miss path.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

/// Handle that keeps one URL's check slot held until dropped.
///
/// Not reentrant: acquiring the same URL again from the same task deadlocks.
pub struct UrlLockGuard {
    url: String,
    _guard: OwnedMutexGuard<()>,
}

impl UrlLockGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Debug for UrlLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlLockGuard").field("url", &self.url).finish()
    }
}

/// Lazily populated URL → mutex table with GC of unused entries.
#[derive(Default)]
pub struct UrlLockTable {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for UrlLockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("UrlLockTable");
        match self.locks.try_read() {
            Ok(guard) => debug.field("entries", &guard.len()),
            Err(_) => debug.field("entries", &"<locked>"),
        };
        debug.finish()
    }
}

impl UrlLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the named URL's slot.
    pub async fn acquire(&self, url: &str) -> UrlLockGuard {
        let existing = { self.locks.read().await.get(url).cloned() };
        let lock = match existing {
            Some(lock) => lock,
            None => {
                let mut table = self.locks.write().await;
                Arc::clone(
                    table
                        .entry(url.to_string())
                        .or_insert_with(|| Arc::new(Mutex::new(()))),
                )
            }
        };
        let guard = lock.lock_owned().await;
        UrlLockGuard {
            url: url.to_string(),
            _guard: guard,
        }
    }

    /// Drop entries for URLs absent from `active`. Entries currently held
    /// are skipped and picked up by a later sweep. Returns removals.
    pub async fn gc(&self, active: &HashSet<String>) -> usize {
        let mut table = self.locks.write().await;
        let before = table.len();
        table.retain(|url, lock| active.contains(url) || lock.try_lock().is_err());
        let removed = before - table.len();
        if removed > 0 {
            debug!(removed, remaining = table.len(), "lock table GC");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}
