//! Cycle identity and per-cycle change tracking.

use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

use chrono::Utc;

/// Fresh cycle identifier, `monitor-YYYYMMDD-HHMMSS`.
pub fn generate_cycle_id() -> String {
    format!("monitor-{}", Utc::now().format("%Y%m%d-%H%M%S"))
}

#[derive(Default)]
struct TrackerState {
    current_cycle_id: String,
    changed: HashSet<String>,
}

/// Holds the active cycle id and the URLs that changed within it.
///
/// Shared read-mostly across batch workers; every access goes through the
/// single internal lock. The changed set is cleared exactly once per cycle,
/// after the end-of-cycle report has been dispatched.
#[derive(Default)]
pub struct CycleTracker {
    state: Mutex<TrackerState>,
}

impl fmt::Debug for CycleTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("CycleTracker");
        match self.state.try_lock() {
            Ok(state) => debug
                .field("current_cycle_id", &state.current_cycle_id)
                .field("changed_count", &state.changed.len()),
            Err(_) => debug.field("state", &"<locked>"),
        };
        debug.finish()
    }
}

impl CycleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a fresh cycle id and clear the changed set. Returns the id.
    pub fn start_cycle(&self) -> String {
        let id = generate_cycle_id();
        let mut state = self.lock();
        state.current_cycle_id = id.clone();
        state.changed.clear();
        id
    }

    pub fn current_cycle_id(&self) -> String {
        self.lock().current_cycle_id.clone()
    }

    pub fn mark_changed(&self, url: &str) {
        self.lock().changed.insert(url.to_string());
    }

    /// Current cycle id plus a sorted copy of the changed URLs.
    pub fn snapshot(&self) -> (String, Vec<String>) {
        let state = self.lock();
        let mut changed: Vec<String> = state.changed.iter().cloned().collect();
        changed.sort();
        (state.current_cycle_id.clone(), changed)
    }

    pub fn has_changes(&self) -> bool {
        !self.lock().changed.is_empty()
    }

    /// Clear the changed set at cycle end.
    pub fn end_cycle(&self) {
        self.lock().changed.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
