//! First-win coordination over shared headers.
//!
//! Many translation units transitively include the same headers. For a
//! fixed argument vector the frontend produces identical declarations for
//! a header no matter which source opened it first, so symbol extraction
//! only needs to run once per header content version. The tracker turns
//! that observation into a cross-worker invariant: among concurrent
//! claims for the same path, exactly one wins.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Persisted snapshot of processed headers: path to content hash.
pub type HeaderSnapshot = BTreeMap<PathBuf, String>;

#[derive(Debug, Default)]
struct TrackerState {
    /// Header path to content hash at the moment it was processed.
    processed: BTreeMap<PathBuf, String>,
    /// Headers currently claimed by a worker.
    in_progress: HashSet<PathBuf>,
}

/// Thread-safe first-win tracker. All state transitions run under a single
/// mutex; reads return copies.
#[derive(Debug, Default)]
pub struct HeaderTracker {
    state: Mutex<TrackerState>,
}

impl HeaderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim a header for processing.
    ///
    /// Returns `true` iff the caller won and must extract the header's
    /// symbols. A header already processed with the same hash, or claimed
    /// by another worker, returns `false`. A hash mismatch drops the stale
    /// entry and lets the caller re-process.
    pub fn try_claim(&self, header: &Path, content_hash: &str) -> bool {
        let mut state = self.state.lock().unwrap();

        if let Some(stored) = state.processed.get(header) {
            if stored == content_hash {
                return false;
            }
            state.processed.remove(header);
        }

        if state.in_progress.contains(header) {
            return false;
        }

        state.in_progress.insert(header.to_path_buf());
        true
    }

    /// Marks a claimed header as fully processed with the given hash.
    pub fn mark_completed(&self, header: &Path, content_hash: &str) {
        let mut state = self.state.lock().unwrap();
        state.in_progress.remove(header);
        state.processed.insert(header.to_path_buf(), content_hash.to_string());
    }

    /// Forgets a header entirely; the next claim will succeed. Safe to
    /// call on unknown paths.
    pub fn invalidate_header(&self, header: &Path) {
        let mut state = self.state.lock().unwrap();
        state.processed.remove(header);
        state.in_progress.remove(header);
    }

    /// Empties both the processed and in-progress sets. Used when the
    /// compile database changes, since new arguments can alter
    /// preprocessing for every header.
    pub fn clear_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.processed.clear();
        state.in_progress.clear();
    }

    /// Returns `true` iff the header was processed with exactly this hash.
    pub fn is_processed(&self, header: &Path, content_hash: &str) -> bool {
        let state = self.state.lock().unwrap();
        state.processed.get(header).is_some_and(|stored| stored == content_hash)
    }

    pub fn processed_count(&self) -> usize {
        self.state.lock().unwrap().processed.len()
    }

    /// Snapshot of all processed headers for persistence.
    pub fn processed_headers(&self) -> HeaderSnapshot {
        self.state.lock().unwrap().processed.clone()
    }

    /// Replaces the processed set from a persisted snapshot. The
    /// in-progress set is untouched; it is empty on restore.
    pub fn restore_processed_headers(&self, snapshot: HeaderSnapshot) {
        self.state.lock().unwrap().processed = snapshot;
    }
}
