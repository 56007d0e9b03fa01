//! The current reconciled view of the library
//!
//! Entries, the path lookup and the scan counters sit behind one lock and
//! are replaced together, so a reader sees either the previous reindex or
//! the next one in full.

use crate::entry::{MediaEntry, ScanSnapshot};
use crate::filter::ListQuery;
use artifact_cache::ContentIdentity;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct IndexState {
    entries: Vec<MediaEntry>,
    by_path: HashMap<String, usize>,
    snapshot: ScanSnapshot,
}

#[derive(Default)]
pub struct MediaIndex {
    state: Mutex<IndexState>,
}

impl MediaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole index. `entries` should already be ordered.
    pub fn swap(&self, entries: Vec<MediaEntry>, snapshot: ScanSnapshot) {
        let by_path = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.relative_path.clone(), position))
            .collect();

        let mut state = self.state.lock();
        *state = IndexState {
            entries,
            by_path,
            snapshot,
        };
    }

    /// Point-in-time copy of every entry, in scan order
    pub fn entries(&self) -> Vec<MediaEntry> {
        self.state.lock().entries.clone()
    }

    pub fn query(&self, query: &ListQuery) -> Vec<MediaEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect()
    }

    pub fn scan_snapshot(&self) -> ScanSnapshot {
        self.state.lock().snapshot.clone()
    }

    pub fn lookup(&self, relative_path: &str) -> Option<MediaEntry> {
        let state = self.state.lock();
        state
            .by_path
            .get(relative_path)
            .and_then(|&position| state.entries.get(position))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set the score on every entry sharing `identity`. Returns how many matched.
    pub fn patch_rating(&self, identity: &ContentIdentity, score: i64) -> usize {
        self.patch(identity, |entry| entry.rating = score)
    }

    /// Set the play count on every entry sharing `identity`. Returns how many matched.
    pub fn patch_play_count(&self, identity: &ContentIdentity, count: i64) -> usize {
        self.patch(identity, |entry| entry.play_count = count)
    }

    fn patch(&self, identity: &ContentIdentity, apply: impl Fn(&mut MediaEntry)) -> usize {
        let mut state = self.state.lock();
        let mut matched = 0;
        for entry in state.entries.iter_mut().filter(|entry| &entry.identity == identity) {
            apply(entry);
            matched += 1;
        }
        matched
    }
}
