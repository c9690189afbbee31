// src/services/dedup.rs

//! In-memory deduplication filter.
//!
//! Keeps the set of already-processed external ids for the lifetime of the
//! process; a marked id is never enriched again. The set is unbounded.

use std::collections::HashSet;
use std::sync::Mutex;

/// At-most-once filter keyed by external id.
#[derive(Debug, Default)]
pub struct DedupFilter {
    seen: Mutex<HashSet<String>>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether this external id has already been marked.
    ///
    /// An empty id is never considered seen; such references are invalid and
    /// rejected downstream.
    pub fn seen(&self, external_id: &str) -> bool {
        if external_id.is_empty() {
            return false;
        }
        self.seen.lock().unwrap().contains(external_id)
    }

    /// Mark an external id as processed, returning false when it was already
    /// marked. The check and the mark are one atomic step so concurrent
    /// workers cannot both admit the same id.
    ///
    /// Empty ids are never marked and always admit; such references are
    /// invalid and rejected downstream.
    pub fn mark(&self, external_id: &str) -> bool {
        if external_id.is_empty() {
            return true;
        }
        self.seen.lock().unwrap().insert(external_id.to_string())
    }

    /// Number of marked ids.
    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
