//! Memoized per-key view of the on-disk state.

use parking_lot::RwLock;
use std::{collections::HashMap, path::PathBuf};

/// What the store last learned about one cache id.
///
/// `present` implies `path` pointed at an existing file at the time the
/// entry was written. Stale entries are tolerated; a failed read clears
/// them so the next probe re-scans the disk.
#[derive(Debug, Clone)]
pub(crate) struct StatusEntry {
    pub present: bool,
    pub compressed: bool,
    pub path: Option<PathBuf>,
}

impl StatusEntry {
    pub fn present(compressed: bool, path: PathBuf) -> StatusEntry {
        StatusEntry {
            present: true,
            compressed,
            path: Some(path),
        }
    }

    pub fn absent() -> StatusEntry {
        StatusEntry {
            present: false,
            compressed: false,
            path: None,
        }
    }
}

/// The status map behind a single reader-writer lock.
///
/// The lock protects short, IO-free critical sections only, and is
/// always innermost relative to the per-key locks.
#[derive(Default)]
pub(crate) struct StatusRepository {
    entries: RwLock<HashMap<String, StatusEntry>>,
}

impl StatusRepository {
    pub fn get(&self, cache_id: &str) -> Option<StatusEntry> {
        self.entries.read().get(cache_id).cloned()
    }

    pub fn put(&self, cache_id: &str, entry: StatusEntry) {
        self.entries
            .write()
            .insert(cache_id.to_owned(), entry);
    }

    pub fn invalidate(&self, cache_id: &str) {
        self.entries.write().remove(cache_id);
    }
}
