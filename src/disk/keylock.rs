//! Named reader-writer locks, one per cache id.

use parking_lot::{Mutex, RwLock};
use std::{collections::HashMap, sync::Arc};

/// A registry of per-key read-write locks.
///
/// Each key lazily instantiates its own lock on first use; lookups go
/// through a coarse registry mutex that is released before the per-key
/// lock is taken. Readers on the same key proceed concurrently, writers
/// are exclusive, and different keys never contend.
#[derive(Default)]
pub(crate) struct KeyLocks {
    registry: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl KeyLocks {
    pub fn acquire(&self, key: &str) -> Arc<RwLock<()>> {
        self.registry
            .lock()
            .entry(key.to_owned())
            .or_default()
            .clone()
    }
}
