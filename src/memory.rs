//! Byte-budgeted LRU memory tier.

use crate::item::ByteSized;
use lru::LruCache;
use parking_lot::Mutex;

type DiscardingOldest<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// An in-memory LRU cache bounded by a byte budget rather than an entry
/// count.
///
/// Keys are `cache_id` strings; values report their footprint through
/// [`ByteSized`]. A capacity of `0` means unbounded. All operations are
/// linearized by a single per-tier mutex.
pub struct MemoryCache<V> {
    capacity_bytes: usize,
    inner: Mutex<Inner<V>>,
}

struct Inner<V> {
    // the lru crate keeps most-recently-used at the front; the byte
    // accounting on top is ours
    entries: LruCache<String, V>,
    current_bytes: usize,
    discarding_oldest: Option<DiscardingOldest<V>>,
}

impl<V: ByteSized> MemoryCache<V> {
    pub fn new(capacity_bytes: usize) -> MemoryCache<V> {
        MemoryCache {
            capacity_bytes,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_bytes: 0,
                discarding_oldest: None,
            }),
        }
    }

    /// Installs the single eviction hook slot. The hook runs
    /// synchronously under the tier lock, with the doomed entry still
    /// in place; it must not call back into the tier.
    pub fn set_discarding_oldest(&self, hook: impl Fn(&str, &V) + Send + Sync + 'static) {
        self.inner.lock().discarding_oldest = Some(Box::new(hook));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Returns the entry and promotes it to most-recently-used.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Inserts `item` under `key`.
    ///
    /// If the key is already present the existing entry is promoted and
    /// the supplied item is dropped. Otherwise entries are evicted from
    /// the cold end until the item fits the budget, then it is inserted
    /// as most-recently-used.
    pub fn add(&self, key: &str, item: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if inner.entries.get(key).is_some() {
            // the lookup has already bumped the entry
            return;
        }

        let size = item.size();
        if self.capacity_bytes > 0 {
            while inner.current_bytes + size > self.capacity_bytes {
                match inner.entries.peek_lru() {
                    Some((oldest_key, oldest)) => {
                        if let Some(hook) = &inner.discarding_oldest {
                            hook(oldest_key, oldest);
                        }
                    }
                    None => break,
                }

                if let Some((_, evicted)) = inner.entries.pop_lru() {
                    inner.current_bytes -= evicted.size();
                }
            }
        }

        inner.entries.put(key.to_owned(), item);
        inner.current_bytes += size;
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.pop(key) {
            Some(entry) => {
                inner.current_bytes -= entry.size();
                true
            }
            None => false,
        }
    }

    /// Removes and returns the oldest entry, but only if its size is
    /// exactly `incoming_size` and admitting that many bytes would
    /// overflow the budget.
    ///
    /// This is the buffer-recycling primitive: an incoming payload that
    /// would evict the oldest entry anyway can take over its backing
    /// buffer instead of allocating.
    pub fn pop_oldest_if_matches(&self, incoming_size: usize) -> Option<V> {
        if self.capacity_bytes == 0 {
            return None;
        }

        let mut inner = self.inner.lock();
        let oldest_size = inner.entries.peek_lru().map(|(_, entry)| entry.size())?;

        if oldest_size == incoming_size
            && inner.current_bytes + incoming_size > self.capacity_bytes
        {
            let (_, entry) = inner.entries.pop_lru()?;
            inner.current_bytes -= entry.size();
            Some(entry)
        } else {
            None
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.current_bytes = 0;
    }

    pub fn current_bytes(&self) -> usize {
        self.inner.lock().current_bytes
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::MemoryCache;
    use crate::item::ByteSized;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    struct Blob(usize);

    impl ByteSized for Blob {
        fn size(&self) -> usize {
            self.0
        }
    }

    const KIB: usize = 1024;

    #[test]
    fn evicts_oldest_on_pressure() {
        let tier = MemoryCache::new(1024 * KIB);

        tier.add("a", Blob(600 * KIB));
        tier.add("b", Blob(400 * KIB));
        tier.add("c", Blob(300 * KIB));

        assert!(!tier.contains("a"));
        assert!(tier.contains("b"));
        assert!(tier.contains("c"));
        assert_eq!(tier.current_bytes(), 700 * KIB);
    }

    #[test]
    fn get_promotes_against_eviction() {
        let tier = MemoryCache::new(1024 * KIB);

        tier.add("a", Blob(500 * KIB));
        tier.add("b", Blob(500 * KIB));
        tier.get("a").unwrap();
        tier.add("c", Blob(500 * KIB));

        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert!(tier.contains("c"));
    }

    #[test]
    fn add_of_existing_promotes_and_keeps_original() {
        let tier = MemoryCache::new(30);

        tier.add("a", Blob(10));
        tier.add("b", Blob(10));
        // same key, different size: the original entry must survive
        tier.add("a", Blob(25));
        assert_eq!(tier.current_bytes(), 20);

        tier.add("c", Blob(20));
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
        assert_eq!(tier.current_bytes(), 30);
    }

    #[test]
    fn recycle_requires_exact_size_and_pressure() {
        let tier = MemoryCache::new(1000);

        tier.add("x", Blob(500));
        // 500 + 500 == 1000 does not exceed the budget
        assert_eq!(tier.pop_oldest_if_matches(500), None);

        tier.add("y", Blob(500));
        // now 1000 + 500 > 1000, and the oldest is exactly 500 bytes
        assert_eq!(tier.pop_oldest_if_matches(500), Some(Blob(500)));
        assert!(!tier.contains("x"));
        assert!(tier.contains("y"));
        assert_eq!(tier.current_bytes(), 500);
    }

    #[test]
    fn recycle_rejects_size_mismatch() {
        let tier = MemoryCache::new(100);

        tier.add("x", Blob(60));
        tier.add("y", Blob(40));
        assert_eq!(tier.pop_oldest_if_matches(40), None);
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn unbounded_tier_never_evicts_nor_recycles() {
        let tier = MemoryCache::new(0);

        for i in 0..64 {
            tier.add(&format!("k{}", i), Blob(1024 * KIB));
        }

        assert_eq!(tier.len(), 64);
        assert_eq!(tier.pop_oldest_if_matches(1024 * KIB), None);
    }

    #[test]
    fn discarding_oldest_sees_entry_in_place() {
        let tier = MemoryCache::new(100);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        tier.set_discarding_oldest(move |key, entry: &Blob| {
            log.lock().unwrap().push((key.to_owned(), entry.size()));
        });

        tier.add("a", Blob(60));
        tier.add("b", Blob(40));
        tier.add("c", Blob(60));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![("a".to_owned(), 60), ("b".to_owned(), 40)]
        );
        assert_eq!(tier.current_bytes(), 60);
    }

    #[test]
    fn remove_and_clear_keep_the_books() {
        let tier = MemoryCache::new(0);

        tier.add("a", Blob(10));
        tier.add("b", Blob(20));
        assert_eq!(tier.current_bytes(), 30);

        assert!(tier.remove("a"));
        assert!(!tier.remove("a"));
        assert_eq!(tier.current_bytes(), 20);

        tier.clear();
        assert!(tier.is_empty());
        assert_eq!(tier.current_bytes(), 0);
    }
}
