//! An in-memory cache bounded by both a caller-defined total size and an
//! item count, evicting least-recently-used entries under one lock.
//!
//! See [`crate::disk`] for the disk-backed sibling that shares this
//! eviction discipline but persists values as files instead of holding
//! them in the process.

use parking_lot::Mutex;

use crate::config::MemoryCacheConfig;
use crate::list::LruIndex;
use crate::RETAIN_RATIO;

struct Inner<V> {
    config: MemoryCacheConfig,
    index: LruIndex<V>,
    current_size: u64,
    size_of: Box<dyn FnMut(&str, &V) -> u64 + Send>,
    on_evict: Box<dyn FnMut(&str, V) + Send>,
}

impl<V> Inner<V> {
    fn evict_if_needed(&mut self) {
        if self.current_size <= self.config.max_size()
            && self.index.len() <= self.config.max_items()
        {
            return;
        }

        let target_size = (self.config.max_size() as f64 * RETAIN_RATIO) as u64;
        let target_items = (self.config.max_items() as f64 * RETAIN_RATIO) as usize;

        while self.current_size > target_size || self.index.len() > target_items {
            let Some((key, value)) = self.index.pop_back() else {
                break;
            };
            self.current_size = self
                .current_size
                .saturating_sub((self.size_of)(&key, &value));
            (self.on_evict)(&key, value);
        }
    }

    fn remove_internal(&mut self, key: &str) {
        if let Some(value) = self.index.remove(key) {
            self.current_size = self
                .current_size
                .saturating_sub((self.size_of)(key, &value));
            (self.on_evict)(key, value);
        }
    }
}

/// A size- and count-bounded LRU cache of owned values.
///
/// All operations serialize under one [`parking_lot::Mutex`], matching the
/// single-lock discipline the disk cache also uses.
pub struct MemoryCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> MemoryCache<V> {
    /// Creates a cache from `config`, a size function, and an eviction
    /// callback. Both closures run while the lock is held and must not
    /// re-enter the cache.
    pub fn new(
        config: MemoryCacheConfig,
        size_of: impl FnMut(&str, &V) -> u64 + Send + 'static,
        on_evict: impl FnMut(&str, V) + Send + 'static,
    ) -> Self {
        MemoryCache {
            inner: Mutex::new(Inner {
                config,
                index: LruIndex::new(),
                current_size: 0,
                size_of: Box::new(size_of),
                on_evict: Box::new(on_evict),
            }),
        }
    }

    /// Promotes `key` to most-recently-used and returns a clone of its
    /// value. The cache retains ownership of the stored value; callers get
    /// an independent copy.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        let mut inner = self.inner.lock();
        if !inner.index.contains(key) {
            return None;
        }
        inner.index.promote(key);
        inner.index.meta(key).cloned()
    }

    /// Inserts or overwrites `key`. On overwrite, `on_evict` runs once on
    /// the displaced value before the new one is stored. Eviction then
    /// runs if either bound would be exceeded.
    pub fn put(&self, key: &str, value: V) {
        let mut inner = self.inner.lock();

        let new_size = (inner.size_of)(key, &value);

        if inner.index.contains(key) {
            let old = inner.index.update_meta(key, value).expect("checked above");
            let old_size = (inner.size_of)(key, &old);
            inner.current_size = inner.current_size.saturating_sub(old_size);
            (inner.on_evict)(key, old);
            inner.index.promote(key);
        } else {
            inner.index.insert_front(key, value);
        }
        inner.current_size += new_size;

        inner.evict_if_needed();
    }

    /// Removes `key` if present, invoking `on_evict` once on its value.
    /// A second `remove` of the same key is a no-op.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        inner.remove_internal(key);
    }

    /// Pops every entry in LRU order, invoking `on_evict` for each.
    pub fn evict_all(&self) {
        let mut inner = self.inner.lock();
        while let Some((key, value)) = inner.index.pop_back() {
            let size = (inner.size_of)(&key, &value);
            inner.current_size = inner.current_size.saturating_sub(size);
            (inner.on_evict)(&key, value);
        }
    }

    /// Current number of entries.
    pub fn item_count(&self) -> usize {
        self.inner.lock().index.len()
    }

    /// Configured maximum entry count.
    pub fn max_item_count(&self) -> usize {
        self.inner.lock().config.max_items()
    }

    /// Current total recorded size.
    pub fn current_cache_size(&self) -> u64 {
        self.inner.lock().current_size
    }

    /// Configured maximum total size.
    pub fn max_cache_size(&self) -> u64 {
        self.inner.lock().config.max_size()
    }
}

impl<V> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryCache")
            .field("item_count", &inner.index.len())
            .field("current_size", &inner.current_size)
            .field("max_size", &inner.config.max_size())
            .field("max_items", &inner.config.max_items())
            .finish()
    }
}
