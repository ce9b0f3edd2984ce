//! Construction parameters for both caches.
//!
//! Private fields behind a `new()` constructor and getters: the same
//! shape used throughout the cache family's own config types.

use std::path::{Path, PathBuf};

/// Construction parameters for [`crate::memory::MemoryCache`].
///
/// `size_of` and `on_evict` are supplied separately to
/// [`crate::memory::MemoryCache::new`] since they are closures, not data.
#[derive(Clone, Copy, Debug)]
pub struct MemoryCacheConfig {
    max_size: u64,
    max_items: usize,
}

impl MemoryCacheConfig {
    /// Creates a configuration bounding a [`crate::memory::MemoryCache`]
    /// by both a total size budget and an item count.
    ///
    /// # Arguments
    /// * `max_size` - Total size budget, in the caller's own units (as
    ///   computed by `size_of`). Eviction keeps the cache at or below this
    ///   most of the time, but briefly exceeding it before an eviction
    ///   pass runs is expected.
    /// * `max_items` - Maximum number of entries regardless of their
    ///   total size.
    pub fn new(max_size: u64, max_items: usize) -> Self {
        Self {
            max_size,
            max_items,
        }
    }

    /// Returns the configured total size budget.
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns the configured maximum item count.
    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

/// Construction parameters for [`crate::disk::DiskCache`].
#[derive(Clone, Debug)]
pub struct DiskCacheConfig {
    cache_dir: PathBuf,
    app_version: i64,
    max_cache_size: u64,
    max_item_count: usize,
}

impl DiskCacheConfig {
    /// Creates a configuration for a [`crate::disk::DiskCache`] rooted at
    /// `cache_dir`.
    ///
    /// # Arguments
    /// * `cache_dir` - Directory the cache owns. Created if missing.
    /// * `app_version` - Caller-chosen version stamped into the journal
    ///   header. A mismatch against a previously written journal is
    ///   treated as incompatible and wipes the index (the files on disk
    ///   become orphans).
    /// * `max_cache_size` - Total cache file bytes the disk cache tries
    ///   to stay under.
    /// * `max_item_count` - Maximum number of cached files regardless of
    ///   their total size.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        app_version: i64,
        max_cache_size: u64,
        max_item_count: usize,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            app_version,
            max_cache_size,
            max_item_count,
        }
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the configured app version.
    pub fn app_version(&self) -> i64 {
        self.app_version
    }

    /// Returns the configured total cache size budget, in bytes.
    pub fn max_cache_size(&self) -> u64 {
        self.max_cache_size
    }

    /// Returns the configured maximum item count.
    pub fn max_item_count(&self) -> usize {
        self.max_item_count
    }
}
