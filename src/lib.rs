#![doc = include_str!("../README.md")]

/// Construction-time error type.
pub mod error;

/// Construction parameters for both caches.
pub mod config;

/// The ordered `(key, metadata)` index shared by both caches.
pub(crate) mod list;

/// SHA-1 keying for on-disk file names.
pub(crate) mod hashing;

/// Filesystem primitives the disk cache builds on.
pub(crate) mod fs_util;

/// A size- and count-bounded in-memory LRU cache.
pub mod memory;

/// A crash-safe, journaled LRU cache of files on disk.
pub mod disk;

pub use config::{DiskCacheConfig, MemoryCacheConfig};
pub use disk::DiskCache;
pub use error::{CacheError, Result};
pub use memory::MemoryCache;

/// Fraction of a budget eviction targets bring usage back down to, shared
/// by both caches. Evicting down to the limit itself would mean the very
/// next insert immediately triggers another eviction pass; retaining only
/// three quarters of the budget leaves headroom to absorb a burst of
/// writes before that happens again.
pub(crate) const RETAIN_RATIO: f64 = 0.75;
