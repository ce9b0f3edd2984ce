//! A crash-safe, journaled LRU cache of files on disk.
//!
//! Every cached value lives at `<cache_dir>/<sha1[0:2]>/<sha1[2:]>`, where
//! the SHA-1 digest is taken over the caller's key (see
//! [`crate::hashing`]). A single background thread owns the journal file
//! and is the only writer to it; callers mutate the in-memory index
//! directly under one lock and hand the journal side effect off to that
//! thread, which is what lets `put`/`get`/`remove` stay fast and
//! non-blocking on disk I/O for anyone but the worker. Eviction runs on
//! that same thread, at the tail of processing a `put`'s journal append,
//! so a caller that pushes the cache over budget is never the one that
//! blocks on the resulting file deletes.

mod journal;
mod queue;
mod worker;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Condvar, Mutex as StdMutex};

use parking_lot::Mutex;

use crate::config::DiskCacheConfig;
use crate::error::{CacheError, Result};
use crate::hashing::sha1_hex;
use crate::list::LruIndex;

use queue::BlockingQueue;
use worker::Job;

/// Number of redundant `U` lines (updates to an already-present key)
/// the journal tolerates before the worker compacts it down to a fresh
/// baseline.
const REDUNDANCY_COMPACTION_THRESHOLD: u64 = 2000;

struct IndexState {
    index: LruIndex<u64>,
    current_size: u64,
    redundant_count: u64,
}

/// Removes `sha1_key` from an already-locked index, adjusting the size
/// accounting. Shared by the public `remove` and by eviction, which both
/// need the same bookkeeping but differ in what happens once the lock is
/// released (a single journal delete vs. one per evicted entry).
fn remove_from_state(state: &mut IndexState, sha1_key: &str) -> bool {
    match state.index.remove(sha1_key) {
        Some(size) => {
            state.current_size = state.current_size.saturating_sub(size);
            state.redundant_count += 1;
            true
        }
        None => false,
    }
}

struct Shared {
    index: Mutex<IndexState>,
    config: DiskCacheConfig,
    queue: BlockingQueue<Job>,
    ready: StdMutex<bool>,
    ready_cv: Condvar,
}

/// Resolves the cache directory's journal and per-entry file paths.
#[derive(Clone)]
struct Paths {
    dir: PathBuf,
}

impl Paths {
    fn journal(&self) -> PathBuf {
        self.dir.join("journal")
    }

    fn journal_bak(&self) -> PathBuf {
        self.dir.join("journal.bak")
    }

    fn journal_tmp(&self) -> PathBuf {
        self.dir.join("journal.tmp")
    }

    fn entry_dir(&self, sha1_key: &str) -> PathBuf {
        self.dir.join(&sha1_key[0..2])
    }

    fn entry_path(&self, sha1_key: &str) -> PathBuf {
        self.entry_dir(sha1_key).join(&sha1_key[2..])
    }

    fn entry_tmp_path(&self, sha1_key: &str) -> PathBuf {
        self.entry_dir(sha1_key).join(format!("{}.tmp", &sha1_key[2..]))
    }
}

/// A journaled, size- and count-bounded LRU cache of files on disk.
pub struct DiskCache {
    shared: std::sync::Arc<Shared>,
    paths: Paths,
    worker: Option<worker::Worker>,
}

impl DiskCache {
    /// Creates (or opens) a disk cache rooted at `config.cache_dir`,
    /// creating the directory if missing and replaying any existing
    /// journal before returning. Blocks until that replay completes.
    pub fn new(config: DiskCacheConfig) -> Result<Self> {
        crate::fs_util::make_dirs(config.cache_dir())
            .map_err(|e| CacheError::io(config.cache_dir().to_path_buf(), e))?;

        let paths = Paths {
            dir: config.cache_dir().to_path_buf(),
        };

        let shared = std::sync::Arc::new(Shared {
            index: Mutex::new(IndexState {
                index: LruIndex::new(),
                current_size: 0,
                redundant_count: 0,
            }),
            config,
            queue: BlockingQueue::new(),
            ready: StdMutex::new(false),
            ready_cv: Condvar::new(),
        });

        shared.queue.push_back(Job::InitFromJournal);
        let worker = worker::spawn(std::sync::Arc::clone(&shared), paths.clone());

        {
            let mut ready = shared.ready.lock().unwrap();
            while !*ready {
                ready = shared.ready_cv.wait(ready).unwrap();
            }
        }

        Ok(DiskCache {
            shared,
            paths,
            worker: Some(worker),
        })
    }

    /// `true` once the journal has been replayed and the cache is ready
    /// to serve requests. Always `true` by the time [`Self::new`]
    /// returns; kept for callers that hold a clone-like handle across
    /// threads and want to assert on it explicitly.
    pub fn is_initialized(&self) -> bool {
        *self.shared.ready.lock().unwrap()
    }

    /// Writes a payload under `key` by invoking `writer` with the
    /// temporary file to stream into, replacing any existing entry on
    /// success. `writer` runs without the index lock held; it returns
    /// `false` to signal a write failure, which leaves the cache
    /// untouched. An empty `key` always fails without calling `writer`.
    pub fn put(&self, key: &str, writer: impl FnOnce(&mut File) -> bool) -> bool {
        log::trace!("put: entering for key {key:?}");
        if key.is_empty() {
            return false;
        }
        let sha1_key = sha1_hex(key);
        let dir = self.paths.entry_dir(&sha1_key);
        if crate::fs_util::make_dirs(&dir).is_err() {
            return false;
        }

        let tmp_path = self.paths.entry_tmp_path(&sha1_key);
        let mut tmp_file = match File::create(&tmp_path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        if !writer(&mut tmp_file) {
            drop(tmp_file);
            let _ = crate::fs_util::delete_file(&tmp_path);
            return false;
        }
        let size = match tmp_file.metadata() {
            Ok(m) => m.len(),
            Err(_) => {
                drop(tmp_file);
                let _ = crate::fs_util::delete_file(&tmp_path);
                return false;
            }
        };
        drop(tmp_file);

        let final_path = self.paths.entry_path(&sha1_key);
        if crate::fs_util::rename(&tmp_path, &final_path).is_err() {
            let _ = crate::fs_util::delete_file(&tmp_path);
            return false;
        }

        let existed = self.insert_or_update(&sha1_key, size);

        self.shared
            .queue
            .push_back(Job::Append(journal::Action::Update {
                key: sha1_key.clone(),
                size,
            }));
        if existed {
            self.compact_if_redundant();
        }
        log::trace!("put: exiting for key {key:?}, success");
        true
    }

    /// Writes `payload` verbatim under `key`. A thin convenience over
    /// [`Self::put`] for callers who already have the whole value in
    /// memory.
    pub fn put_bytes(&self, key: &str, payload: &[u8]) -> bool {
        self.put(key, |file| std::io::Write::write_all(file, payload).is_ok())
    }

    /// Looks up `key`, promotes it to most-recently-used, and invokes
    /// `reader` with the opened cache file. Returns `reader`'s result, or
    /// `false` if `key` is absent (including when the index claims the
    /// file exists but it has since vanished from disk, which is treated
    /// as not-found and repaired by removing the stale entry).
    pub fn get(&self, key: &str, reader: impl FnOnce(&mut File) -> bool) -> bool {
        log::trace!("get: entering for key {key:?}");
        let sha1_key = sha1_hex(key);
        let final_path = self.paths.entry_path(&sha1_key);

        {
            let mut state = self.shared.index.lock();
            if !state.index.contains(&sha1_key) {
                return false;
            }
            if !crate::fs_util::file_exists(&final_path) {
                remove_from_state(&mut state, &sha1_key);
                drop(state);
                self.shared
                    .queue
                    .push_back(Job::Append(journal::Action::Delete { key: sha1_key }));
                self.compact_if_redundant();
                return false;
            }
            state.index.promote(&sha1_key);
            state.redundant_count += 1;
        }

        self.shared
            .queue
            .push_back(Job::Append(journal::Action::Read {
                key: sha1_key.clone(),
            }));
        self.compact_if_redundant();

        let Ok(mut file) = File::open(&final_path) else {
            return false;
        };
        let result = reader(&mut file);
        log::trace!("get: exiting for key {key:?}, found={result}");
        result
    }

    /// Reads back the full contents stored under `key`. A thin
    /// convenience over [`Self::get`] for callers who want the whole
    /// value in memory.
    pub fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        if self.get(key, |file| std::io::Read::read_to_end(file, &mut buf).is_ok()) {
            Some(buf)
        } else {
            None
        }
    }

    /// Removes `key` if present, deleting its file. A repeat call on an
    /// absent key is a no-op.
    pub fn remove(&self, key: &str) {
        log::trace!("remove: entering for key {key:?}");
        let sha1_key = sha1_hex(key);
        let removed = {
            let mut state = self.shared.index.lock();
            remove_from_state(&mut state, &sha1_key)
        };
        if removed {
            self.finish_remove(&sha1_key);
            self.compact_if_redundant();
        }
        log::trace!("remove: exiting for key {key:?}, removed={removed}");
    }

    /// The file-and-journal half of removal, run after the index lock
    /// guarding [`remove_from_state`] has already been released.
    fn finish_remove(&self, sha1_key: &str) {
        let _ = crate::fs_util::delete_file(&self.paths.entry_path(sha1_key));
        self.shared
            .queue
            .push_back(Job::Append(journal::Action::Delete {
                key: sha1_key.to_string(),
            }));
    }

    /// Forces a journal compaction regardless of the redundancy counter,
    /// blocking until it completes. Mainly useful for tests that want a
    /// deterministic journal snapshot rather than waiting on the
    /// background worker's own threshold.
    pub fn compact(&self) {
        let (tx, rx) = mpsc::channel();
        self.shared.queue.push_back(Job::Compact {
            force: true,
            done: Some(tx),
        });
        let _ = rx.recv();
    }

    /// Enqueues a compaction check without blocking the caller; the
    /// worker thread decides whether the redundancy counter actually
    /// warrants one.
    fn compact_if_redundant(&self) {
        self.shared.queue.push_back(Job::Compact {
            force: false,
            done: None,
        });
    }

    fn insert_or_update(&self, sha1_key: &str, size: u64) -> bool {
        let mut state = self.shared.index.lock();
        if state.index.contains(sha1_key) {
            let old_size = state.index.update_meta(sha1_key, size).unwrap_or(0);
            state.current_size = state.current_size.saturating_sub(old_size) + size;
            state.index.promote(sha1_key);
            state.redundant_count += 1;
            true
        } else {
            state.index.insert_front(sha1_key, size);
            state.current_size += size;
            false
        }
    }

    /// Current number of cached files.
    pub fn item_count(&self) -> usize {
        self.shared.index.lock().index.len()
    }

    /// Configured maximum number of cached files.
    pub fn max_item_count(&self) -> usize {
        self.shared.config.max_item_count()
    }

    /// Current total size, in bytes, of cached files the index knows
    /// about.
    pub fn current_cache_size(&self) -> u64 {
        self.shared.index.lock().current_size
    }

    /// Configured maximum total cache size, in bytes.
    pub fn max_cache_size(&self) -> u64 {
        self.shared.config.max_cache_size()
    }

    /// The directory this cache was opened on.
    pub fn cache_dir(&self) -> &Path {
        self.shared.config.cache_dir()
    }
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        self.shared.queue.quit_blocking();
        if let Some(worker) = self.worker.take() {
            let _ = worker.handle.join();
        }
    }
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.index.lock();
        f.debug_struct("DiskCache")
            .field("cache_dir", &self.shared.config.cache_dir())
            .field("item_count", &state.index.len())
            .field("current_size", &state.current_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> DiskCacheConfig {
        DiskCacheConfig::new(dir.to_path_buf(), 1, 1 << 20, 100)
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        assert!(cache.is_initialized());

        assert!(cache.put_bytes("key", b"payload"));
        assert_eq!(cache.get_bytes("key"), Some(b"payload".to_vec()));
    }

    #[test]
    fn put_and_get_stream_through_caller_closures() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();

        assert!(cache.put("key", |file| {
            use std::io::Write;
            file.write_all(b"streamed").is_ok()
        }));

        let mut seen = Vec::new();
        let found = cache.get("key", |file| {
            use std::io::Read;
            file.read_to_end(&mut seen).is_ok()
        });
        assert!(found);
        assert_eq!(seen, b"streamed");
    }

    #[test]
    fn put_with_failing_writer_leaves_cache_untouched() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        assert!(!cache.put("key", |_file| false));
        assert_eq!(cache.item_count(), 0);
        assert!(!cache.get("key", |_file| true));
    }

    #[test]
    fn put_with_empty_key_fails_without_invoking_writer() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        let mut invoked = false;
        assert!(!cache.put("", |_file| {
            invoked = true;
            true
        }));
        assert!(!invoked);
    }

    #[test]
    fn get_on_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        assert_eq!(cache.get_bytes("nope"), None);
    }

    #[test]
    fn remove_then_get_is_none() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("key", b"payload");
        cache.remove("key");
        assert_eq!(cache.get_bytes("key"), None);
        // removing twice is fine
        cache.remove("key");
    }

    #[test]
    fn reopening_replays_existing_entries() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::new(config(dir.path())).unwrap();
            cache.put_bytes("a", b"1");
            cache.put_bytes("b", b"22");
        }
        let cache = DiskCache::new(config(dir.path())).unwrap();
        assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
        assert_eq!(cache.get_bytes("b"), Some(b"22".to_vec()));
        assert_eq!(cache.item_count(), 2);
    }

    #[test]
    fn app_version_mismatch_wipes_index_but_not_files() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::new(config(dir.path())).unwrap();
            cache.put_bytes("a", b"1");
        }
        let cfg = DiskCacheConfig::new(dir.path().to_path_buf(), 2, 1 << 20, 100);
        let cache = DiskCache::new(cfg).unwrap();
        assert_eq!(cache.item_count(), 0);
        assert_eq!(cache.get_bytes("a"), None);
    }

    #[test]
    fn eviction_respects_max_item_count() {
        let dir = tempdir().unwrap();
        let cfg = DiskCacheConfig::new(dir.path().to_path_buf(), 1, 1 << 20, 2);
        let cache = DiskCache::new(cfg).unwrap();
        cache.put_bytes("a", b"1");
        cache.put_bytes("b", b"2");
        cache.get_bytes("a");
        cache.put_bytes("c", b"3");
        cache.compact(); // barrier: waits for the worker to catch up, including eviction
        assert!(cache.item_count() <= 2);
        assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
        assert_eq!(cache.get_bytes("b"), None);
    }

    #[test]
    fn compact_preserves_entries_and_resets_counter() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("a", b"1");
        for _ in 0..5 {
            cache.put_bytes("a", b"11");
        }
        cache.compact();
        assert_eq!(cache.get_bytes("a"), Some(b"11".to_vec()));
        assert!(!cache.paths.journal_bak().exists());
        assert!(!cache.paths.journal_tmp().exists());
    }

    #[test]
    fn crash_mid_compaction_recovers_from_backup() {
        let dir = tempdir().unwrap();
        {
            let cache = DiskCache::new(config(dir.path())).unwrap();
            cache.put_bytes("a", b"1");
        }
        // simulate a crash that left journal.bak behind mid-rename
        let paths = Paths {
            dir: dir.path().to_path_buf(),
        };
        fs::copy(paths.journal(), paths.journal_bak()).unwrap();

        let cache = DiskCache::new(config(dir.path())).unwrap();
        assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
        assert!(!paths.journal_bak().exists());
    }

    #[test]
    fn concurrent_put_and_get_from_many_threads() {
        let dir = tempdir().unwrap();
        let cache = std::sync::Arc::new(DiskCache::new(config(dir.path())).unwrap());
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = std::sync::Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("key-{t}-{i}");
                    cache.put_bytes(&key, key.as_bytes());
                    let _ = cache.get_bytes(&key);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        cache.compact(); // barrier: waits for the worker to catch up, including eviction
        assert!(cache.item_count() <= cache.max_item_count());
    }
}
