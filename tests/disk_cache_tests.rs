//! End-to-end scenarios for the disk cache: replay across restarts,
//! recovery from a malformed or mid-compaction journal, and the
//! compaction threshold itself.

use haven_cache::{DiskCache, DiskCacheConfig};
use std::fs;
use std::io::Write;
use tempfile::tempdir;

fn config(dir: &std::path::Path) -> DiskCacheConfig {
    DiskCacheConfig::new(dir.to_path_buf(), 1, 10_000, 100)
}

#[test]
fn scenario_disk_cache_replay_preserves_mru_order() {
    let dir = tempdir().unwrap();
    {
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("k1", b"hello");
        cache.put_bytes("k2", b"world");
        cache.get_bytes("k1");
    }

    let cache = DiskCache::new(config(dir.path())).unwrap();
    assert_eq!(cache.item_count(), 2);
    assert_eq!(cache.get_bytes("k1"), Some(b"hello".to_vec()));
    assert_eq!(cache.get_bytes("k2"), Some(b"world".to_vec()));
}

#[test]
fn scenario_header_mismatch_wipes_index_but_leaves_orphan_files() {
    let dir = tempdir().unwrap();
    {
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("a", b"1");
        cache.put_bytes("b", b"2");
        cache.put_bytes("c", b"3");
        assert_eq!(cache.item_count(), 3);
    }

    let journal_path = dir.path().join("journal");
    let contents = fs::read_to_string(&journal_path).unwrap();
    let mut lines: Vec<&str> = contents.lines().collect();
    lines[2] = "999";
    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    fs::write(&journal_path, rewritten).unwrap();

    let cache = DiskCache::new(config(dir.path())).unwrap();
    assert_eq!(cache.item_count(), 0);
    assert_eq!(cache.get_bytes("a"), None);

    // the files themselves are untouched orphans
    let entries_on_disk = walk_entry_files(dir.path());
    assert_eq!(entries_on_disk, 3);

    // and the cache now has a fresh, header-only journal
    let fresh = fs::read_to_string(&journal_path).unwrap();
    assert_eq!(fresh.lines().count(), 4);
}

#[test]
fn scenario_compaction_threshold_reduces_journal_to_baseline() {
    let dir = tempdir().unwrap();
    let cache = DiskCache::new(config(dir.path())).unwrap();
    cache.put_bytes("a", b"1");
    cache.put_bytes("b", b"2");
    cache.put_bytes("c", b"3");

    for _ in 0..2100 {
        cache.get_bytes("a");
    }

    // the background worker may still be draining the queue; give it a
    // moment, then force a compaction explicitly for a deterministic check.
    cache.compact();

    let journal_path = dir.path().join("journal");
    let contents = fs::read_to_string(&journal_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4 + 3);
    assert!(lines[4..].iter().all(|l| l.starts_with('U')));

    assert_eq!(cache.item_count(), 3);
    assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
}

#[test]
fn scenario_crash_mid_compaction_recovers_pre_compaction_state() {
    let dir = tempdir().unwrap();
    {
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("a", b"1");
        cache.put_bytes("b", b"22");
    }

    // simulate the crash window between "rename journal -> journal.bak"
    // and "rename journal.tmp -> journal": journal.bak holds the old
    // state, journal.tmp never made it, and journal itself is gone.
    let journal_path = dir.path().join("journal");
    let bak_path = dir.path().join("journal.bak");
    fs::rename(&journal_path, &bak_path).unwrap();

    let cache = DiskCache::new(config(dir.path())).unwrap();
    assert!(!bak_path.exists());
    assert_eq!(cache.item_count(), 2);
    assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
    assert_eq!(cache.get_bytes("b"), Some(b"22".to_vec()));
}

#[test]
fn malformed_trailing_journal_line_is_skipped_on_replay() {
    let dir = tempdir().unwrap();
    {
        let cache = DiskCache::new(config(dir.path())).unwrap();
        cache.put_bytes("a", b"1");
    }

    let journal_path = dir.path().join("journal");
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&journal_path)
        .unwrap();
    writeln!(file, "not a valid action line").unwrap();
    drop(file);

    let cache = DiskCache::new(config(dir.path())).unwrap();
    assert_eq!(cache.item_count(), 1);
    assert_eq!(cache.get_bytes("a"), Some(b"1".to_vec()));
}

#[test]
fn sha1_prefix_collisions_share_a_directory_without_corruption() {
    // exercises two keys landing in the same two-hex-char subdirectory;
    // real sha1 outputs do this roughly every 256 keys, but we don't
    // depend on finding a real collision here, only on the directory
    // layout tolerating two distinct files sharing a parent.
    let dir = tempdir().unwrap();
    let cache = DiskCache::new(config(dir.path())).unwrap();
    for i in 0..300 {
        let key = format!("key-{i}");
        assert!(cache.put_bytes(&key, key.as_bytes()));
    }
    for i in 0..300 {
        let key = format!("key-{i}");
        assert_eq!(cache.get_bytes(&key), Some(key.as_bytes().to_vec()));
    }
}

fn walk_entry_files(cache_dir: &std::path::Path) -> usize {
    let mut count = 0;
    for entry in fs::read_dir(cache_dir).unwrap().flatten() {
        if entry.file_type().unwrap().is_dir() {
            count += fs::read_dir(entry.path()).unwrap().flatten().count();
        }
    }
    count
}
