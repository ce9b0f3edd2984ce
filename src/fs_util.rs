//! Small filesystem helpers the disk cache builds on.
//!
//! A narrow set of primitives (directory creation, existence checks,
//! atomic rename, deletion) rather than a general-purpose filesystem
//! crate; the disk cache only ever needs these few operations.

use std::fs;
use std::io;
use std::path::Path;

/// Returns `true` if `path` exists and is a directory.
pub(crate) fn dir_exists(path: &Path) -> bool {
    path.is_dir()
}

/// Returns `true` if `path` exists and is a regular file.
pub(crate) fn file_exists(path: &Path) -> bool {
    path.is_file()
}

/// Creates `path` and any missing parent directories. A no-op if `path`
/// already exists as a directory.
pub(crate) fn make_dirs(path: &Path) -> io::Result<()> {
    if dir_exists(path) {
        return Ok(());
    }
    fs::create_dir_all(path)
}

/// Deletes `path` if it exists; tolerates it already being gone.
pub(crate) fn delete_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Renames `from` to `to`, replacing `to` if it already exists. Used for
/// every crash-safe swap in the journal and the cache file write path.
pub(crate) fn rename(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// Size of the file at `path` in bytes.
pub(crate) fn file_size(path: &Path) -> io::Result<u64> {
    fs::metadata(path).map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn make_dirs_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        make_dirs(&nested).unwrap();
        assert!(dir_exists(&nested));
        make_dirs(&nested).unwrap();
    }

    #[test]
    fn delete_file_tolerates_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(delete_file(&missing).is_ok());
    }

    #[test]
    fn rename_replaces_existing_target() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"from").unwrap();
        fs::write(&b, b"to").unwrap();
        rename(&a, &b).unwrap();
        assert!(!file_exists(&a));
        assert_eq!(fs::read(&b).unwrap(), b"from");
    }
}
