//! Construction-time error type.
//!
//! Per-operation calls (`put`/`get`/`remove`) keep a boolean/`Option`
//! contract: no error ever threads through them. Only fallible
//! *construction* (making the cache directory, spawning the background
//! worker) needs a real error type.

use std::io;

/// Failure constructing a [`crate::disk::DiskCache`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache directory could not be created or inspected.
    #[error("cache directory {path}: {source}")]
    Io {
        /// Path that the failing operation targeted.
        path: std::path::PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for construction results.
pub type Result<T> = std::result::Result<T, CacheError>;
