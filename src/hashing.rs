//! Maps a caller-supplied cache key to the 40 hex character SHA-1 digest
//! used as the on-disk file name.

use sha1::{Digest, Sha1};

/// Computes the lowercase hex SHA-1 digest of `key`.
pub(crate) fn sha1_hex(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(40);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
