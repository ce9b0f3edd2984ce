//! The on-disk journal format: a small header identifying the format and
//! the caller's app version, followed by one append-only action line per
//! `put`/`remove`/`get`.
//!
//! A journal line is folded into the in-memory index the same way whether
//! it is read back at startup or as it is written live, which is what lets
//! [`replay`] double as both the boot-time recovery path and (conceptually)
//! the definition of what an action line means.

use std::io::{self, BufRead, Write};

use crate::list::LruIndex;

const MAGIC: &str = "neevek_disklru";
const FORMAT_VERSION: &str = "1.0.0";

/// The four header lines that open every journal file.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) app_version: i64,
}

/// Writes the magic string, format version, app version, and the blank
/// line that terminates the header.
pub(crate) fn write_header(writer: &mut impl Write, app_version: i64) -> io::Result<()> {
    writeln!(writer, "{MAGIC}")?;
    writeln!(writer, "{FORMAT_VERSION}")?;
    writeln!(writer, "{app_version}")?;
    writeln!(writer)?;
    Ok(())
}

/// Reads and validates the four header lines. Returns `Ok(None)` for
/// anything that is not a well-formed, current-format header: a missing
/// file, a magic/version mismatch, or a non-numeric app version line all
/// collapse to "no usable header", which callers treat as an incompatible
/// journal to be discarded and restarted.
pub(crate) fn read_header(reader: &mut impl BufRead) -> io::Result<Option<Header>> {
    let mut lines = [String::new(), String::new(), String::new(), String::new()];
    for line in &mut lines {
        let n = reader.read_line(line)?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
    }

    if lines[0] != MAGIC || lines[1] != FORMAT_VERSION {
        return Ok(None);
    }
    let Ok(app_version) = lines[2].parse::<i64>() else {
        return Ok(None);
    };
    if !lines[3].is_empty() {
        return Ok(None);
    }

    Ok(Some(Header { app_version }))
}

/// A single append-only journal action.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Action {
    /// A file was written or overwritten.
    Update { key: String, size: u64 },
    /// A file was removed.
    Delete { key: String },
    /// A file was read (access-order bump only, no size change).
    Read { key: String },
}

impl Action {
    pub(crate) fn format(&self) -> String {
        match self {
            Action::Update { key, size } => format!("U {key} {size}"),
            Action::Delete { key } => format!("D {key}"),
            Action::Read { key } => format!("R {key}"),
        }
    }
}

/// Parses one action line, ignoring a trailing newline if present. Lines
/// that don't match a known action are skipped by the caller rather than
/// treated as fatal, so a partially written final line from a crash mid
/// append doesn't take down the whole journal.
pub(crate) fn parse_line(line: &str) -> Option<Action> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut parts = line.split(' ');
    match parts.next()? {
        "U" => {
            let key = parts.next()?.to_string();
            let size: u64 = parts.next()?.parse().ok()?;
            if parts.next().is_some() {
                return None;
            }
            Some(Action::Update { key, size })
        }
        "D" => {
            let key = parts.next()?.to_string();
            if parts.next().is_some() {
                return None;
            }
            Some(Action::Delete { key })
        }
        "R" => {
            let key = parts.next()?.to_string();
            if parts.next().is_some() {
                return None;
            }
            Some(Action::Read { key })
        }
        _ => None,
    }
}

/// The outcome of folding a journal's action lines into an index.
pub(crate) struct Replayed {
    pub(crate) index: LruIndex<u64>,
    /// A `U` only counts as redundant when it targets a key already
    /// present — the *first* `U` for a key appends a line without being
    /// redundant. Every `D` and every `R` counts unconditionally, whether
    /// or not the key it names is still there to act on, so a journal
    /// dominated by reads or repeat deletes still trips compaction from
    /// volume alone.
    pub(crate) redundant_count: u64,
}

/// Folds a sequence of already-parsed action lines into a fresh index, in
/// the order they appear. A `U` on a new key inserts at the front; a `U`
/// on an existing key overwrites its size and moves it to the front; a
/// `D` removes; an `R` promotes without touching size. Unparseable lines
/// are logged and dropped rather than treated as fatal.
pub(crate) fn replay(lines: impl Iterator<Item = String>) -> Replayed {
    let mut index = LruIndex::new();
    let mut redundant_count = 0u64;

    for line in lines {
        let Some(action) = parse_line(&line) else {
            log::warn!("skipping malformed journal line: {line:?}");
            continue;
        };
        match action {
            Action::Update { key, size } => {
                if index.contains(&key) {
                    index.update_meta(&key, size);
                    index.promote(&key);
                    redundant_count += 1;
                } else {
                    index.insert_front(&key, size);
                }
            }
            Action::Delete { key } => {
                index.remove(&key);
                redundant_count += 1;
            }
            Action::Read { key } => {
                index.promote(&key);
                redundant_count += 1;
            }
        }
    }

    Replayed {
        index,
        redundant_count,
    }
}
