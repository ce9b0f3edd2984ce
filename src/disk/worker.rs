//! The single background thread that owns the journal file handle and
//! performs every write to it, so concurrent callers never race on the
//! file itself. Callers only ever enqueue [`Job`]s; the worker drains them
//! one at a time, in order.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::journal;
use super::{Paths, Shared};
use crate::RETAIN_RATIO;

/// Work handed to the background thread. Kept as a closed enum rather
/// than boxed closures so the worker loop stays a plain match and every
/// variant's cost is visible at the call site that enqueues it.
pub(super) enum Job {
    /// Read (or initialize) the journal and populate the shared index.
    /// Always the first job the worker processes.
    InitFromJournal,
    /// Append one action line to the journal.
    Append(journal::Action),
    /// Compact the journal down to a fresh baseline. Skipped unless
    /// `force` is set or the redundancy counter is still over threshold
    /// by the time this job is reached (an intervening compaction may
    /// have already cleared it). The sender, if present, is notified once
    /// this job finishes regardless of whether compaction actually ran,
    /// so a caller waiting on [`super::DiskCache::compact`] is never left
    /// blocked.
    Compact { force: bool, done: Option<Sender<()>> },
}

pub(super) struct Worker {
    pub(super) handle: JoinHandle<()>,
}

pub(super) fn spawn(shared: Arc<Shared>, paths: Paths) -> Worker {
    let handle = std::thread::Builder::new()
        .name("haven-cache-disk-worker".into())
        .spawn(move || run(shared, paths))
        .expect("failed to spawn disk cache worker thread");
    Worker { handle }
}

fn run(shared: Arc<Shared>, paths: Paths) {
    let mut journal_file: Option<File> = None;

    while let Some(job) = shared.queue.pop_front() {
        match job {
            Job::InitFromJournal => {
                log::trace!("InitFromJournal: starting replay");
                journal_file = Some(init_from_journal(&shared, &paths));
                let mut ready = shared.ready.lock().unwrap();
                *ready = true;
                shared.ready_cv.notify_all();
                log::trace!("InitFromJournal: replay complete, cache ready");
            }
            Job::Append(action) => {
                log::trace!("processing journal append: {}", action.format());
                let Some(file) = journal_file.as_mut() else {
                    log::warn!("dropping journal append before init completed");
                    continue;
                };
                let is_update = matches!(action, journal::Action::Update { .. });
                if let Err(e) = writeln!(file, "{}", action.format()) {
                    log::error!("failed to append journal action: {e}");
                } else if is_update {
                    evict_if_needed(&shared, &paths, file);
                }
            }
            Job::Compact { force, done } => {
                let needs_compaction = force || {
                    let state = shared.index.lock();
                    state.redundant_count >= super::REDUNDANCY_COMPACTION_THRESHOLD
                };
                if needs_compaction {
                    log::debug!("compacting journal (force={force})");
                    match compact(&shared, &paths) {
                        Ok(new_file) => {
                            log::debug!("journal compaction finished");
                            journal_file = Some(new_file);
                        }
                        Err(e) => log::error!("journal compaction failed: {e}"),
                    }
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
        }
    }

    log::debug!("disk cache worker thread exiting");
}

/// Evicts entries from the tail of the index once either bound is over
/// budget, run inline after a `U` append while the worker already holds
/// the journal file open. Deletes each victim's file and appends its own
/// `D` line directly to `journal_file`, skipping the queue entirely since
/// the worker is the only thread that ever touches that handle.
fn evict_if_needed(shared: &Arc<Shared>, paths: &Paths, journal_file: &mut File) {
    let victims = {
        let mut state = shared.index.lock();
        if state.current_size <= shared.config.max_cache_size()
            && state.index.len() <= shared.config.max_item_count()
        {
            return;
        }

        let target_size = (shared.config.max_cache_size() as f64 * RETAIN_RATIO) as u64;
        let target_items = (shared.config.max_item_count() as f64 * RETAIN_RATIO) as usize;

        let mut victims = Vec::new();
        while state.current_size > target_size || state.index.len() > target_items {
            let Some((key, size)) = state.index.pop_back() else {
                break;
            };
            state.current_size = state.current_size.saturating_sub(size);
            victims.push(String::from(key));
        }
        victims
    };

    for key in victims {
        log::trace!("evicting {key}");
        let _ = crate::fs_util::delete_file(&paths.entry_path(&key));
        if let Err(e) = writeln!(journal_file, "{}", journal::Action::Delete { key }.format()) {
            log::error!("failed to append eviction journal line: {e}");
        }
    }
}

/// Recovers from a crash mid-compaction, replays (or resets) the journal,
/// and leaves it open in append mode.
fn init_from_journal(shared: &Arc<Shared>, paths: &Paths) -> File {
    if paths.journal_bak().exists() {
        log::warn!("found leftover journal.bak, resuming interrupted compaction");
        let _ = crate::fs_util::rename(&paths.journal_bak(), &paths.journal());
    }

    let header_and_body = File::open(paths.journal()).ok().and_then(|f| {
        let mut reader = BufReader::new(f);
        let header = journal::read_header(&mut reader).ok()??;
        Some((header, reader))
    });

    let (index, redundant_count, current_size) = match header_and_body {
        Some((header, mut reader)) if header.app_version == shared.config.app_version() => {
            let mut lines = Vec::new();
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => lines.push(line),
                    Err(e) => {
                        log::error!("error reading journal, stopping replay early: {e}");
                        break;
                    }
                }
            }
            let replayed = journal::replay(lines.into_iter());
            let total_size: u64 = replayed.index.iter_mru_to_lru().map(|(_, size)| *size).sum();
            (replayed.index, replayed.redundant_count, total_size)
        }
        Some((header, _)) => {
            log::warn!(
                "journal app_version mismatch ({} != {}), discarding index",
                header.app_version,
                shared.config.app_version()
            );
            (crate::list::LruIndex::new(), 0, 0)
        }
        None => (crate::list::LruIndex::new(), 0, 0),
    };

    {
        let mut state = shared.index.lock();
        state.index = index;
        state.redundant_count = redundant_count;
        state.current_size = current_size;
    }

    reopen_fresh(paths, shared.config.app_version())
}

/// Writes a brand new journal with a current header and no body, for
/// both first-run initialization and after any compaction.
fn reopen_fresh(paths: &Paths, app_version: i64) -> File {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(paths.journal())
        .expect("failed to create journal file");
    journal::write_header(&mut file, app_version).expect("failed to write journal header");
    drop(file);
    OpenOptions::new()
        .append(true)
        .open(paths.journal())
        .expect("failed to reopen journal file for append")
}

/// The crash-safe rename dance: write the compacted journal to a temp
/// file, then swap it in via a backup rename so a crash at any point
/// leaves either the old or the new journal intact, never a half-written
/// one in place.
fn compact(shared: &Arc<Shared>, paths: &Paths) -> std::io::Result<File> {
    let (entries, app_version) = {
        let mut state = shared.index.lock();
        let entries: Vec<(String, u64)> = state
            .index
            .iter_mru_to_lru()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        state.redundant_count = 0;
        (entries, shared.config.app_version())
    };

    let tmp_path = paths.journal_tmp();
    let mut tmp = File::create(&tmp_path)?;
    journal::write_header(&mut tmp, app_version)?;
    // Oldest (LRU) first so replay order still ends with the same
    // most-recently-used entry at the front.
    for (key, size) in entries.into_iter().rev() {
        writeln!(
            tmp,
            "{}",
            journal::Action::Update { key, size }.format()
        )?;
    }
    tmp.sync_all()?;
    drop(tmp);

    let bak_path = paths.journal_bak();
    let journal_path = paths.journal();
    if bak_path.exists() {
        crate::fs_util::delete_file(&bak_path)?;
    }
    if journal_path.exists() {
        crate::fs_util::rename(&journal_path, &bak_path)?;
    }
    crate::fs_util::rename(&tmp_path, &journal_path)?;
    crate::fs_util::delete_file(&bak_path)?;

    OpenOptions::new().append(true).open(&journal_path)
}
