//! Transcript file tailing and directory scanning.
//!
//! The tailer's contract is byte-offset based: every read consumes exactly
//! the range `[offset, size)`, carries any unterminated tail forward as a
//! fragment, and never re-reads consumed bytes. Change notification and a
//! fixed-interval poll both funnel into the same read path through the
//! manager actor, so redundant or concurrent triggers collapse into
//! harmless no-ops.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Stat/read failures are logged and treated as "no new data"

use crate::manager::ManagerCommand;
use notify::{RecursiveMode, Watcher};
use office_core::config::{
    FILE_WATCHER_POLL_INTERVAL, PROJECT_SCAN_INTERVAL, TRANSCRIPT_CREATE_POLL_INTERVAL,
};
use office_core::SessionId;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ============================================================================
// Incremental Reading
// ============================================================================

/// Reads all complete new lines from `path` past `offset`.
///
/// Advances `offset` to the current file size and updates `fragment` with
/// any trailing bytes not yet terminated by a newline. The fragment is
/// raw bytes and decoding happens per complete line, so a multi-byte
/// character split across two reads stays intact. Returns the complete
/// non-blank lines in file order. Errors and a file that has not grown
/// both yield an empty vec.
pub fn read_new_lines(path: &Path, offset: &mut u64, fragment: &mut Vec<u8>) -> Vec<String> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Transcript stat failed");
            return Vec::new();
        }
    };
    if size <= *offset {
        return Vec::new();
    }

    let mut buf = Vec::with_capacity((size - *offset) as usize);
    let read_result = File::open(path).and_then(|mut file| {
        file.seek(SeekFrom::Start(*offset))?;
        file.take(size - *offset).read_to_end(&mut buf)
    });
    if let Err(e) = read_result {
        debug!(path = %path.display(), error = %e, "Transcript read failed");
        return Vec::new();
    }
    *offset = size;

    let mut data = std::mem::take(fragment);
    data.extend_from_slice(&buf);

    let mut segments: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
    // The final segment has no terminating newline yet; carry it forward.
    let tail = segments.pop().unwrap_or_default();

    let lines: Vec<String> = segments
        .into_iter()
        .map(|seg| String::from_utf8_lossy(seg).into_owned())
        .filter(|line| !line.trim().is_empty())
        .collect();
    *fragment = tail.to_vec();
    lines
}

// ============================================================================
// Directory Listing
// ============================================================================

/// One transcript file found in a project directory.
#[derive(Debug, Clone)]
pub struct TranscriptFileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Lists a project directory's `.jsonl` files, most recently modified
/// first. A missing or unreadable directory yields an empty list.
pub fn list_transcripts_newest_first(project_dir: &Path) -> Vec<TranscriptFileInfo> {
    let entries = match std::fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut files: Vec<TranscriptFileInfo> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                return None;
            }
            let meta = entry.metadata().ok()?;
            Some(TranscriptFileInfo {
                path,
                size: meta.len(),
                modified: meta.modified().ok()?,
            })
        })
        .collect();

    files.sort_by(|a, b| b.modified.cmp(&a.modified));
    files
}

// ============================================================================
// Background Tasks
// ============================================================================

/// Handle for stopping a watch/poll/scan task.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
}

impl WatchHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Starts observing a transcript file for growth.
///
/// Uses native change notification where available AND an unconditional
/// fixed-interval poll; native notification can silently miss events on
/// some filesystems, so the poll always runs. Both paths send the same
/// idempotent read command.
pub fn start_watching(
    session_id: SessionId,
    path: PathBuf,
    tx: mpsc::Sender<ManagerCommand>,
) -> WatchHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let notify_tx = tx.clone();
    let watcher = notify::recommended_watcher(
        move |result: Result<notify::Event, notify::Error>| {
            if result.is_ok() {
                // Full queue is fine: the backstop poll catches up.
                let _ = notify_tx.try_send(ManagerCommand::ReadNewLines { session_id });
            }
        },
    )
    .and_then(|mut watcher| {
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    });
    let watcher = match watcher {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(session_id = %session_id, path = %path.display(), error = %e,
                "Native file watch unavailable, relying on polling");
            None
        }
    };

    tokio::spawn(async move {
        // Keeps the native watcher alive until the session stops watching.
        let _watcher = watcher;
        let mut ticker = tokio::time::interval(FILE_WATCHER_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(ManagerCommand::ReadNewLines { session_id }).await.is_err() {
                        break;
                    }
                }
            }
        }
        debug!(session_id = %session_id, "File watch task stopped");
    });

    WatchHandle { cancel }
}

/// Polls for a not-yet-existing transcript file to appear.
///
/// A freshly spawned CLI process needs a moment to create its transcript;
/// once the file exists this task reports it and exits.
pub fn poll_for_creation(
    session_id: SessionId,
    path: PathBuf,
    tx: mpsc::Sender<ManagerCommand>,
) -> WatchHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(TRANSCRIPT_CREATE_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if path.exists() {
                        let _ = tx
                            .send(ManagerCommand::TranscriptFileAppeared { session_id })
                            .await;
                        break;
                    }
                }
            }
        }
    });

    WatchHandle { cancel }
}

/// Starts the periodic listing of one project directory.
///
/// The actor consumes the ticks and decides what a newly appeared file
/// means (reassignment of the focused session vs. just marking it known).
pub fn start_project_scan(
    project_dir: PathBuf,
    tx: mpsc::Sender<ManagerCommand>,
) -> WatchHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROJECT_SCAN_INTERVAL);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let cmd = ManagerCommand::ProjectScanTick {
                        project_dir: project_dir.clone(),
                    };
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    WatchHandle { cancel }
}
