//! Discovery of externally started CLI processes.
//!
//! When the first UI client connects, the daemon looks for `claude`
//! processes it did not launch itself and adopts their conversations so
//! they show up alongside daemon-launched sessions. Discovery is process
//! table based: each running process contributes one adoption slot in its
//! project directory, and the actor fills the slots with that directory's
//! most recent untracked transcript files.

use office_core::project_dir_for;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One project directory with externally running CLI processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdoptionCandidate {
    /// Working directory of the processes (for spawning a resume PTY)
    pub cwd: PathBuf,
    /// Number of running processes, i.e. how many transcripts to adopt
    pub process_count: usize,
}

/// Scans the process table for running `claude` processes, grouped by
/// the project directory derived from each process's working directory.
#[cfg(unix)]
pub fn discover_external_processes() -> HashMap<PathBuf, AdoptionCandidate> {
    use sysinfo::{ProcessRefreshKind, RefreshKind, System, UpdateKind};

    let sys = System::new_with_specifics(
        RefreshKind::new()
            .with_processes(ProcessRefreshKind::new().with_cwd(UpdateKind::Always)),
    );

    let mut candidates: HashMap<PathBuf, AdoptionCandidate> = HashMap::new();
    for process in sys.processes().values() {
        if process.name() != "claude" {
            continue;
        }
        let Some(cwd) = process.cwd() else {
            continue;
        };
        let Some(project_dir) = project_dir_for(cwd) else {
            continue;
        };
        candidates
            .entry(project_dir)
            .and_modify(|candidate| candidate.process_count += 1)
            .or_insert_with(|| AdoptionCandidate {
                cwd: cwd.to_path_buf(),
                process_count: 1,
            });
    }
    candidates
}

/// Process-table scanning is not supported off unix; nothing is adopted.
#[cfg(not(unix))]
pub fn discover_external_processes() -> HashMap<PathBuf, AdoptionCandidate> {
    HashMap::new()
}

/// Returns true if the transcript contains at least one conversation
/// record (user or assistant). Files holding only housekeeping records,
/// like file-history snapshots, are not worth adopting.
pub fn has_conversation(path: &Path) -> bool {
    let Ok(file) = std::fs::File::open(path) else {
        return false;
    };
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else {
            return false;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };
        match value.get("type").and_then(|t| t.as_str()) {
            Some("user") | Some("assistant") => return true,
            _ => {}
        }
    }
    false
}
