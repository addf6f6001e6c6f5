//! Live PTY sessions keyed by session id.

use crate::command::{build_command, LaunchMode};
use crate::ring::OutputRing;
use crate::PtyError;
use office_core::config::{PTY_BUFFER_MAX_BYTES, PTY_INITIAL_COLS, PTY_INITIAL_ROWS};
use office_core::SessionId;
use portable_pty::{native_pty_system, ChildKiller, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Output and lifecycle notifications from PTY reader threads.
#[derive(Debug)]
pub enum PtyEvent {
    /// Raw bytes read from a session's terminal
    Output { id: SessionId, data: Vec<u8> },

    /// The child process exited on its own
    Exited { id: SessionId },
}

struct PtyHandle {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    ring: Arc<Mutex<OutputRing>>,
}

/// All live PTYs for the daemon.
///
/// Owned by the manager task; only the reader threads run outside it,
/// and they share nothing but the replay ring and the event sender.
pub struct PtyBridge {
    sessions: HashMap<SessionId, PtyHandle>,
    events: mpsc::UnboundedSender<PtyEvent>,
}

impl PtyBridge {
    /// Creates a bridge that delivers output/exit events on `events`.
    pub fn new(events: mpsc::UnboundedSender<PtyEvent>) -> Self {
        Self {
            sessions: HashMap::new(),
            events,
        }
    }

    /// Spawns the CLI on a fresh PTY for `id`.
    ///
    /// On success a reader thread streams output into the replay ring and
    /// the event channel, and a second thread reports child exit. Spawn
    /// failure leaves no state behind; the session simply has no terminal.
    pub fn spawn(&mut self, id: SessionId, cwd: &Path, mode: &LaunchMode) -> Result<(), PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_INITIAL_ROWS,
                cols: PTY_INITIAL_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Backend(e.to_string()))?;

        let cmd = build_command(cwd, mode);
        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Backend(e.to_string()))?;
        let killer = child.clone_killer();

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Backend(e.to_string()))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Backend(e.to_string()))?;

        let ring = Arc::new(Mutex::new(OutputRing::new(PTY_BUFFER_MAX_BYTES)));

        let ring_for_reader = Arc::clone(&ring);
        let events_for_reader = self.events.clone();
        std::thread::spawn(move || {
            read_loop(id, reader, ring_for_reader, events_for_reader);
        });

        let events_for_exit = self.events.clone();
        std::thread::spawn(move || {
            let status = child.wait();
            debug!(session_id = %id, status = ?status, "PTY child exited");
            let _ = events_for_exit.send(PtyEvent::Exited { id });
        });

        info!(session_id = %id, mode = ?mode, "PTY spawned");
        self.sessions.insert(
            id,
            PtyHandle {
                master: pair.master,
                writer,
                killer,
                ring,
            },
        );
        Ok(())
    }

    /// Writes keystrokes to a session's terminal.
    pub fn write(&mut self, id: SessionId, data: &[u8]) -> Result<(), PtyError> {
        let handle = self.sessions.get_mut(&id).ok_or(PtyError::NotFound(id))?;
        handle.writer.write_all(data)?;
        handle.writer.flush()?;
        Ok(())
    }

    /// Resizes a session's terminal.
    pub fn resize(&mut self, id: SessionId, cols: u16, rows: u16) -> Result<(), PtyError> {
        let handle = self.sessions.get(&id).ok_or(PtyError::NotFound(id))?;
        handle
            .master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Backend(e.to_string()))
    }

    /// Kills a session's child process and drops its handle. No-op for
    /// unknown ids and for sessions whose child already exited.
    pub fn kill(&mut self, id: SessionId) {
        if let Some(mut handle) = self.sessions.remove(&id) {
            if let Err(e) = handle.killer.kill() {
                debug!(session_id = %id, error = %e, "PTY kill (already gone?)");
            }
        }
    }

    /// Drops the handle for a session whose child exited on its own.
    pub fn forget(&mut self, id: SessionId) {
        self.sessions.remove(&id);
    }

    /// Returns true if a live PTY exists for the session.
    pub fn has_session(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Returns the buffered scrollback for replay, if a PTY exists.
    pub fn buffer_snapshot(&self, id: SessionId) -> Option<Vec<u8>> {
        self.sessions.get(&id).map(|handle| {
            handle
                .ring
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .snapshot()
        })
    }

    /// Kills every live PTY. Used at daemon shutdown.
    pub fn dispose_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.kill(id);
        }
    }
}

fn read_loop(
    id: SessionId,
    mut reader: Box<dyn Read + Send>,
    ring: Arc<Mutex<OutputRing>>,
    events: mpsc::UnboundedSender<PtyEvent>,
) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let data = match buf.get(..n) {
                    Some(data) => data.to_vec(),
                    None => break,
                };
                ring.lock().unwrap_or_else(|e| e.into_inner()).push(&data);
                if events.send(PtyEvent::Output { id, data }).is_err() {
                    // Daemon is shutting down
                    break;
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "PTY read error");
                break;
            }
        }
    }
    debug!(session_id = %id, "PTY reader finished");
}
