//! Manager actor commands and errors.
//!
//! This module defines the message types for communicating with the
//! `ManagerActor`: commands sent by clients (via `ManagerHandle`) and by
//! the daemon's own background tasks (tailers, timers, PTY readers, project
//! scans). Everything that mutates session state arrives here, so the
//! actor's receive loop is the single serialization point.

use office_core::{SeatMeta, SessionId};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::oneshot;

/// Which per-session debounce timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Idle debounce: no activity and no open tools
    Waiting,
    /// Permission debounce: a confirmation-requiring tool is pending
    Permission,
}

/// Commands processed by the manager actor.
#[derive(Debug)]
pub enum ManagerCommand {
    /// Launch a new CLI session.
    Launch {
        /// Working directory; the daemon's default when `None`
        cwd: Option<PathBuf>,
        /// Bind to the most recent existing conversation instead of a
        /// fresh one
        continue_session: bool,
    },

    /// Close a session and tear down all of its resources. No-op for
    /// unknown ids.
    Close { session_id: SessionId },

    /// Mark a session as focused (eligible for transcript reassignment).
    Focus { session_id: SessionId },

    /// A UI client finished loading. Triggers one-time adoption of
    /// externally started CLI processes plus a full state snapshot.
    ClientReady,

    /// Send the full parsed transcript history for a session.
    RequestTranscript { session_id: SessionId },

    /// Persist seat/appearance metadata.
    SaveSeats { seats: HashMap<String, SeatMeta> },

    /// Keystrokes for a session's terminal.
    TerminalInput { session_id: SessionId, data: String },

    /// Viewer terminal resize.
    TerminalResize {
        session_id: SessionId,
        cols: u16,
        rows: u16,
    },

    /// Consume any new bytes from a session's transcript file. Sent by
    /// both the change watcher and the backstop poll; safe to deliver
    /// redundantly.
    ReadNewLines { session_id: SessionId },

    /// The transcript file a freshly launched session is waiting for now
    /// exists on disk.
    TranscriptFileAppeared { session_id: SessionId },

    /// Periodic listing tick for one project directory.
    ProjectScanTick { project_dir: PathBuf },

    /// A debounce timer fired. `generation` identifies the arm that
    /// scheduled it; stale fires are dropped.
    TimerFired {
        session_id: SessionId,
        kind: TimerKind,
        generation: u64,
    },

    /// Stop everything and exit the actor loop.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Errors surfaced by the manager handle.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    /// The actor has shut down and its channel is closed.
    #[error("manager channel closed")]
    ChannelClosed,
}
