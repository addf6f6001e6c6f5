//! Office PTY - Pseudo-terminal bridge
//!
//! Spawns the external CLI inside a login shell on a pseudo-terminal,
//! streams its raw output to the daemon, and keeps a bounded replay
//! buffer per session so a viewer attaching mid-run sees recent
//! scrollback instead of a blank terminal.

pub mod bridge;
pub mod command;
pub mod ring;

pub use bridge::{PtyBridge, PtyEvent};
pub use command::LaunchMode;
pub use ring::OutputRing;

use thiserror::Error;

/// Errors from PTY operations.
#[derive(Error, Debug)]
pub enum PtyError {
    /// Opening the PTY, spawning the child, or resizing failed
    #[error("PTY backend error: {0}")]
    Backend(String),

    /// Writing to or resizing a PTY failed
    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No live PTY for the session
    #[error("No PTY for session {0}")]
    NotFound(office_core::SessionId),
}
