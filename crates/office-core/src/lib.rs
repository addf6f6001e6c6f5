//! Office Core - Shared types for agent session tracking
//!
//! This crate provides the core domain types shared between the daemon
//! (officed) and the wire protocol (office-protocol): the session entity,
//! the three-state status model, and the transcript parser.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod config;
pub mod error;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use session::{
    project_dir_for, SeatMeta, Session, SessionId, SessionStatus, ToolUseId, TranscriptPath,
};
pub use transcript::{
    needs_permission, parse_line, read_transcript, tool_status_label, EntryRole, TranscriptEntry,
    TranscriptEvent,
};
