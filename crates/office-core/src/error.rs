//! Domain-specific error types following panic-free policy.

use crate::SessionId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone)]
pub enum DomainError {
    /// Session not found in the session table
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    /// A session is already bound to this transcript file
    #[error("Transcript already tracked: {path}")]
    TranscriptAlreadyTracked { path: String },

    /// The working directory could not be mapped to a transcript directory
    #[error("No transcript directory for working directory: {cwd}")]
    NoProjectDir { cwd: String },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
