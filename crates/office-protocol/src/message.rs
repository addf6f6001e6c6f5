//! Protocol message types for UI client communication.

use office_core::{SeatMeta, SessionId, ToolUseId, TranscriptEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Error decoding an inbound protocol line.
#[derive(Error, Debug)]
#[error("Invalid client command: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Commands sent by UI clients to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientCommand {
    /// Client finished loading and is ready for session state
    ClientReady,

    /// Launch a new agent session
    #[serde(rename_all = "camelCase")]
    OpenSession {
        /// Working directory; daemon default when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        /// Continue the most recent conversation instead of starting fresh
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continue_session: Option<bool>,
    },

    /// Mark a session as the focused one
    FocusSession { id: SessionId },

    /// Close a session and kill its terminal
    CloseSession { id: SessionId },

    /// Persist seat/appearance metadata keyed by session id
    SaveSeats { seats: HashMap<String, SeatMeta> },

    /// Request the full parsed history for a session
    RequestTranscript { id: SessionId },

    /// Keystrokes for a session's terminal
    TerminalInput { id: SessionId, data: String },

    /// Viewer terminal was resized
    TerminalResize { id: SessionId, cols: u16, rows: u16 },
}

impl ClientCommand {
    /// Decodes one newline-delimited JSON line from a client.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Events sent from the daemon to all connected UI clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A session was launched or adopted
    #[serde(rename_all = "camelCase")]
    SessionCreated { id: SessionId, has_pty: bool },

    /// A session was closed or its process exited
    SessionClosed { id: SessionId },

    /// Snapshot of all tracked sessions, sent on client ready
    ExistingSessions {
        sessions: Vec<SessionId>,
        seats: HashMap<String, SeatMeta>,
    },

    /// A tool invocation started
    #[serde(rename_all = "camelCase")]
    ToolStart {
        id: SessionId,
        tool_id: ToolUseId,
        /// Display label, e.g. "Bash: cargo check"
        status: String,
    },

    /// A tool invocation finished
    #[serde(rename_all = "camelCase")]
    ToolDone { id: SessionId, tool_id: ToolUseId },

    /// A permission prompt is the likely blocker for this session
    ToolPermission { id: SessionId },

    /// New activity cleared a previously reported permission prompt
    ToolPermissionClear { id: SessionId },

    /// Idle/active status change ("waiting" or "active")
    SessionStatus { id: SessionId, status: String },

    /// Full parsed history response to a transcript request
    #[serde(rename_all = "camelCase")]
    TranscriptData {
        id: SessionId,
        entries: Vec<TranscriptEntry>,
        transcript_file: String,
        has_pty: bool,
        /// Buffered live terminal output for replay, when a PTY exists
        #[serde(skip_serializing_if = "Option::is_none")]
        pty_buffer: Option<String>,
        cwd: String,
    },

    /// Raw terminal output bytes (lossy UTF-8)
    TerminalOutput { id: SessionId, data: String },
}

impl ServerEvent {
    /// Creates a session created event.
    pub fn session_created(id: SessionId, has_pty: bool) -> Self {
        Self::SessionCreated { id, has_pty }
    }

    /// Creates a session closed event.
    pub fn session_closed(id: SessionId) -> Self {
        Self::SessionClosed { id }
    }

    /// Creates an existing sessions snapshot.
    pub fn existing_sessions(sessions: Vec<SessionId>, seats: HashMap<String, SeatMeta>) -> Self {
        Self::ExistingSessions { sessions, seats }
    }

    /// Creates a tool start event.
    pub fn tool_start(id: SessionId, tool_id: ToolUseId, status: String) -> Self {
        Self::ToolStart { id, tool_id, status }
    }

    /// Creates a tool done event.
    pub fn tool_done(id: SessionId, tool_id: ToolUseId) -> Self {
        Self::ToolDone { id, tool_id }
    }

    /// Creates a permission pending event.
    pub fn tool_permission(id: SessionId) -> Self {
        Self::ToolPermission { id }
    }

    /// Creates a permission cleared event.
    pub fn tool_permission_clear(id: SessionId) -> Self {
        Self::ToolPermissionClear { id }
    }

    /// Creates a waiting-status event.
    pub fn waiting(id: SessionId) -> Self {
        Self::SessionStatus {
            id,
            status: "waiting".to_string(),
        }
    }

    /// Creates an active-status event.
    pub fn active(id: SessionId) -> Self {
        Self::SessionStatus {
            id,
            status: "active".to_string(),
        }
    }

    /// Creates a terminal output event from raw PTY bytes.
    pub fn terminal_output(id: SessionId, bytes: &[u8]) -> Self {
        Self::TerminalOutput {
            id,
            data: String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_decoding() {
        let cmd = ClientCommand::decode(
            r#"{"type":"openSession","cwd":"/home/user/proj","continueSession":true}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::OpenSession {
                cwd,
                continue_session,
            } => {
                assert_eq!(cwd.as_deref(), Some("/home/user/proj"));
                assert_eq!(continue_session, Some(true));
            }
            other => panic!("Expected OpenSession, got {other:?}"),
        }
    }

    #[test]
    fn test_client_command_minimal_open() {
        let cmd = ClientCommand::decode(r#"{"type":"openSession"}"#).unwrap();
        match cmd {
            ClientCommand::OpenSession {
                cwd,
                continue_session,
            } => {
                assert!(cwd.is_none());
                assert!(continue_session.is_none());
            }
            other => panic!("Expected OpenSession, got {other:?}"),
        }
    }

    #[test]
    fn test_client_command_terminal_resize() {
        let cmd =
            ClientCommand::decode(r#"{"type":"terminalResize","id":3,"cols":132,"rows":40}"#)
                .unwrap();
        match cmd {
            ClientCommand::TerminalResize { id, cols, rows } => {
                assert_eq!(id, SessionId::new(3));
                assert_eq!((cols, rows), (132, 40));
            }
            other => panic!("Expected TerminalResize, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_command_rejected() {
        assert!(ClientCommand::decode("garbage").is_err());
        assert!(ClientCommand::decode(r#"{"type":"unknownThing"}"#).is_err());
    }

    #[test]
    fn test_server_event_camel_case_tags() {
        let json =
            serde_json::to_string(&ServerEvent::session_created(SessionId::new(1), true)).unwrap();
        assert!(json.contains("\"type\":\"sessionCreated\""));
        assert!(json.contains("\"hasPty\":true"));

        let json = serde_json::to_string(&ServerEvent::tool_start(
            SessionId::new(2),
            ToolUseId::new("toolu_9"),
            "Bash: ls".to_string(),
        ))
        .unwrap();
        assert!(json.contains("\"type\":\"toolStart\""));
        assert!(json.contains("\"toolId\":\"toolu_9\""));
    }

    #[test]
    fn test_status_event_labels() {
        let json = serde_json::to_string(&ServerEvent::waiting(SessionId::new(5))).unwrap();
        assert!(json.contains("\"status\":\"waiting\""));
        let json = serde_json::to_string(&ServerEvent::active(SessionId::new(5))).unwrap();
        assert!(json.contains("\"status\":\"active\""));
    }

    #[test]
    fn test_transcript_data_omits_absent_buffer() {
        let event = ServerEvent::TranscriptData {
            id: SessionId::new(1),
            entries: Vec::new(),
            transcript_file: "/tmp/a.jsonl".to_string(),
            has_pty: false,
            pty_buffer: None,
            cwd: "/tmp".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("ptyBuffer"));
        assert!(json.contains("\"transcriptFile\":\"/tmp/a.jsonl\""));
    }

    #[test]
    fn test_terminal_output_lossy_utf8() {
        let event = ServerEvent::terminal_output(SessionId::new(1), &[0x68, 0x69, 0xFF]);
        match event {
            ServerEvent::TerminalOutput { data, .. } => {
                assert!(data.starts_with("hi"));
            }
            other => panic!("Expected TerminalOutput, got {other:?}"),
        }
    }
}
