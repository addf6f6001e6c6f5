//! Session domain entities and value objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Process-local identifier for a tracked agent session.
///
/// Small positive integer, assigned monotonically starting at 1 and never
/// reused while the daemon lives. Distinct from the external CLI's own
/// UUID session identifier, which names the transcript file instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(u32);

impl SessionId {
    /// Creates a SessionId from a raw integer.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SessionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Unique identifier for a tool invocation.
///
/// Format: "toolu_..." (e.g., "toolu_01ABC123XYZ"), taken verbatim from
/// `tool_use` blocks in the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolUseId(String);

impl ToolUseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ToolUseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ToolUseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ToolUseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Path to a session's transcript JSONL file.
///
/// Example: "/home/user/.claude/projects/-home-user-proj/<uuid>.jsonl"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranscriptPath(PathBuf);

impl TranscriptPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Returns the filename portion of the path.
    pub fn filename(&self) -> Option<&str> {
        self.0.file_name().and_then(|n| n.to_str())
    }

    /// Returns the CLI session identifier encoded in the filename
    /// (e.g. "abc123.jsonl" -> "abc123").
    pub fn cli_session_id(&self) -> Option<&str> {
        self.0.file_stem().and_then(|s| s.to_str())
    }
}

impl fmt::Display for TranscriptPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for TranscriptPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

// ============================================================================
// Transcript Directory Mapping
// ============================================================================

/// Maps a working directory to the external CLI's transcript directory.
///
/// The CLI stores transcripts in `~/.claude/projects/{escaped-path}/`,
/// where the escaped path replaces `/`, `\` and `:` with `-`. This must
/// match the CLI's own convention bit-for-bit or session discovery fails.
///
/// Example: `/home/user/code/project` -> `~/.claude/projects/-home-user-code-project/`
///
/// Returns `None` for an empty working directory or when no home
/// directory can be determined.
pub fn project_dir_for(cwd: &Path) -> Option<PathBuf> {
    let cwd_str = cwd.to_str()?;
    if cwd_str.is_empty() {
        return None;
    }

    let escaped: String = cwd_str
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect();

    let home = dirs::home_dir()?;
    Some(home.join(".claude").join("projects").join(escaped))
}

// ============================================================================
// Session Status (3-State Model)
// ============================================================================

/// Derived, UI-visible status of a session.
///
/// Never set directly from raw file content: the waiting and permission
/// states only exist after their debounce timers fire, and any new
/// transcript activity forces the session back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// New transcript lines are arriving or a tool is open.
    #[default]
    Active,

    /// The waiting timer fired with no intervening activity; the agent
    /// is idle and the user's turn is expected.
    Waiting,

    /// A permission-requiring tool has been pending long enough that a
    /// confirmation prompt is the likely blocker.
    PermissionPending,
}

impl SessionStatus {
    /// Returns the wire/display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Waiting => "waiting",
            Self::PermissionPending => "permission",
        }
    }

    /// Returns true if user action is needed for the session to proceed.
    #[must_use]
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::PermissionPending)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Seat Metadata
// ============================================================================

/// Appearance/placement metadata the UI associates with a session.
///
/// Pure key-value bookkeeping: the daemon stores and echoes it, nothing
/// in the lifecycle depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub palette: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue_shift: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat_id: Option<String>,
}

// ============================================================================
// Domain Entity
// ============================================================================

/// One tracked external CLI run.
///
/// Owns the transcript tailing cursor (file, byte offset, pending line
/// fragment) and the per-turn tool/activity bookkeeping the status state
/// machine derives from. Owned exclusively by the manager actor.
#[derive(Debug, Clone)]
pub struct Session {
    /// Process-local session identifier
    pub id: SessionId,

    /// Absolute path the CLI process runs in
    pub working_dir: PathBuf,

    /// Transcript directory derived from `working_dir`
    pub project_dir: PathBuf,

    /// Transcript file this session is currently bound to. Not fixed for
    /// the session's lifetime: a conversation reset rebinds it.
    pub transcript_file: TranscriptPath,

    /// Byte offset up to which the transcript has been consumed.
    /// Monotone while bound to one file; reset on rebind.
    pub read_offset: u64,

    /// Raw bytes of the last read chunk that had no terminating newline
    /// yet. Kept as bytes so a multi-byte character split across reads
    /// survives until its line completes.
    pub line_fragment: Vec<u8>,

    /// Tool invocations started but not yet finished this turn,
    /// keyed by tool-use id, holding the synthesized detail string.
    pub active_tools: HashMap<ToolUseId, String>,

    /// Whether the waiting timer fired and "waiting" was broadcast.
    pub is_waiting: bool,

    /// Whether the permission timer fired and "permission" was broadcast.
    pub permission_requested: bool,

    /// Whether any tool ran in the current conversation turn.
    pub had_tools_in_turn: bool,

    /// Most recent assistant text block, kept for status displays.
    pub last_assistant_text: String,

    /// Whether a PTY was successfully attached at creation/adoption.
    pub has_pty: bool,

    /// When the session was created or adopted.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session bound to `transcript_file` at `read_offset`.
    pub fn new(
        id: SessionId,
        working_dir: PathBuf,
        project_dir: PathBuf,
        transcript_file: TranscriptPath,
        read_offset: u64,
    ) -> Self {
        Self {
            id,
            working_dir,
            project_dir,
            transcript_file,
            read_offset,
            line_fragment: Vec::new(),
            active_tools: HashMap::new(),
            is_waiting: false,
            permission_requested: false,
            had_tools_in_turn: false,
            last_assistant_text: String::new(),
            has_pty: false,
            created_at: Utc::now(),
        }
    }

    /// Returns the derived status for this session.
    pub fn status(&self) -> SessionStatus {
        if self.permission_requested {
            SessionStatus::PermissionPending
        } else if self.is_waiting {
            SessionStatus::Waiting
        } else {
            SessionStatus::Active
        }
    }

    /// Rebinds the session to a different transcript file.
    ///
    /// Resets the tailing cursor and all per-turn activity state. The
    /// caller is responsible for stopping watchers on the old file and
    /// canceling timers first.
    pub fn rebind(&mut self, new_file: TranscriptPath, offset: u64) {
        self.transcript_file = new_file;
        self.read_offset = offset;
        self.line_fragment.clear();
        self.clear_activity();
    }

    /// Clears tool and status activity without touching the cursor.
    pub fn clear_activity(&mut self) {
        self.active_tools.clear();
        self.is_waiting = false;
        self.permission_requested = false;
        self.had_tools_in_turn = false;
        self.last_assistant_text.clear();
    }

    /// Returns true if any tool invocation is currently open.
    pub fn has_open_tools(&self) -> bool {
        !self.active_tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(id: u32) -> Session {
        Session::new(
            SessionId::new(id),
            PathBuf::from("/home/user/proj"),
            PathBuf::from("/home/user/.claude/projects/-home-user-proj"),
            TranscriptPath::new("/home/user/.claude/projects/-home-user-proj/abc.jsonl"),
            0,
        )
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(7).to_string(), "7");
        assert_eq!(SessionId::from(3).as_u32(), 3);
    }

    #[test]
    fn test_transcript_path_cli_session_id() {
        let path = TranscriptPath::new("/tmp/projects/8e11bfb5-7dc2.jsonl");
        assert_eq!(path.cli_session_id(), Some("8e11bfb5-7dc2"));
        assert_eq!(path.filename(), Some("8e11bfb5-7dc2.jsonl"));
    }

    #[test]
    fn test_project_dir_escaping() {
        let dir = project_dir_for(Path::new("/home/user/code/project"));
        let dir = dir.expect("home dir available in tests");
        assert!(dir
            .to_string_lossy()
            .ends_with(".claude/projects/-home-user-code-project"));
    }

    #[test]
    fn test_project_dir_escapes_colons_and_backslashes() {
        let dir = project_dir_for(Path::new("/mnt/c:\\work")).expect("home dir");
        assert!(dir.to_string_lossy().ends_with("-mnt-c--work"));
    }

    #[test]
    fn test_project_dir_empty_cwd() {
        assert!(project_dir_for(Path::new("")).is_none());
    }

    #[test]
    fn test_status_derivation() {
        let mut session = test_session(1);
        assert_eq!(session.status(), SessionStatus::Active);

        session.is_waiting = true;
        assert_eq!(session.status(), SessionStatus::Waiting);

        // Permission takes precedence over waiting
        session.permission_requested = true;
        assert_eq!(session.status(), SessionStatus::PermissionPending);
    }

    #[test]
    fn test_rebind_resets_cursor_and_activity() {
        let mut session = test_session(1);
        session.read_offset = 4096;
        session.line_fragment = b"{\"partial".to_vec();
        session
            .active_tools
            .insert(ToolUseId::new("toolu_1"), "Bash: ls".to_string());
        session.is_waiting = true;
        session.had_tools_in_turn = true;

        let new_file = TranscriptPath::new("/tmp/projects/fresh.jsonl");
        session.rebind(new_file.clone(), 0);

        assert_eq!(session.transcript_file, new_file);
        assert_eq!(session.read_offset, 0);
        assert!(session.line_fragment.is_empty());
        assert!(session.active_tools.is_empty());
        assert!(!session.is_waiting);
        assert!(!session.had_tools_in_turn);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::Active.label(), "active");
        assert_eq!(SessionStatus::Waiting.label(), "waiting");
        assert_eq!(SessionStatus::PermissionPending.label(), "permission");
        assert!(SessionStatus::PermissionPending.needs_attention());
        assert!(!SessionStatus::Waiting.needs_attention());
    }
}
