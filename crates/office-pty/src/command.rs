//! CLI invocation modes and shell command construction.

use portable_pty::CommandBuilder;
use std::path::{Path, PathBuf};

/// How the CLI process should start relative to existing conversations.
///
/// The three modes are mutually exclusive: a fresh launch names its own
/// session id up front (so the transcript filename is predictable), a
/// continue picks up whatever conversation was most recent, and a resume
/// reattaches to one specific conversation by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// Start a fresh session with a caller-chosen session identifier.
    New { session_id: String },

    /// Continue the most recent conversation in the working directory.
    Continue,

    /// Resume a specific existing conversation.
    Resume { session_id: String },
}

impl LaunchMode {
    /// Builds the CLI command string executed by the login shell.
    pub fn claude_command(&self) -> String {
        match self {
            Self::New { session_id } => format!("claude --session-id {session_id}"),
            Self::Continue => "claude --continue".to_string(),
            Self::Resume { session_id } => format!("claude --resume {session_id}"),
        }
    }
}

/// Returns the user's shell, falling back to `/bin/zsh`.
pub fn login_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string())
}

/// Validates the requested working directory, falling back to the
/// daemon's own cwd when it does not exist.
pub fn safe_cwd(requested: &Path) -> PathBuf {
    if requested.is_dir() {
        requested.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
    }
}

/// Builds the shell command for a CLI launch.
///
/// The full parent environment is copied in explicitly (CommandBuilder
/// starts empty), TERM is pinned for proper TUI rendering, and the
/// nesting-marker variable is removed so the CLI will start inside a
/// terminal we already own.
pub fn build_command(cwd: &Path, mode: &LaunchMode) -> CommandBuilder {
    let shell = login_shell();
    let mut cmd = CommandBuilder::new(&shell);
    cmd.args(["-l", "-c", &mode.claude_command()]);
    cmd.cwd(safe_cwd(cwd));

    for (key, value) in std::env::vars() {
        cmd.env(key, value);
    }
    cmd.env("TERM", "xterm-256color");
    cmd.env_remove("CLAUDECODE");

    cmd
}
