//! Timing and display tunables shared across the daemon.
//!
//! These mirror the external CLI's observed behavior and must stay in one
//! place: the tailer, timer manager, and PTY bridge all read from here.

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// How often to poll for a freshly launched session's transcript file to
/// appear on disk.
pub const TRANSCRIPT_CREATE_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Backstop poll interval for transcript growth. Native file notification
/// can silently miss events on some filesystems, so this always runs.
pub const FILE_WATCHER_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// How often each project directory is scanned for transcript files that
/// no session is bound to yet.
pub const PROJECT_SCAN_INTERVAL: Duration = Duration::from_millis(1000);

/// Debounce before a quiet session with no open tools is reported as
/// waiting for input.
pub const WAITING_TIMER_DELAY: Duration = Duration::from_millis(5000);

/// Debounce before a pending permission-requiring tool is reported as
/// blocked on a permission prompt.
pub const PERMISSION_TIMER_DELAY: Duration = Duration::from_millis(7000);

// ============================================================================
// Display truncation
// ============================================================================

/// Maximum display length for a shell command in a tool detail string.
pub const BASH_COMMAND_DISPLAY_MAX: usize = 30;

/// Maximum display length for search patterns in a tool detail string.
pub const PATTERN_DISPLAY_MAX: usize = 40;

/// Maximum display length for a subagent task description.
pub const TASK_DESCRIPTION_DISPLAY_MAX: usize = 40;

/// Maximum number of entries returned by the transcript history reader.
pub const TRANSCRIPT_MAX_ENTRIES: usize = 200;

/// Maximum text length per transcript history entry.
pub const TRANSCRIPT_MAX_TEXT_LENGTH: usize = 2000;

// ============================================================================
// PTY
// ============================================================================

/// Scrollback replay buffer per PTY session. Oldest bytes are evicted
/// first; the transcript file is the record of truth, not this buffer.
pub const PTY_BUFFER_MAX_BYTES: usize = 256 * 1024;

/// Initial terminal size for spawned PTYs.
pub const PTY_INITIAL_COLS: u16 = 120;
pub const PTY_INITIAL_ROWS: u16 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_delays_ordered() {
        // The permission debounce must outlast the waiting debounce so a
        // pending tool is not first misreported as idle.
        assert!(PERMISSION_TIMER_DELAY > WAITING_TIMER_DELAY);
    }

    #[test]
    fn test_poll_intervals_nonzero() {
        assert!(!TRANSCRIPT_CREATE_POLL_INTERVAL.is_zero());
        assert!(!FILE_WATCHER_POLL_INTERVAL.is_zero());
        assert!(!PROJECT_SCAN_INTERVAL.is_zero());
    }
}
