//! Incremental transcript parsing.
//!
//! The external CLI appends newline-delimited JSON records to its transcript
//! file as a conversation progresses. [`parse_line`] turns one complete line
//! into zero or more semantic events; [`read_transcript`] replays a whole
//! file into display entries for a history snapshot. Both are pure with
//! respect to session state and silently skip anything they do not
//! recognize, since the CLI interleaves bookkeeping records (file-history
//! snapshots, summaries) with conversation records.

use crate::config::{
    BASH_COMMAND_DISPLAY_MAX, PATTERN_DISPLAY_MAX, TASK_DESCRIPTION_DISPLAY_MAX,
    TRANSCRIPT_MAX_ENTRIES, TRANSCRIPT_MAX_TEXT_LENGTH,
};
use crate::session::ToolUseId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

// ============================================================================
// Raw Record Shapes
// ============================================================================

/// One line of the transcript file, decoded at the trust boundary.
///
/// All fields are defaulted so a record with a recognized `type` but an
/// unexpected shape degrades to "no events" instead of failing the line.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawRecord {
    User {
        #[serde(default)]
        message: Option<RawMessage>,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    Assistant {
        #[serde(default)]
        message: Option<RawMessage>,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        timestamp: Option<Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<RawContent>,
}

/// Message content is either a plain string or a list of typed blocks.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
    },
    #[serde(other)]
    Other,
}

// ============================================================================
// Parsed Events
// ============================================================================

/// Semantic event extracted from one transcript line.
///
/// A single line can yield several events (an assistant message often
/// carries a text block followed by multiple tool invocations).
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// The user sent a text message (tool results excluded).
    UserText(String),

    /// The assistant produced a text block.
    AssistantText(String),

    /// The assistant invoked a tool.
    ToolStart {
        id: ToolUseId,
        name: String,
        /// Short human-readable summary of the invocation, possibly empty.
        detail: String,
    },

    /// A previously started tool finished and returned a result.
    ToolResult { id: ToolUseId },

    /// The conversation turn finished.
    TurnComplete,
}

/// Parses one complete transcript line into ordered semantic events.
///
/// Malformed JSON and unrecognized record shapes yield an empty vec;
/// the tailer feeds every non-blank line through here without filtering.
pub fn parse_line(line: &str) -> Vec<TranscriptEvent> {
    match serde_json::from_str(line) {
        Ok(record) => extract_events(record),
        Err(_) => Vec::new(),
    }
}

fn extract_events(record: RawRecord) -> Vec<TranscriptEvent> {
    let mut events = Vec::new();
    match record {
        RawRecord::User { message, .. } => match message.and_then(|m| m.content) {
            Some(RawContent::Text(text)) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    events.push(TranscriptEvent::UserText(trimmed.to_string()));
                }
            }
            Some(RawContent::Blocks(blocks)) => {
                for block in blocks {
                    match block {
                        RawBlock::Text { text } => {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                events.push(TranscriptEvent::UserText(trimmed.to_string()));
                            }
                        }
                        RawBlock::ToolResult { tool_use_id } if !tool_use_id.is_empty() => {
                            events.push(TranscriptEvent::ToolResult {
                                id: ToolUseId::new(tool_use_id),
                            });
                        }
                        _ => {}
                    }
                }
            }
            None => {}
        },
        RawRecord::Assistant { message, .. } => {
            if let Some(RawContent::Blocks(blocks)) = message.and_then(|m| m.content) {
                for block in blocks {
                    match block {
                        RawBlock::Text { text } => {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                events.push(TranscriptEvent::AssistantText(trimmed.to_string()));
                            }
                        }
                        RawBlock::ToolUse { id, name, input } if !id.is_empty() => {
                            let name = if name.is_empty() {
                                "unknown".to_string()
                            } else {
                                name
                            };
                            let detail = tool_detail(&name, &input);
                            events.push(TranscriptEvent::ToolStart {
                                id: ToolUseId::new(id),
                                name,
                                detail,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        RawRecord::System { subtype, .. } => {
            if subtype.as_deref() == Some("turn_duration") {
                events.push(TranscriptEvent::TurnComplete);
            }
        }
        RawRecord::Other => {}
    }
    events
}

// ============================================================================
// Tool Display Synthesis
// ============================================================================

/// Tools whose invocation usually triggers a user confirmation prompt in
/// the CLI. A pending start of one of these arms the permission timer.
pub fn needs_permission(tool_name: &str) -> bool {
    matches!(
        tool_name,
        "Bash" | "Edit" | "Write" | "NotebookEdit" | "WebFetch" | "KillShell"
    )
}

/// Synthesizes a short display detail for a tool invocation.
///
/// Returns an empty string for tools with no recognized summary field.
fn tool_detail(tool_name: &str, input: &Value) -> String {
    match tool_name {
        "Bash" => input
            .get("command")
            .and_then(Value::as_str)
            .map(|c| truncate(c, BASH_COMMAND_DISPLAY_MAX))
            .unwrap_or_default(),
        "Read" | "Edit" | "Write" => input
            .get("file_path")
            .and_then(Value::as_str)
            .map(|p| p.rsplit('/').next().unwrap_or(p).to_string())
            .unwrap_or_default(),
        "Grep" => input
            .get("pattern")
            .and_then(Value::as_str)
            .map(|p| format!("pattern: {}", truncate(p, PATTERN_DISPLAY_MAX)))
            .unwrap_or_default(),
        "Glob" => input
            .get("pattern")
            .and_then(Value::as_str)
            .map(|p| truncate(p, PATTERN_DISPLAY_MAX))
            .unwrap_or_default(),
        "Task" => input
            .get("description")
            .and_then(Value::as_str)
            .map(|d| truncate(d, TASK_DESCRIPTION_DISPLAY_MAX))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// Combines a tool name and detail into the display label sent to clients.
pub fn tool_status_label(name: &str, detail: &str) -> String {
    if detail.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {detail}")
    }
}

/// Truncates on a character boundary, appending "..." when shortened.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

// ============================================================================
// History Snapshot
// ============================================================================

/// Display role of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
    Tool,
    System,
}

/// One display entry in a transcript history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub role: EntryRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

/// Reads a whole transcript file into display entries.
///
/// Unreadable files yield an empty history (the file may not exist yet for
/// a freshly launched session). Output is capped to the most recent
/// [`TRANSCRIPT_MAX_ENTRIES`] entries with per-entry text capped to
/// [`TRANSCRIPT_MAX_TEXT_LENGTH`] characters.
pub fn read_transcript(path: &Path) -> Vec<TranscriptEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Transcript not readable yet");
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let record: RawRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(_) => continue,
        };
        let ts = record_timestamp(&record);
        for event in extract_events(record) {
            match event {
                TranscriptEvent::UserText(text) => entries.push(TranscriptEntry {
                    role: EntryRole::User,
                    text: truncate(&text, TRANSCRIPT_MAX_TEXT_LENGTH),
                    timestamp: ts,
                    tool_name: None,
                }),
                TranscriptEvent::AssistantText(text) => entries.push(TranscriptEntry {
                    role: EntryRole::Assistant,
                    text: truncate(&text, TRANSCRIPT_MAX_TEXT_LENGTH),
                    timestamp: ts,
                    tool_name: None,
                }),
                TranscriptEvent::ToolStart { name, detail, .. } => entries.push(TranscriptEntry {
                    role: EntryRole::Tool,
                    text: tool_status_label(&name, &detail),
                    timestamp: ts,
                    tool_name: Some(name),
                }),
                TranscriptEvent::ToolResult { .. } => {}
                TranscriptEvent::TurnComplete => entries.push(TranscriptEntry {
                    role: EntryRole::System,
                    text: "--- turn complete ---".to_string(),
                    timestamp: ts,
                    tool_name: None,
                }),
            }
        }
    }

    if entries.len() > TRANSCRIPT_MAX_ENTRIES {
        entries.split_off(entries.len() - TRANSCRIPT_MAX_ENTRIES)
    } else {
        entries
    }
}

fn record_timestamp(record: &RawRecord) -> Option<f64> {
    let ts = match record {
        RawRecord::User { timestamp, .. } => timestamp,
        RawRecord::Assistant { timestamp, .. } => timestamp,
        RawRecord::System { timestamp, .. } => timestamp,
        RawRecord::Other => &None,
    };
    ts.as_ref().and_then(Value::as_f64)
}
