//! The manager actor: single owner of all session state.
//!
//! Every mutation of the session table happens inside [`ManagerActor::run`].
//! Tailers, timers, PTY reader threads and server connections are pure
//! producers; ordering between them is not guaranteed, which is safe
//! because reads are idempotent and timer fires are generation-checked.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Commands naming unknown session ids are silently ignored
//! - PTY, filesystem and parse failures degrade per-session, never
//!   crash the daemon

use crate::adopt;
use crate::manager::{ManagerCommand, TimerKind};
use crate::tailer::{self, WatchHandle};
use crate::timer::TimerManager;
use office_core::config::{PERMISSION_TIMER_DELAY, WAITING_TIMER_DELAY};
use office_core::{
    needs_permission, project_dir_for, read_transcript, tool_status_label, DomainError, SeatMeta,
    Session, SessionId, ToolUseId, TranscriptEvent, TranscriptPath,
};
use office_protocol::ServerEvent;
use office_pty::{LaunchMode, PtyBridge, PtyEvent};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Launch Planning
// ============================================================================

/// Resolved target of a launch: which file to tail, from where, and how
/// to invoke the CLI.
#[derive(Debug)]
struct LaunchPlan {
    transcript_file: PathBuf,
    offset: u64,
    mode: LaunchMode,
}

/// Decides the transcript binding for a new launch.
///
/// `continue_session` binds to the most recent transcript no live
/// session tracks, tailing from its current end. The exclusion set is
/// the tracked files only, never the wider known-files set: files the
/// project scan has merely seen are still continuable. With nothing to
/// continue (or for a plain launch) the session names its own fresh
/// UUID, giving a predictable not-yet-existing transcript path.
fn plan_launch(
    project_dir: &Path,
    continue_session: bool,
    tracked_files: &HashSet<PathBuf>,
) -> LaunchPlan {
    if continue_session {
        let recent = tailer::list_transcripts_newest_first(project_dir)
            .into_iter()
            .find(|info| !tracked_files.contains(&info.path));
        if let Some(info) = recent {
            debug!(file = %info.path.display(), offset = info.size, "Continuing most recent conversation");
            return LaunchPlan {
                transcript_file: info.path,
                offset: info.size,
                mode: LaunchMode::Continue,
            };
        }
        debug!(project_dir = %project_dir.display(), "Nothing to continue, starting fresh");
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    LaunchPlan {
        transcript_file: project_dir.join(format!("{session_id}.jsonl")),
        offset: 0,
        mode: LaunchMode::New { session_id },
    }
}

/// Picks up to `count` adoptable transcripts in a project directory:
/// newest first, never one a session already tracks, and only files with
/// actual conversation records.
fn select_adoptable(
    project_dir: &Path,
    known_files: &HashSet<PathBuf>,
    count: usize,
) -> Vec<tailer::TranscriptFileInfo> {
    tailer::list_transcripts_newest_first(project_dir)
        .into_iter()
        .filter(|info| !known_files.contains(&info.path))
        .filter(|info| adopt::has_conversation(&info.path))
        .take(count)
        .collect()
}

// ============================================================================
// Actor
// ============================================================================

/// Owns the session table and every per-session resource.
pub struct ManagerActor {
    default_cwd: PathBuf,
    /// Sender handed to background tasks so their output re-enters the
    /// actor as commands.
    cmd_tx: mpsc::Sender<ManagerCommand>,
    events: broadcast::Sender<ServerEvent>,

    sessions: HashMap<SessionId, Session>,
    next_id: u32,
    focused: Option<SessionId>,
    /// Every transcript file any session has ever been bound to, plus
    /// files seen by project scans. Guards adoption and reassignment.
    known_files: HashSet<PathBuf>,
    seats: HashMap<String, SeatMeta>,

    watchers: HashMap<SessionId, WatchHandle>,
    creation_polls: HashMap<SessionId, WatchHandle>,
    project_scans: HashMap<PathBuf, WatchHandle>,
    timers: TimerManager,
    pty: PtyBridge,

    /// Adoption runs once, on the first client-ready.
    adopted: bool,
}

impl ManagerActor {
    pub fn new(
        default_cwd: PathBuf,
        cmd_tx: mpsc::Sender<ManagerCommand>,
        events: broadcast::Sender<ServerEvent>,
        pty: PtyBridge,
    ) -> Self {
        let timers = TimerManager::new(cmd_tx.clone());
        Self {
            default_cwd,
            cmd_tx,
            events,
            sessions: HashMap::new(),
            next_id: 1,
            focused: None,
            known_files: HashSet::new(),
            seats: HashMap::new(),
            watchers: HashMap::new(),
            creation_polls: HashMap::new(),
            project_scans: HashMap::new(),
            timers,
            pty,
            adopted: false,
        }
    }

    /// Runs the actor until shutdown is commanded or `cancel` fires.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ManagerCommand>,
        mut pty_rx: mpsc::UnboundedReceiver<PtyEvent>,
        cancel: CancellationToken,
    ) {
        info!("Manager actor started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(ManagerCommand::Shutdown { respond_to }) => {
                        self.teardown();
                        let _ = respond_to.send(());
                        info!("Manager actor stopped");
                        return;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = pty_rx.recv() => self.handle_pty_event(event),
            }
        }
        self.teardown();
        info!("Manager actor stopped");
    }

    fn handle_command(&mut self, cmd: ManagerCommand) {
        match cmd {
            ManagerCommand::Launch {
                cwd,
                continue_session,
            } => self.handle_launch(cwd, continue_session),
            ManagerCommand::Close { session_id } => self.handle_close(session_id),
            ManagerCommand::Focus { session_id } => {
                if self.sessions.contains_key(&session_id) {
                    self.focused = Some(session_id);
                }
            }
            ManagerCommand::ClientReady => self.handle_client_ready(),
            ManagerCommand::RequestTranscript { session_id } => {
                self.handle_request_transcript(session_id)
            }
            ManagerCommand::SaveSeats { seats } => {
                self.seats.extend(seats);
            }
            ManagerCommand::TerminalInput { session_id, data } => {
                if let Err(e) = self.pty.write(session_id, data.as_bytes()) {
                    debug!(session_id = %session_id, error = %e, "Terminal input dropped");
                }
            }
            ManagerCommand::TerminalResize {
                session_id,
                cols,
                rows,
            } => {
                if let Err(e) = self.pty.resize(session_id, cols, rows) {
                    debug!(session_id = %session_id, error = %e, "Terminal resize dropped");
                }
            }
            ManagerCommand::ReadNewLines { session_id } => self.handle_read_new_lines(session_id),
            ManagerCommand::TranscriptFileAppeared { session_id } => {
                self.handle_file_appeared(session_id)
            }
            ManagerCommand::ProjectScanTick { project_dir } => {
                self.handle_project_scan(&project_dir)
            }
            ManagerCommand::TimerFired {
                session_id,
                kind,
                generation,
            } => self.handle_timer_fired(session_id, kind, generation),
            ManagerCommand::Shutdown { respond_to } => {
                // Reached only when called outside the run loop (tests)
                self.teardown();
                let _ = respond_to.send(());
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn allocate_id(&mut self) -> SessionId {
        let id = SessionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    /// Transcript files currently bound to a live session.
    fn tracked_files(&self) -> HashSet<PathBuf> {
        self.sessions
            .values()
            .map(|s| s.transcript_file.as_path().to_path_buf())
            .collect()
    }

    fn handle_launch(&mut self, cwd: Option<PathBuf>, continue_session: bool) {
        let cwd = cwd.unwrap_or_else(|| self.default_cwd.clone());
        let Some(project_dir) = project_dir_for(&cwd) else {
            let err = DomainError::NoProjectDir {
                cwd: cwd.display().to_string(),
            };
            warn!(error = %err, "Launch ignored");
            return;
        };

        let plan = plan_launch(&project_dir, continue_session, &self.tracked_files());
        let id = self.allocate_id();

        // Pre-register so the project scan never mistakes this session's
        // own forthcoming file for an externally created one.
        self.known_files.insert(plan.transcript_file.clone());

        let mut session = Session::new(
            id,
            cwd.clone(),
            project_dir.clone(),
            TranscriptPath::new(plan.transcript_file.clone()),
            plan.offset,
        );
        session.has_pty = match self.pty.spawn(id, &cwd, &plan.mode) {
            Ok(()) => true,
            Err(e) => {
                warn!(session_id = %id, error = %e, "PTY spawn failed, session has no terminal");
                false
            }
        };
        let has_pty = session.has_pty;

        info!(
            session_id = %id,
            file = %plan.transcript_file.display(),
            mode = ?plan.mode,
            "Session launched"
        );
        self.sessions.insert(id, session);
        self.focused = Some(id);
        self.ensure_project_scan(project_dir);

        if plan.transcript_file.exists() {
            self.start_watch(id, plan.transcript_file);
        } else {
            let poll = tailer::poll_for_creation(id, plan.transcript_file, self.cmd_tx.clone());
            self.creation_polls.insert(id, poll);
        }

        self.broadcast(ServerEvent::session_created(id, has_pty));
    }

    fn handle_close(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        if let Some(watch) = self.watchers.remove(&id) {
            watch.stop();
        }
        if let Some(poll) = self.creation_polls.remove(&id) {
            poll.stop();
        }
        self.timers.cancel_all(id);
        self.pty.kill(id);
        if self.focused == Some(id) {
            self.focused = None;
        }

        // Last session of its project dir takes the scan down with it
        let dir_still_used = self
            .sessions
            .values()
            .any(|s| s.project_dir == session.project_dir);
        if !dir_still_used {
            if let Some(scan) = self.project_scans.remove(&session.project_dir) {
                scan.stop();
            }
        }

        info!(session_id = %id, "Session closed");
        self.broadcast(ServerEvent::session_closed(id));
    }

    fn handle_client_ready(&mut self) {
        if !self.adopted {
            self.adopted = true;
            self.adopt_external_sessions();
        }

        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        self.broadcast(ServerEvent::existing_sessions(ids, self.seats.clone()));

        // Replay live state so a late-joining client catches up
        for (id, session) in &self.sessions {
            for (tool_id, status) in &session.active_tools {
                self.broadcast(ServerEvent::tool_start(*id, tool_id.clone(), status.clone()));
            }
            if session.is_waiting {
                self.broadcast(ServerEvent::waiting(*id));
            }
            if session.permission_requested {
                self.broadcast(ServerEvent::tool_permission(*id));
            }
        }
    }

    fn adopt_external_sessions(&mut self) {
        let candidates = adopt::discover_external_processes();
        if candidates.is_empty() {
            return;
        }
        info!(project_dirs = candidates.len(), "Adopting external CLI sessions");

        for (project_dir, candidate) in candidates {
            let files = select_adoptable(&project_dir, &self.known_files, candidate.process_count);
            for info in files {
                let id = self.allocate_id();
                let mut session = Session::new(
                    id,
                    candidate.cwd.clone(),
                    project_dir.clone(),
                    TranscriptPath::new(info.path.clone()),
                    info.size,
                );

                let cli_session_id = info
                    .path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let mode = LaunchMode::Resume {
                    session_id: cli_session_id,
                };
                session.has_pty = match self.pty.spawn(id, &candidate.cwd, &mode) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "Resume PTY spawn failed");
                        false
                    }
                };

                info!(
                    session_id = %id,
                    file = %info.path.display(),
                    "Adopted external session"
                );
                self.known_files.insert(info.path.clone());
                self.sessions.insert(id, session);
                self.start_watch(id, info.path);
            }
        }
    }

    fn handle_request_transcript(&self, id: SessionId) {
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let entries = read_transcript(session.transcript_file.as_path());
        let pty_buffer = self
            .pty
            .buffer_snapshot(id)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
        self.broadcast(ServerEvent::TranscriptData {
            id,
            entries,
            transcript_file: session.transcript_file.to_string(),
            has_pty: session.has_pty,
            pty_buffer,
            cwd: session.working_dir.display().to_string(),
        });
    }

    // ========================================================================
    // Tailing
    // ========================================================================

    fn start_watch(&mut self, id: SessionId, path: PathBuf) {
        if let Some(previous) = self.watchers.remove(&id) {
            previous.stop();
        }
        self.watchers
            .insert(id, tailer::start_watching(id, path, self.cmd_tx.clone()));
    }

    fn handle_file_appeared(&mut self, id: SessionId) {
        if let Some(poll) = self.creation_polls.remove(&id) {
            poll.stop();
        }
        let Some(session) = self.sessions.get(&id) else {
            return;
        };
        let path = session.transcript_file.as_path().to_path_buf();
        debug!(session_id = %id, file = %path.display(), "Transcript file appeared");
        self.start_watch(id, path);
        self.handle_read_new_lines(id);
    }

    fn handle_read_new_lines(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let path = session.transcript_file.as_path().to_path_buf();
        let mut offset = session.read_offset;
        let mut fragment = std::mem::take(&mut session.line_fragment);
        let lines = tailer::read_new_lines(&path, &mut offset, &mut fragment);
        session.read_offset = offset;
        session.line_fragment = fragment;
        if lines.is_empty() {
            return;
        }

        // New bytes prove the process is neither idle nor stuck on a prompt
        self.timers.cancel_all(id);
        let (was_permission, was_waiting) = match self.sessions.get_mut(&id) {
            Some(session) => {
                let flags = (session.permission_requested, session.is_waiting);
                session.permission_requested = false;
                session.is_waiting = false;
                flags
            }
            None => return,
        };
        if was_permission {
            self.broadcast(ServerEvent::tool_permission_clear(id));
        }
        if was_waiting {
            self.broadcast(ServerEvent::active(id));
        }

        for line in &lines {
            for event in office_core::parse_line(line) {
                self.apply_transcript_event(id, event);
            }
        }
    }

    fn apply_transcript_event(&mut self, id: SessionId, event: TranscriptEvent) {
        match event {
            TranscriptEvent::UserText(_) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.had_tools_in_turn = false;
                    session.last_assistant_text.clear();
                }
            }
            TranscriptEvent::AssistantText(text) => {
                let arm_waiting = match self.sessions.get_mut(&id) {
                    Some(session) => {
                        session.last_assistant_text = text;
                        !session.has_open_tools()
                    }
                    None => return,
                };
                if arm_waiting {
                    self.timers.arm(id, TimerKind::Waiting, WAITING_TIMER_DELAY);
                }
            }
            TranscriptEvent::ToolStart {
                id: tool_id,
                name,
                detail,
            } => {
                let status = tool_status_label(&name, &detail);
                match self.sessions.get_mut(&id) {
                    Some(session) => {
                        session
                            .active_tools
                            .insert(tool_id.clone(), status.clone());
                        session.had_tools_in_turn = true;
                    }
                    None => return,
                }
                self.broadcast(ServerEvent::tool_start(id, tool_id, status));
                if needs_permission(&name) {
                    self.timers
                        .arm(id, TimerKind::Permission, PERMISSION_TIMER_DELAY);
                }
            }
            TranscriptEvent::ToolResult { id: tool_id } => {
                let emptied = match self.sessions.get_mut(&id) {
                    Some(session) => {
                        session.active_tools.remove(&tool_id);
                        !session.has_open_tools()
                    }
                    None => return,
                };
                self.broadcast(ServerEvent::tool_done(id, tool_id));
                if emptied {
                    self.timers.arm(id, TimerKind::Waiting, WAITING_TIMER_DELAY);
                }
            }
            TranscriptEvent::TurnComplete => {
                self.timers.arm(id, TimerKind::Waiting, WAITING_TIMER_DELAY);
            }
        }
    }

    // ========================================================================
    // Project Scanning & Reassignment
    // ========================================================================

    fn ensure_project_scan(&mut self, project_dir: PathBuf) {
        if self.project_scans.contains_key(&project_dir) {
            return;
        }
        // Seed with everything already on disk so only truly new files
        // trigger reassignment
        for info in tailer::list_transcripts_newest_first(&project_dir) {
            self.known_files.insert(info.path);
        }
        let scan = tailer::start_project_scan(project_dir.clone(), self.cmd_tx.clone());
        self.project_scans.insert(project_dir, scan);
    }

    fn handle_project_scan(&mut self, project_dir: &Path) {
        for info in tailer::list_transcripts_newest_first(project_dir) {
            if self.known_files.contains(&info.path) {
                continue;
            }
            self.known_files.insert(info.path.clone());

            // A fresh transcript while a session in this dir is focused
            // means that session's CLI reset its conversation
            let focused_here = self.focused.filter(|fid| {
                self.sessions
                    .get(fid)
                    .is_some_and(|s| s.project_dir == project_dir)
            });
            if let Some(fid) = focused_here {
                info!(
                    session_id = %fid,
                    file = %info.path.display(),
                    "New transcript detected, reassigning focused session"
                );
                self.reassign(fid, info.path);
            }
        }
    }

    fn reassign(&mut self, id: SessionId, new_file: PathBuf) {
        if let Some(watch) = self.watchers.remove(&id) {
            watch.stop();
        }
        if let Some(poll) = self.creation_polls.remove(&id) {
            poll.stop();
        }
        self.timers.cancel_all(id);

        // Close out live state with the proper events before rebinding
        let (tool_ids, was_permission, was_waiting) = match self.sessions.get_mut(&id) {
            Some(session) => {
                let tool_ids: Vec<ToolUseId> = session.active_tools.keys().cloned().collect();
                let flags = (session.permission_requested, session.is_waiting);
                session.rebind(TranscriptPath::new(new_file.clone()), 0);
                (tool_ids, flags.0, flags.1)
            }
            None => return,
        };
        for tool_id in tool_ids {
            self.broadcast(ServerEvent::tool_done(id, tool_id));
        }
        if was_permission {
            self.broadcast(ServerEvent::tool_permission_clear(id));
        }
        if was_waiting {
            self.broadcast(ServerEvent::active(id));
        }

        self.start_watch(id, new_file);
        self.handle_read_new_lines(id);
    }

    // ========================================================================
    // Timers & Status
    // ========================================================================

    fn handle_timer_fired(&mut self, id: SessionId, kind: TimerKind, generation: u64) {
        if !self.timers.acknowledge_fire(id, kind, generation) {
            return;
        }
        {
            let Some(session) = self.sessions.get_mut(&id) else {
                return;
            };
            match kind {
                TimerKind::Waiting => session.is_waiting = true,
                TimerKind::Permission => session.permission_requested = true,
            }
        }
        match kind {
            TimerKind::Waiting => {
                debug!(session_id = %id, "Session is waiting for input");
                self.broadcast(ServerEvent::waiting(id));
            }
            TimerKind::Permission => {
                debug!(session_id = %id, "Session likely blocked on a permission prompt");
                self.broadcast(ServerEvent::tool_permission(id));
            }
        }
    }

    // ========================================================================
    // PTY
    // ========================================================================

    fn handle_pty_event(&mut self, event: PtyEvent) {
        match event {
            PtyEvent::Output { id, data } => {
                self.broadcast(ServerEvent::terminal_output(id, &data));
            }
            PtyEvent::Exited { id } => {
                // The session stays tracked: the transcript file outlives
                // the process and can still be continued or inspected
                self.pty.forget(id);
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.has_pty = false;
                    info!(session_id = %id, "PTY child exited, session remains tracked");
                }
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    fn broadcast(&self, event: ServerEvent) {
        // Send fails only with zero subscribers, which is fine
        let _ = self.events.send(event);
    }

    fn teardown(&mut self) {
        for (_, watch) in self.watchers.drain() {
            watch.stop();
        }
        for (_, poll) in self.creation_polls.drain() {
            poll.stop();
        }
        for (_, scan) in self.project_scans.drain() {
            scan.stop();
        }
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            self.timers.cancel_all(id);
        }
        self.pty.dispose_all();
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const TOOL_USE_LINE: &str = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"tool_use","id":"toolu_1","name":"Bash","input":{"command":"ls -la /tmp"}}]}}"#;
    const TOOL_RESULT_LINE: &str = r#"{"type":"user","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"toolu_1"}]}}"#;
    const ASSISTANT_TEXT_LINE: &str = r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"All done."}]}}"#;
    const USER_TEXT_LINE: &str = r#"{"type":"user","message":{"role":"user","content":"thanks"}}"#;
    const CONVERSATION_LINE: &str = r#"{"type":"user","message":{"role":"user","content":"hello"}}"#;
    const SNAPSHOT_LINE: &str = r#"{"type":"file-history-snapshot","messageId":"x"}"#;

    fn test_actor() -> (
        ManagerActor,
        mpsc::Receiver<ManagerCommand>,
        broadcast::Receiver<ServerEvent>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = broadcast::channel(64);
        let (pty_tx, _pty_rx) = mpsc::unbounded_channel();
        let actor = ManagerActor::new(
            PathBuf::from("/tmp"),
            cmd_tx,
            event_tx,
            PtyBridge::new(pty_tx),
        );
        (actor, cmd_rx, event_rx)
    }

    fn insert_session(actor: &mut ManagerActor, raw_id: u32, file: &Path) -> SessionId {
        let id = SessionId::new(raw_id);
        let project_dir = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/tmp"));
        let session = Session::new(
            id,
            PathBuf::from("/tmp"),
            project_dir,
            TranscriptPath::new(file),
            0,
        );
        actor.known_files.insert(file.to_path_buf());
        actor.sessions.insert(id, session);
        id
    }

    fn append(path: &Path, line: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .expect("open");
        writeln!(file, "{line}").expect("append");
    }

    fn drain_events(rx: &mut broadcast::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_continue_with_empty_dir_falls_back_to_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let plan = plan_launch(dir.path(), true, &HashSet::new());

        assert!(matches!(plan.mode, LaunchMode::New { .. }));
        assert_eq!(plan.offset, 0);
        assert!(!plan.transcript_file.exists());
        assert_eq!(
            plan.transcript_file.extension().and_then(|e| e.to_str()),
            Some("jsonl")
        );
    }

    #[test]
    fn test_continue_binds_most_recent_untracked_at_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let old = dir.path().join("old.jsonl");
        std::fs::write(&old, "aaaa\n").expect("write");
        std::thread::sleep(std::time::Duration::from_millis(20));
        let recent = dir.path().join("recent.jsonl");
        std::fs::write(&recent, "bbbbbbbb\n").expect("write");

        let plan = plan_launch(dir.path(), true, &HashSet::new());
        assert_eq!(plan.transcript_file, recent);
        assert_eq!(plan.offset, 9);
        assert_eq!(plan.mode, LaunchMode::Continue);

        // With the recent file already tracked, the older one is next
        let known: HashSet<PathBuf> = [recent].into_iter().collect();
        let plan = plan_launch(dir.path(), true, &known);
        assert_eq!(plan.transcript_file, old);
        assert_eq!(plan.offset, 5);
    }

    #[tokio::test]
    async fn test_continue_still_finds_conversation_after_scan_seed() {
        let (mut actor, _cmd_rx, _event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let prev = dir.path().join("prev.jsonl");
        append(&prev, CONVERSATION_LINE);

        // The scan marks every on-disk file as known, but no session
        // tracks any of them yet
        actor.ensure_project_scan(dir.path().to_path_buf());
        assert!(actor.known_files.contains(&prev));

        let plan = plan_launch(dir.path(), true, &actor.tracked_files());
        assert_eq!(plan.transcript_file, prev);
        assert_eq!(plan.mode, LaunchMode::Continue);

        // Once a live session binds the file, continue falls back to fresh
        insert_session(&mut actor, 1, &prev);
        let plan = plan_launch(dir.path(), true, &actor.tracked_files());
        assert!(matches!(plan.mode, LaunchMode::New { .. }));
    }

    #[test]
    fn test_adoption_never_selects_tracked_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tracked = dir.path().join("tracked.jsonl");
        append(&tracked, CONVERSATION_LINE);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let fresh = dir.path().join("fresh.jsonl");
        append(&fresh, CONVERSATION_LINE);
        let snapshot = dir.path().join("snapshot.jsonl");
        append(&snapshot, SNAPSHOT_LINE);

        let known: HashSet<PathBuf> = [tracked].into_iter().collect();
        let picked = select_adoptable(dir.path(), &known, 5);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.first().map(|f| f.path.clone()), Some(fresh));

        assert!(select_adoptable(dir.path(), &known, 0).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_lifecycle_events_and_timers() {
        let (mut actor, _cmd_rx, mut event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("t.jsonl");
        append(&file, TOOL_USE_LINE);
        let id = insert_session(&mut actor, 1, &file);

        actor.handle_read_new_lines(id);

        let events = drain_events(&mut event_rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::ToolStart {
                id: sid,
                tool_id,
                status,
            } => {
                assert_eq!(*sid, id);
                assert_eq!(tool_id.as_str(), "toolu_1");
                assert!(status.contains("ls -la /tmp"));
            }
            other => panic!("expected ToolStart, got {other:?}"),
        }
        // Bash requires confirmation, so the permission debounce is live
        assert!(actor.timers.is_armed(id, TimerKind::Permission));

        append(&file, TOOL_RESULT_LINE);
        actor.handle_read_new_lines(id);

        let events = drain_events(&mut event_rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::ToolDone { tool_id, .. } => {
                assert_eq!(tool_id.as_str(), "toolu_1");
            }
            other => panic!("expected ToolDone, got {other:?}"),
        }
        // Tool set emptied: waiting debounce armed, permission disarmed
        assert!(actor.timers.is_armed(id, TimerKind::Waiting));
        assert!(!actor.timers.is_armed(id, TimerKind::Permission));
        assert!(!actor
            .sessions
            .get(&id)
            .is_some_and(|s| s.has_open_tools()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_cancels_armed_waiting_timer() {
        let (mut actor, _cmd_rx, _event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("t.jsonl");
        append(&file, ASSISTANT_TEXT_LINE);
        let id = insert_session(&mut actor, 1, &file);

        actor.handle_read_new_lines(id);
        assert!(actor.timers.is_armed(id, TimerKind::Waiting));

        append(&file, USER_TEXT_LINE);
        actor.handle_read_new_lines(id);
        assert!(!actor.timers.is_armed(id, TimerKind::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_fire_then_activity_restores_active() {
        let (mut actor, mut cmd_rx, mut event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("t.jsonl");
        append(&file, ASSISTANT_TEXT_LINE);
        let id = insert_session(&mut actor, 1, &file);

        actor.handle_read_new_lines(id);
        tokio::time::advance(WAITING_TIMER_DELAY + std::time::Duration::from_millis(1)).await;
        let fire = cmd_rx.recv().await.expect("timer fire");
        actor.handle_command(fire);

        assert!(actor.sessions.get(&id).is_some_and(|s| s.is_waiting));
        let events = drain_events(&mut event_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::SessionStatus { status, .. } if status == "waiting"
        )));

        append(&file, USER_TEXT_LINE);
        actor.handle_read_new_lines(id);
        assert!(!actor.sessions.get(&id).is_some_and(|s| s.is_waiting));
        let events = drain_events(&mut event_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::SessionStatus { status, .. } if status == "active"
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_lines_between_valid_records() {
        let (mut actor, _cmd_rx, mut event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("t.jsonl");
        append(&file, TOOL_USE_LINE);
        append(&file, "{not valid json at all");
        append(&file, TOOL_RESULT_LINE);
        let id = insert_session(&mut actor, 1, &file);

        actor.handle_read_new_lines(id);

        let events = drain_events(&mut event_rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ServerEvent::ToolStart { .. }));
        assert!(matches!(events[1], ServerEvent::ToolDone { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_project_scan_reassigns_focused_session() {
        let (mut actor, _cmd_rx, mut event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let old_file = dir.path().join("old.jsonl");
        append(&old_file, TOOL_USE_LINE);
        let id = insert_session(&mut actor, 1, &old_file);
        actor.handle_read_new_lines(id);
        actor.focused = Some(id);
        drain_events(&mut event_rx);

        // The CLI reset its conversation: a fresh transcript appears
        let new_file = dir.path().join("fresh.jsonl");
        append(&new_file, USER_TEXT_LINE);
        actor.handle_project_scan(dir.path());

        let session = actor.sessions.get(&id).expect("session");
        assert_eq!(session.transcript_file.as_path(), new_file);
        assert!(session.active_tools.is_empty());
        // New file fully consumed by the immediate read
        assert_eq!(
            session.read_offset,
            std::fs::metadata(&new_file).expect("stat").len()
        );

        // The open tool was closed out for the UI
        let events = drain_events(&mut event_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::ToolDone { .. })));
        assert!(actor.known_files.contains(&new_file));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_without_focus_only_marks_known() {
        let (mut actor, _cmd_rx, _event_rx) = test_actor();
        let dir = tempfile::tempdir().expect("tempdir");
        let old_file = dir.path().join("old.jsonl");
        append(&old_file, USER_TEXT_LINE);
        let id = insert_session(&mut actor, 1, &old_file);

        let new_file = dir.path().join("fresh.jsonl");
        append(&new_file, USER_TEXT_LINE);
        actor.handle_project_scan(dir.path());

        let session = actor.sessions.get(&id).expect("session");
        assert_eq!(session.transcript_file.as_path(), old_file);
        assert!(actor.known_files.contains(&new_file));
    }

    #[tokio::test]
    async fn test_close_unknown_session_is_noop() {
        let (mut actor, _cmd_rx, mut event_rx) = test_actor();
        actor.handle_close(SessionId::new(99));
        assert!(drain_events(&mut event_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_ready_snapshot_replays_live_state() {
        let (mut actor, _cmd_rx, mut event_rx) = test_actor();
        actor.adopted = true;
        let dir = tempfile::tempdir().expect("tempdir");
        let file_a = dir.path().join("a.jsonl");
        append(&file_a, TOOL_USE_LINE);
        let id_a = insert_session(&mut actor, 1, &file_a);
        let file_b = dir.path().join("b.jsonl");
        let id_b = insert_session(&mut actor, 2, &file_b);
        actor.handle_read_new_lines(id_a);
        drain_events(&mut event_rx);

        actor.handle_client_ready();

        let events = drain_events(&mut event_rx);
        match &events[0] {
            ServerEvent::ExistingSessions { sessions, .. } => {
                assert_eq!(sessions, &vec![id_a, id_b]);
            }
            other => panic!("expected ExistingSessions first, got {other:?}"),
        }
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::ToolStart { id, .. } if *id == id_a
        )));
    }
}
