//! Cheap-to-clone handle for the manager actor.

use crate::manager::{ManagerCommand, ManagerError};
use office_core::{SeatMeta, SessionId};
use office_protocol::ServerEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Handle used by server connections (and the daemon entry point) to talk
/// to the manager actor.
///
/// All methods translate into [`ManagerCommand`] sends; a failed send
/// means the actor is gone and surfaces as
/// [`ManagerError::ChannelClosed`].
#[derive(Clone)]
pub struct ManagerHandle {
    tx: mpsc::Sender<ManagerCommand>,
    events: broadcast::Sender<ServerEvent>,
}

impl ManagerHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<ManagerCommand>,
        events: broadcast::Sender<ServerEvent>,
    ) -> Self {
        Self { tx, events }
    }

    /// Subscribes to the daemon's outbound event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    async fn send(&self, cmd: ManagerCommand) -> Result<(), ManagerError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| ManagerError::ChannelClosed)
    }

    /// Launches a new CLI session.
    pub async fn launch(
        &self,
        cwd: Option<PathBuf>,
        continue_session: bool,
    ) -> Result<(), ManagerError> {
        self.send(ManagerCommand::Launch {
            cwd,
            continue_session,
        })
        .await
    }

    /// Closes a session; unknown ids are a no-op.
    pub async fn close(&self, session_id: SessionId) -> Result<(), ManagerError> {
        self.send(ManagerCommand::Close { session_id }).await
    }

    /// Marks a session as the focused one.
    pub async fn focus(&self, session_id: SessionId) -> Result<(), ManagerError> {
        self.send(ManagerCommand::Focus { session_id }).await
    }

    /// Reports that a UI client finished loading.
    pub async fn client_ready(&self) -> Result<(), ManagerError> {
        self.send(ManagerCommand::ClientReady).await
    }

    /// Requests the full parsed history for a session.
    pub async fn request_transcript(&self, session_id: SessionId) -> Result<(), ManagerError> {
        self.send(ManagerCommand::RequestTranscript { session_id })
            .await
    }

    /// Persists seat/appearance metadata.
    pub async fn save_seats(&self, seats: HashMap<String, SeatMeta>) -> Result<(), ManagerError> {
        self.send(ManagerCommand::SaveSeats { seats }).await
    }

    /// Forwards keystrokes to a session's terminal.
    pub async fn terminal_input(
        &self,
        session_id: SessionId,
        data: String,
    ) -> Result<(), ManagerError> {
        self.send(ManagerCommand::TerminalInput { session_id, data })
            .await
    }

    /// Forwards a terminal resize to a session's PTY.
    pub async fn terminal_resize(
        &self,
        session_id: SessionId,
        cols: u16,
        rows: u16,
    ) -> Result<(), ManagerError> {
        self.send(ManagerCommand::TerminalResize {
            session_id,
            cols,
            rows,
        })
        .await
    }

    /// Stops the actor and waits for teardown to finish.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        let (respond_to, done) = oneshot::channel();
        self.send(ManagerCommand::Shutdown { respond_to }).await?;
        done.await.map_err(|_| ManagerError::ChannelClosed)
    }
}
