//! Connection handler for individual UI relay clients.
//!
//! Each client speaks newline-delimited JSON in both directions. Every
//! connected client receives the full event stream; inbound lines are
//! decoded into [`ClientCommand`]s and forwarded to the manager handle.
//! Invalid lines are logged and skipped so a buggy client cannot wedge
//! its connection.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use office_protocol::ClientCommand;

use crate::manager::{ManagerError, ManagerHandle};

/// Writer handle shared between the connection and the event broadcaster.
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// One subscribed client.
pub struct Subscriber {
    pub writer: SubscriberWriter,
}

/// All subscribed clients, keyed by client id.
pub type SubscribersMap = Arc<RwLock<HashMap<String, Subscriber>>>;

/// Maximum number of concurrent UI clients.
pub(crate) const MAX_CLIENTS: usize = 10;

/// Maximum inbound line size (1 MB).
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Write timeout for outbound events.
pub(crate) const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler for a single client connection.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: SubscriberWriter,
    manager: ManagerHandle,
    subscribers: SubscribersMap,
    client_id: String,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        manager: ManagerHandle,
        subscribers: SubscribersMap,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            manager,
            subscribers,
            client_id: format!("client-{connection_number}"),
        }
    }

    /// Runs the connection until the client disconnects.
    ///
    /// Returns the client id so the server can drop the subscription.
    pub async fn run(mut self) -> String {
        debug!(client_id = %self.client_id, "New client connected");

        // Every client gets the event stream; there is no subscribe step
        {
            let mut subs = self.subscribers.write().await;
            if subs.len() >= MAX_CLIENTS {
                warn!(
                    client_id = %self.client_id,
                    max = MAX_CLIENTS,
                    "Too many clients, dropping connection"
                );
                return self.client_id;
            }
            subs.insert(
                self.client_id.clone(),
                Subscriber {
                    writer: Arc::clone(&self.writer),
                },
            );
        }

        if let Err(e) = self.process_lines().await {
            debug!(client_id = %self.client_id, error = %e, "Connection closed");
        }

        info!(client_id = %self.client_id, "Client disconnected");
        self.client_id
    }

    async fn process_lines(&mut self) -> Result<(), ConnectionError> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| ConnectionError::Io(e.to_string()))?;
            if bytes_read == 0 {
                return Ok(());
            }
            if line.len() > MAX_MESSAGE_SIZE {
                return Err(ConnectionError::MessageTooLarge {
                    size: line.len(),
                    max: MAX_MESSAGE_SIZE,
                });
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match ClientCommand::decode(trimmed) {
                Ok(cmd) => self.dispatch(cmd).await?,
                Err(e) => {
                    // A bad line must not take the connection down
                    warn!(client_id = %self.client_id, error = %e, "Invalid client line skipped");
                }
            }
        }
    }

    async fn dispatch(&self, cmd: ClientCommand) -> Result<(), ManagerError> {
        match cmd {
            ClientCommand::ClientReady => self.manager.client_ready().await,
            ClientCommand::OpenSession {
                cwd,
                continue_session,
            } => {
                self.manager
                    .launch(cwd.map(PathBuf::from), continue_session.unwrap_or(false))
                    .await
            }
            ClientCommand::FocusSession { id } => self.manager.focus(id).await,
            ClientCommand::CloseSession { id } => self.manager.close(id).await,
            ClientCommand::SaveSeats { seats } => self.manager.save_seats(seats).await,
            ClientCommand::RequestTranscript { id } => self.manager.request_transcript(id).await,
            ClientCommand::TerminalInput { id, data } => {
                self.manager.terminal_input(id, data).await
            }
            ClientCommand::TerminalResize { id, cols, rows } => {
                self.manager.terminal_resize(id, cols, rows).await
            }
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Manager unavailable: {0}")]
    Manager(#[from] ManagerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_size_error_display() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
        assert!(err.to_string().contains(&MAX_MESSAGE_SIZE.to_string()));
    }
}
