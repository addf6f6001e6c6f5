//! Unix socket server for the office daemon.
//!
//! The server:
//! - Listens on a Unix socket for UI relay connections
//! - Spawns a ConnectionHandler for each client
//! - Fans manager events out to every connected client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, Subscriber, SubscriberWriter, SubscribersMap};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::sync::{broadcast, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use office_protocol::ServerEvent;

use crate::manager::ManagerHandle;

/// Default socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/office.sock";

/// Returns the socket path from `OFFICE_SOCKET`, or the default.
pub fn socket_path_from_env() -> PathBuf {
    std::env::var("OFFICE_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOCKET_PATH))
}

/// Unix socket server for the office daemon.
pub struct OfficeServer {
    socket_path: PathBuf,
    manager: ManagerHandle,
    cancel_token: CancellationToken,
    connection_counter: AtomicU64,
    subscribers: SubscribersMap,
}

impl OfficeServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        manager: ManagerHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            manager,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the server until the cancellation token fires.
    pub async fn run(&self) -> Result<(), ServerError> {
        // A stale socket from a previous run would make bind fail
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;
        }
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ServerError::SocketSetup {
                    path: self.socket_path.clone(),
                    error: e.to_string(),
                })?;
            }
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| ServerError::SocketSetup {
                path: self.socket_path.clone(),
                error: e.to_string(),
            })?;

        info!(socket = %self.socket_path.display(), "Office server listening");

        self.spawn_event_broadcaster();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    /// Spawns a handler task for one client connection.
    fn handle_connection(&self, stream: tokio::net::UnixStream, connection_number: u64) {
        let (reader, writer) = stream.into_split();
        let manager = self.manager.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler = ConnectionHandler::new(
                reader,
                writer,
                manager,
                Arc::clone(&subscribers),
                connection_number,
            );
            let client_id = handler.run().await;

            let mut subs = subscribers.write().await;
            if subs.remove(&client_id).is_some() {
                debug!(client_id = %client_id, "Removed disconnected subscriber");
            }
        });
    }

    /// Spawns the task that fans manager events out to all clients.
    fn spawn_event_broadcaster(&self) {
        let mut event_rx = self.manager.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Event broadcaster shutting down");
                        break;
                    }

                    result = event_rx.recv() => {
                        match result {
                            Ok(event) => {
                                broadcast_event(&subscribers, &event).await;
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!(skipped = n, "Event broadcaster lagged, skipped events");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                debug!("Event channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    /// Returns the number of connected clients.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    async fn cleanup(&self) {
        self.subscribers.write().await.clear();

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "Failed to remove socket file"
                );
            }
        }

        info!("Server cleanup complete");
    }
}

/// Sends one event to every connected client, pruning dead connections.
async fn broadcast_event(subscribers: &SubscribersMap, event: &ServerEvent) {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize event");
            return;
        }
    };

    let subs = subscribers.read().await;
    let mut failed_clients = Vec::new();

    for (client_id, sub) in subs.iter() {
        let mut writer = sub.writer.lock().await;
        let send_result = timeout(connection::WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        let failed = !matches!(send_result, Ok(Ok(())));
        if failed {
            debug!(client_id = %client_id, "Failed to send event to subscriber");
            failed_clients.push(client_id.clone());
        }
    }
    drop(subs);

    if !failed_clients.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in failed_clients {
            subs.remove(&client_id);
            debug!(client_id = %client_id, "Removed failed subscriber");
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::spawn_manager;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::UnixStream;

    #[test]
    fn test_default_socket_path() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/tmp/office.sock");
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_client_ready_yields_snapshot_over_socket() {
        let dir = tempfile::tempdir().expect("tempdir");
        let socket = dir.path().join("office-test.sock");
        let cancel = CancellationToken::new();
        let manager = spawn_manager(dir.path().to_path_buf(), cancel.clone());
        let server = OfficeServer::new(&socket, manager, cancel.clone());

        let server_task = tokio::spawn(async move { server.run().await });

        // Wait for the listener to come up
        let mut stream = None;
        for _ in 0..50 {
            match UnixStream::connect(&socket).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
        let stream = stream.expect("connect to server socket");
        let (read_half, mut write_half) = stream.into_split();

        write_half
            .write_all(b"{\"type\":\"clientReady\"}\n")
            .await
            .expect("send clientReady");

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read snapshot");
        assert!(line.contains("\"type\":\"existingSessions\""));

        cancel.cancel();
        let _ = server_task.await;
    }
}
