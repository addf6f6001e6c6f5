//! Session manager: the daemon's single owner of session state.
//!
//! Follows the actor pattern: [`ManagerActor`] owns every session, timer,
//! watcher and PTY, and processes [`ManagerCommand`]s from one mpsc queue.
//! Server connections and background tasks only ever hold a
//! [`ManagerHandle`]; nothing mutates session state outside the actor
//! loop.

mod actor;
mod commands;
mod handle;

pub use actor::ManagerActor;
pub use commands::{ManagerCommand, ManagerError, TimerKind};
pub use handle::ManagerHandle;

use office_pty::PtyBridge;
use office_protocol::ServerEvent;
use std::path::PathBuf;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Command queue depth. Producers are tailers, timers and connections;
/// the queue only fills if the actor stalls, and backpressure is the
/// right response then.
const COMMAND_QUEUE_SIZE: usize = 256;

/// Outbound event fan-out depth per subscriber.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Spawns the manager actor and returns a handle to it.
///
/// `default_cwd` is where sessions launch when the client names no
/// working directory. The actor runs until `cancel` fires or a shutdown
/// command arrives.
pub fn spawn_manager(default_cwd: PathBuf, cancel: CancellationToken) -> ManagerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
    let (event_tx, _) = broadcast::channel::<ServerEvent>(EVENT_CHANNEL_SIZE);
    let (pty_tx, pty_rx) = mpsc::unbounded_channel();

    let actor = ManagerActor::new(
        default_cwd,
        cmd_tx.clone(),
        event_tx.clone(),
        PtyBridge::new(pty_tx),
    );
    tokio::spawn(actor.run(cmd_rx, pty_rx, cancel));

    ManagerHandle::new(cmd_tx, event_tx)
}
