//! Per-session debounce timers.
//!
//! Each session has two single-shot timer slots: "waiting" (quiet with no
//! open tools for a few seconds means the agent is idle) and "permission"
//! (a confirmation-requiring tool pending long enough means it is blocked
//! on a prompt). Arming a slot replaces any previous arm of that slot, and
//! fires carry a generation number so a fire racing its own replacement is
//! recognized as stale and dropped.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel send failures on fire mean the daemon is shutting down and
//!   are silently ignored

use crate::manager::{ManagerCommand, TimerKind};
use office_core::SessionId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

struct ArmedTimer {
    generation: u64,
    task: JoinHandle<()>,
}

impl ArmedTimer {
    fn disarm(self) {
        self.task.abort();
    }
}

/// Both timer slots for one session.
#[derive(Default)]
struct TimerState {
    waiting: Option<ArmedTimer>,
    permission: Option<ArmedTimer>,
}

impl TimerState {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<ArmedTimer> {
        match kind {
            TimerKind::Waiting => &mut self.waiting,
            TimerKind::Permission => &mut self.permission,
        }
    }

    fn is_empty(&self) -> bool {
        self.waiting.is_none() && self.permission.is_none()
    }
}

/// Owns every armed timer in the daemon.
///
/// Lives inside the manager actor; fires are delivered back to the actor
/// as [`ManagerCommand::TimerFired`] rather than running callbacks on the
/// timer task, so all state transitions stay on the actor loop.
pub struct TimerManager {
    tx: mpsc::Sender<ManagerCommand>,
    states: HashMap<SessionId, TimerState>,
    next_generation: u64,
}

impl TimerManager {
    /// Creates a timer manager delivering fires on `tx`.
    pub fn new(tx: mpsc::Sender<ManagerCommand>) -> Self {
        Self {
            tx,
            states: HashMap::new(),
            next_generation: 0,
        }
    }

    /// (Re)arms one slot for a session, disarming any previous timer of
    /// the same kind.
    pub fn arm(&mut self, session_id: SessionId, kind: TimerKind, delay: Duration) {
        self.cancel(session_id, kind);

        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(ManagerCommand::TimerFired {
                    session_id,
                    kind,
                    generation,
                })
                .await;
        });

        trace!(session_id = %session_id, kind = ?kind, generation, "Timer armed");
        let state = self.states.entry(session_id).or_default();
        *state.slot_mut(kind) = Some(ArmedTimer { generation, task });
    }

    /// Disarms one slot without firing. No-op if not armed.
    pub fn cancel(&mut self, session_id: SessionId, kind: TimerKind) {
        if let Some(state) = self.states.get_mut(&session_id) {
            if let Some(armed) = state.slot_mut(kind).take() {
                armed.disarm();
            }
            if state.is_empty() {
                self.states.remove(&session_id);
            }
        }
    }

    /// Disarms both slots for a session.
    pub fn cancel_all(&mut self, session_id: SessionId) {
        self.cancel(session_id, TimerKind::Waiting);
        self.cancel(session_id, TimerKind::Permission);
    }

    /// Validates a delivered fire against the slot's current generation.
    ///
    /// Returns true (and clears the slot) only if this fire belongs to the
    /// live arm; a fire that raced its own cancellation or replacement
    /// through the command queue returns false.
    pub fn acknowledge_fire(
        &mut self,
        session_id: SessionId,
        kind: TimerKind,
        generation: u64,
    ) -> bool {
        let Some(state) = self.states.get_mut(&session_id) else {
            return false;
        };
        let slot = state.slot_mut(kind);
        match slot {
            Some(armed) if armed.generation == generation => {
                *slot = None;
                if state.is_empty() {
                    self.states.remove(&session_id);
                }
                true
            }
            _ => false,
        }
    }

    /// Returns true if the slot is currently armed.
    pub fn is_armed(&self, session_id: SessionId, kind: TimerKind) -> bool {
        self.states
            .get(&session_id)
            .map(|state| match kind {
                TimerKind::Waiting => state.waiting.is_some(),
                TimerKind::Permission => state.permission.is_some(),
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn fired(cmd: ManagerCommand) -> (SessionId, TimerKind, u64) {
        match cmd {
            ManagerCommand::TimerFired {
                session_id,
                kind,
                generation,
            } => (session_id, kind, generation),
            other => panic!("expected TimerFired, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_once() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timers = TimerManager::new(tx);
        let id = SessionId::new(1);

        timers.arm(id, TimerKind::Waiting, Duration::from_secs(5));
        assert!(timers.is_armed(id, TimerKind::Waiting));

        tokio::time::advance(Duration::from_secs(6)).await;
        let (fid, kind, generation) = fired(rx.recv().await.expect("fire"));
        assert_eq!((fid, kind), (id, TimerKind::Waiting));
        assert!(timers.acknowledge_fire(id, kind, generation));
        assert!(!timers.is_armed(id, TimerKind::Waiting));

        // No second fire
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timers = TimerManager::new(tx);
        let id = SessionId::new(2);

        timers.arm(id, TimerKind::Permission, Duration::from_secs(7));
        tokio::time::advance(Duration::from_secs(3)).await;
        timers.arm(id, TimerKind::Permission, Duration::from_secs(7));

        // First arm would have fired at t=7; nothing arrives until the
        // second arm's deadline at t=10.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(3)).await;
        let (_, _, generation) = fired(rx.recv().await.expect("fire"));
        assert!(timers.acknowledge_fire(id, TimerKind::Permission, generation));

        // Exactly one fire total
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timers = TimerManager::new(tx);
        let id = SessionId::new(3);

        timers.arm(id, TimerKind::Waiting, Duration::from_secs(5));
        timers.cancel(id, TimerKind::Waiting);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timers.is_armed(id, TimerKind::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_rejected() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timers = TimerManager::new(tx);
        let id = SessionId::new(4);

        timers.arm(id, TimerKind::Waiting, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        let (_, _, stale_generation) = fired(rx.recv().await.expect("fire"));

        // The fire sat in the queue while the slot was re-armed
        timers.arm(id, TimerKind::Waiting, Duration::from_secs(5));
        assert!(!timers.acknowledge_fire(id, TimerKind::Waiting, stale_generation));
        assert!(timers.is_armed(id, TimerKind::Waiting));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_are_independent() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut timers = TimerManager::new(tx);
        let id = SessionId::new(5);

        timers.arm(id, TimerKind::Waiting, Duration::from_secs(5));
        timers.arm(id, TimerKind::Permission, Duration::from_secs(7));
        timers.cancel(id, TimerKind::Waiting);

        tokio::time::advance(Duration::from_secs(8)).await;
        let (_, kind, _) = fired(rx.recv().await.expect("fire"));
        assert_eq!(kind, TimerKind::Permission);
        assert!(rx.try_recv().is_err());
    }
}
