//! Connection state snapshots and the shared state they are taken from.

use crate::message::Inbound;
use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Lifecycle phase of a managed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Never connected, or stopped by `disconnect()`
    #[default]
    Idle,
    /// Opening the transport
    Connecting,
    /// Link is open
    Connected,
    /// Waiting `delay` before reconnection attempt number `attempt`
    Reconnecting { attempt: u32, delay: Duration },
    /// Link closed and automatic reconnection is disabled
    Disconnected,
    /// Reconnection attempts used up; waits for a manual `connect()`
    Exhausted,
}

impl Phase {
    /// Whether a session is running (opening, open or waiting to retry)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::Connecting | Phase::Connected | Phase::Reconnecting { .. }
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "Idle"),
            Phase::Connecting => write!(f, "Connecting"),
            Phase::Connected => write!(f, "Connected"),
            Phase::Reconnecting { attempt, delay } => {
                write!(f, "Reconnecting (attempt {} in {:?})", attempt, delay)
            }
            Phase::Disconnected => write!(f, "Disconnected"),
            Phase::Exhausted => write!(f, "Exhausted"),
        }
    }
}

/// Point-in-time view of a managed connection.
///
/// Snapshots are values: the manager replaces its copy on every transition
/// and callers only ever see clones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionState {
    /// True between a successful open and the next close or error
    pub is_connected: bool,
    /// Most recent inbound payload
    pub last_message: Option<Inbound>,
    /// Last error description, cleared on successful connection
    pub error: Option<String>,
    /// Reconnect attempts since the last successful connection
    pub reconnect_attempts: u32,
    /// Lifecycle phase
    pub phase: Phase,
}

impl ConnectionState {
    /// Disconnected with reconnection in progress
    pub fn is_reconnecting(&self) -> bool {
        !self.is_connected && self.reconnect_attempts > 0 && self.phase.is_active()
    }

    /// Reconnection attempts have been used up
    pub fn is_exhausted(&self) -> bool {
        self.phase == Phase::Exhausted
    }
}

struct Inner {
    epoch: u64,
    state: ConnectionState,
}

/// State shared between the manager and its session task.
///
/// Every session is tagged with an epoch. Updates from a session whose epoch
/// is no longer current are dropped, so a session still winding down after
/// `disconnect()` cannot touch visible state.
pub(crate) struct SharedState {
    inner: RwLock<Inner>,
    watch_tx: watch::Sender<ConnectionState>,
}

impl SharedState {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(ConnectionState::default());
        Self {
            inner: RwLock::new(Inner {
                epoch: 0,
                state: ConnectionState::default(),
            }),
            watch_tx,
        }
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.inner.read().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().state.is_connected
    }

    pub fn phase(&self) -> Phase {
        self.inner.read().state.phase
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.watch_tx.subscribe()
    }

    /// Apply `f` if `epoch` is still current. Returns whether it was applied.
    pub fn update(&self, epoch: u64, f: impl FnOnce(&mut ConnectionState)) -> bool {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            return false;
        }
        f(&mut inner.state);
        self.watch_tx.send_replace(inner.state.clone());
        true
    }

    /// Start a new session, retiring any previous one. Counters are kept.
    pub fn begin_session(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.state.phase = Phase::Connecting;
        self.watch_tx.send_replace(inner.state.clone());
        inner.epoch
    }

    /// Retire the current session and return to `Idle`.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.state.is_connected = false;
        inner.state.reconnect_attempts = 0;
        inner.state.phase = Phase::Idle;
        self.watch_tx.send_replace(inner.state.clone());
    }
}
