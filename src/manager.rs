use crate::config::ConnectionConfig;
use crate::Result;
use crate::connection::{Connection, ConnectionCommand};
use crate::handler::ConnectionHandler;
use crate::message::Outbound;
use crate::metrics::Metrics;
use crate::state::{ConnectionState, Phase, SharedState};
use crate::transport::{Connector, WsConnector};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default channel buffer size
const DEFAULT_CHANNEL_SIZE: usize = 100;

/// The running session task and its command channel
struct Session {
    command_tx: mpsc::Sender<ConnectionCommand>,
    handle: JoinHandle<()>,
}

/// Owns one logical WebSocket connection and keeps it alive.
///
/// `connect()` starts a session task that opens the link, delivers frames
/// to the handler and reconnects with exponential backoff when the link
/// closes, up to `max_reconnect_attempts`. All methods return immediately;
/// progress is observed through the handler callbacks, [`state`](Self::state)
/// and [`watch`](Self::watch).
///
/// Methods that start a session must be called from within a Tokio runtime.
///
/// # Thread Safety
///
/// `ConnectionManager` is `Send + Sync`. Internal state is protected by
/// `parking_lot` locks which do not poison on panic.
pub struct ConnectionManager<H: ConnectionHandler, C: Connector = WsConnector> {
    config: Arc<ConnectionConfig>,
    handler: Arc<H>,
    connector: Arc<C>,
    shared: Arc<SharedState>,
    metrics: Arc<Metrics>,
    session: Mutex<Option<Session>>,
}

impl<H: ConnectionHandler> ConnectionManager<H, WsConnector> {
    /// Create a manager that connects over the network
    pub fn new(config: ConnectionConfig, handler: H) -> Self {
        Self::with_connector(config, handler, WsConnector)
    }
}

impl<H: ConnectionHandler, C: Connector> ConnectionManager<H, C> {
    /// Create a manager that opens links through `connector`
    pub fn with_connector(config: ConnectionConfig, handler: H, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            handler: Arc::new(handler),
            connector: Arc::new(connector),
            shared: Arc::new(SharedState::new()),
            metrics: Arc::new(Metrics::new()),
            session: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get a reference to the handler
    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    /// Get the metrics for this manager
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.snapshot()
    }

    /// Whether the link is currently open
    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Receiver that observes every state transition
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    /// Open the connection.
    ///
    /// Does nothing while a link is open or being opened. While a reconnect
    /// delay is pending, the pending attempt is made immediately. Otherwise a
    /// new session starts; the reconnect counter is left as it was, so a
    /// manual connect after exhaustion gets no further automatic retries
    /// unless it succeeds.
    pub fn connect(&self) {
        let mut session = self.session.lock();

        if let Some(running) = session.as_ref() {
            if !running.handle.is_finished() {
                match self.shared.phase() {
                    phase @ (Phase::Connecting | Phase::Connected) => {
                        debug!("[{}] connect() ignored: {}", self.config.name, phase);
                        return;
                    }
                    Phase::Reconnecting { .. } => {
                        if running
                            .command_tx
                            .try_send(ConnectionCommand::ConnectNow)
                            .is_err()
                        {
                            warn!(
                                "[{}] Could not skip reconnect delay: command channel full",
                                self.config.name
                            );
                        }
                        return;
                    }
                    // Session is winding down and will be replaced
                    Phase::Idle | Phase::Disconnected | Phase::Exhausted => {}
                }
            }
        }

        // Let a winding-down session finish its callbacks; begin_session retires its epoch
        if let Some(old) = session.take() {
            stop_session(old);
        }

        let epoch = self.shared.begin_session();
        let attempts = self.shared.snapshot().reconnect_attempts;
        let (command_tx, command_rx) = mpsc::channel(DEFAULT_CHANNEL_SIZE);

        let connection = Connection::new(
            epoch,
            attempts,
            self.config.clone(),
            self.handler.clone(),
            self.connector.clone(),
            self.shared.clone(),
            self.metrics.clone(),
            command_rx,
        );
        let handle = tokio::spawn(connection.run_with_recovery());

        *session = Some(Session { command_tx, handle });
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Resets the reconnect counter and returns to `Idle`. Safe to call when
    /// already disconnected.
    pub fn disconnect(&self) {
        // Reset under the session lock so a concurrent connect() cannot start
        // a session whose epoch the reset then invalidates
        let mut guard = self.session.lock();
        let session = guard.take();
        self.shared.reset();
        drop(guard);

        if let Some(session) = session {
            info!("[{}] Disconnecting", self.config.name);
            stop_session(session);
        }
    }

    /// Send a payload over the open link.
    ///
    /// Strings are sent as-is, JSON values as their serialized text. Returns
    /// false without side effects when no link is open; nothing is queued.
    pub fn send_message(&self, payload: impl Into<Outbound>) -> bool {
        if !self.shared.is_connected() {
            debug!("[{}] send_message() while disconnected", self.config.name);
            self.metrics.record_send_rejected();
            return false;
        }

        let message = payload.into().into_message();
        let session = self.session.lock();
        let Some(running) = session.as_ref() else {
            self.metrics.record_send_rejected();
            return false;
        };

        match running.command_tx.try_send(ConnectionCommand::Send(message)) {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}] Failed to queue message: {}", self.config.name, e);
                self.metrics.record_send_rejected();
                false
            }
        }
    }

    /// Serialize `value` to JSON and send it. See [`send_message`](Self::send_message).
    ///
    /// A value that cannot be serialized is counted as an error and not sent.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match encode_json(value) {
            Ok(value) => self.send_message(value),
            Err(e) => {
                self.metrics.record_error();
                warn!(
                    "[{}] Failed to send message ({:?}): {}",
                    self.config.name,
                    e.kind(),
                    e
                );
                false
            }
        }
    }
}

fn encode_json<T: Serialize>(value: &T) -> Result<Outbound> {
    Ok(Outbound::Json(serde_json::to_value(value)?))
}

impl<H: ConnectionHandler, C: Connector> Drop for ConnectionManager<H, C> {
    fn drop(&mut self) {
        // Stop the session so it does not outlive the manager
        if let Some(session) = self.session.get_mut().take() {
            stop_session(session);
        }
    }
}

fn stop_session(session: Session) {
    if session
        .command_tx
        .try_send(ConnectionCommand::Close)
        .is_err()
    {
        session.handle.abort();
    }
}
