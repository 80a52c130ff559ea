use crate::config::ConnectionConfig;
use crate::error::Error;
use crate::handler::{CloseReason, ConnectionHandler};
use crate::message::Inbound;
use crate::metrics::Metrics;
use crate::state::{Phase, SharedState};
use crate::transport::{redact_url, Connector, Link, WsError};
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

/// Commands that can be sent to a connection
#[derive(Debug)]
pub(crate) enum ConnectionCommand {
    /// Send a message over the open link
    Send(Message),
    /// Skip a pending reconnect delay
    ConnectNow,
    /// Close the link and end the session
    Close,
}

/// Control signal observed while no link is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Stop,
    ConnectNow,
}

/// How a link's message loop ended
enum PumpExit {
    /// The link closed; reconnection rules apply
    Closed(CloseReason),
    /// The session was told to stop
    Stopped,
}

/// One connection session: connects, pumps frames and reconnects with
/// backoff until it is stopped or runs out of attempts.
pub(crate) struct Connection<H: ConnectionHandler, C: Connector> {
    epoch: u64,
    attempts: u32,
    config: Arc<ConnectionConfig>,
    handler: Arc<H>,
    connector: Arc<C>,
    shared: Arc<SharedState>,
    metrics: Arc<Metrics>,
    command_rx: mpsc::Receiver<ConnectionCommand>,
}

impl<H: ConnectionHandler, C: Connector> Connection<H, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        epoch: u64,
        attempts: u32,
        config: Arc<ConnectionConfig>,
        handler: Arc<H>,
        connector: Arc<C>,
        shared: Arc<SharedState>,
        metrics: Arc<Metrics>,
        command_rx: mpsc::Receiver<ConnectionCommand>,
    ) -> Self {
        Self {
            epoch,
            attempts,
            config,
            handler,
            connector,
            shared,
            metrics,
            command_rx,
        }
    }

    /// Run the session, containing any panic so the visible state is not
    /// left claiming a live connection.
    pub async fn run_with_recovery(self) {
        let name = self.config.name.clone();
        let epoch = self.epoch;
        let shared = self.shared.clone();
        let metrics = self.metrics.clone();

        if let Err(panic) = AssertUnwindSafe(self.run()).catch_unwind().await {
            error!(
                "[{}] Connection task PANICKED: {}. Session is dead.",
                name,
                panic_message(panic.as_ref())
            );
            metrics.record_error();
            shared.update(epoch, |s| {
                s.is_connected = false;
                s.phase = Phase::Disconnected;
                s.error = Some("connection task panicked".to_string());
            });
        }
    }

    /// Run the connection loop (reconnects on close)
    pub async fn run(mut self) {
        loop {
            debug!(
                "[{}] Connecting to {} (attempt {})",
                self.config.name,
                redact_url(&self.config.url),
                self.attempts
            );
            self.shared
                .update(self.epoch, |s| s.phase = Phase::Connecting);

            let opened = {
                let open = open_link(self.connector.as_ref(), &self.config);
                tokio::pin!(open);
                loop {
                    tokio::select! {
                        result = &mut open => break Some(result),
                        control = next_control(&mut self.command_rx, &self.metrics, &self.config.name) => {
                            if control == Control::Stop {
                                break None;
                            }
                        }
                    }
                }
            };

            let reason = match opened {
                None => {
                    info!("[{}] Connect cancelled", self.config.name);
                    return;
                }
                Some(Ok(link)) => {
                    self.on_link_open().await;
                    match self.pump(link).await {
                        PumpExit::Closed(reason) => reason,
                        PumpExit::Stopped => {
                            self.on_link_closed(&CloseReason::local()).await;
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    self.report_error(&e).await;
                    CloseReason::abnormal(e.to_string())
                }
            };

            self.on_link_closed(&reason).await;

            if !self.wait_for_reconnect().await {
                debug!("[{}] Session ended", self.config.name);
                return;
            }
        }
    }

    /// Pump frames until the link closes or the session is stopped
    async fn pump(&mut self, link: Link) -> PumpExit {
        let Link {
            mut sink,
            mut stream,
        } = link;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.deliver(Inbound::from_text(&text)).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            self.deliver(Inbound::from_binary(&data)).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            trace!("[{}] Received ping, sending pong", self.config.name);
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                return self.transport_failed(e).await;
                            }
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            info!("[{}] Received close frame", self.config.name);
                            return PumpExit::Closed(CloseReason::from_frame(frame));
                        }
                        Some(Err(e)) => return self.transport_failed(e).await,
                        None => {
                            info!("[{}] WebSocket stream ended", self.config.name);
                            return PumpExit::Closed(CloseReason::abnormal("stream ended"));
                        }
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(ConnectionCommand::Send(msg)) => {
                            if let Err(e) = sink.send(msg).await {
                                return self.transport_failed(e).await;
                            }
                            self.metrics.record_message_sent();
                        }
                        Some(ConnectionCommand::ConnectNow) => {
                            trace!("[{}] Already connected", self.config.name);
                        }
                        Some(ConnectionCommand::Close) | None => {
                            info!("[{}] Closing connection", self.config.name);
                            let _ = sink.send(Message::Close(None)).await;
                            let _ = sink.close().await;
                            return PumpExit::Stopped;
                        }
                    }
                }
            }
        }
    }

    /// Decide whether to reconnect and wait out the backoff delay.
    ///
    /// Returns false when the session should end.
    async fn wait_for_reconnect(&mut self) -> bool {
        if !self.config.reconnect {
            info!("[{}] Reconnect disabled, staying disconnected", self.config.name);
            self.shared
                .update(self.epoch, |s| s.phase = Phase::Disconnected);
            return false;
        }

        if !self.config.should_reconnect(self.attempts) {
            warn!(
                "[{}] Max reconnection attempts ({}) reached",
                self.config.name, self.config.max_reconnect_attempts
            );
            self.metrics.record_exhausted();
            self.shared
                .update(self.epoch, |s| s.phase = Phase::Exhausted);
            return false;
        }

        let delay = self.config.backoff.delay_for_attempt(self.attempts);
        let attempt = self.attempts + 1;
        debug!(
            "[{}] Reconnecting in {:?} (attempt {}/{})",
            self.config.name, delay, attempt, self.config.max_reconnect_attempts
        );
        self.shared.update(self.epoch, |s| {
            s.phase = Phase::Reconnecting { attempt, delay }
        });

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            control = next_control(&mut self.command_rx, &self.metrics, &self.config.name) => {
                match control {
                    Control::Stop => {
                        debug!("[{}] Pending reconnect cancelled", self.config.name);
                        return false;
                    }
                    Control::ConnectNow => {
                        debug!("[{}] Reconnecting now on request", self.config.name);
                    }
                }
            }
        }

        self.attempts = attempt;
        self.shared
            .update(self.epoch, |s| s.reconnect_attempts = attempt);
        self.metrics.record_reconnection();
        true
    }

    async fn on_link_open(&mut self) {
        self.attempts = 0;
        self.metrics.record_connection();
        self.shared.update(self.epoch, |s| {
            s.is_connected = true;
            s.error = None;
            s.reconnect_attempts = 0;
            s.phase = Phase::Connected;
        });
        info!(
            "[{}] Connected to {}",
            self.config.name,
            redact_url(&self.config.url)
        );

        let state = self.shared.snapshot();
        self.guarded("on_open", self.handler.on_open(&state)).await;
    }

    async fn on_link_closed(&self, reason: &CloseReason) {
        self.shared
            .update(self.epoch, |s| s.is_connected = false);
        debug!(
            "[{}] Connection closed (code={:?}, clean={}, reason='{}')",
            self.config.name, reason.code, reason.was_clean, reason.reason
        );

        let state = self.shared.snapshot();
        self.guarded("on_close", self.handler.on_close(reason, &state))
            .await;
    }

    async fn deliver(&self, inbound: Inbound) {
        self.metrics.record_message_received(inbound.is_raw());
        if inbound.is_raw() {
            trace!("[{}] Passing through unparsed frame", self.config.name);
        }

        self.shared
            .update(self.epoch, |s| s.last_message = Some(inbound.clone()));
        let state = self.shared.snapshot();
        self.guarded("on_message", self.handler.on_message(&inbound, &state))
            .await;
    }

    async fn transport_failed(&self, e: WsError) -> PumpExit {
        let err = Error::WebSocket(e);
        self.report_error(&err).await;
        PumpExit::Closed(CloseReason::abnormal(err.to_string()))
    }

    async fn report_error(&self, err: &Error) {
        self.metrics.record_error();
        warn!("[{}] {}", self.config.name, err);

        let message = err.to_string();
        self.shared
            .update(self.epoch, |s| s.error = Some(message.clone()));
        let state = self.shared.snapshot();
        self.guarded("on_error", self.handler.on_error(err.kind(), &message, &state))
            .await;
    }

    /// Await a handler callback, logging instead of unwinding on panic.
    async fn guarded(&self, callback: &str, fut: impl Future<Output = ()>) {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            self.metrics.record_handler_panic();
            error!(
                "[{}] Handler.{} panicked: {}",
                self.config.name,
                callback,
                panic_message(panic.as_ref())
            );
        }
    }
}

/// Open a link, bounded by the configured connect timeout
async fn open_link<C: Connector>(connector: &C, config: &ConnectionConfig) -> Result<Link, Error> {
    let connect = connector.connect(&config.url, &config.headers);
    match config.connect_timeout {
        Some(limit) => timeout(limit, connect)
            .await
            .map_err(|_| Error::ConnectTimeout(limit))?,
        None => connect.await,
    }
}

/// Wait for the next command that matters while no link is open.
///
/// Sends are refused here: messages are never queued for a later link.
async fn next_control(
    rx: &mut mpsc::Receiver<ConnectionCommand>,
    metrics: &Metrics,
    name: &str,
) -> Control {
    loop {
        match rx.recv().await {
            Some(ConnectionCommand::Close) | None => return Control::Stop,
            Some(ConnectionCommand::ConnectNow) => return Control::ConnectNow,
            Some(ConnectionCommand::Send(_)) => {
                metrics.record_send_rejected();
                debug!("[{}] Dropping outbound message: not connected", name);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
