//! Scripted connector and recording handler for tests.

use crate::error::{Error, ErrorKind};
use crate::handler::{CloseReason, ConnectionHandler};
use crate::message::Inbound;
use crate::state::ConnectionState;
use crate::transport::{Connector, Link, WsError};
use http::{HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;

/// Outcome of one connect call
#[derive(Debug, Clone)]
pub(crate) enum Planned {
    Open,
    Fail(String),
    Hang,
}

/// Server side of a mock link
pub(crate) struct MockPeer {
    to_client: mpsc::UnboundedSender<Result<Message, WsError>>,
    from_client: mpsc::UnboundedReceiver<Message>,
}

impl MockPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(Message::Text(text.into())));
    }

    pub fn send_frame(&self, message: Message) {
        let _ = self.to_client.send(Ok(message));
    }

    pub fn close(&self) {
        let _ = self.to_client.send(Ok(Message::Close(None)));
    }

    pub fn fail(&self) {
        let _ = self.to_client.send(Err(WsError::ConnectionClosed));
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.from_client.recv().await
    }
}

struct MockInner {
    plan: Mutex<VecDeque<Planned>>,
    attempts: Mutex<Vec<Instant>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

/// Connector that follows a script. Once the script runs out every
/// connect fails with "connection refused".
#[derive(Clone)]
pub(crate) struct MockConnector {
    inner: Arc<MockInner>,
}

impl MockConnector {
    pub fn new(plan: impl IntoIterator<Item = Planned>) -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockInner {
                plan: Mutex::new(plan.into_iter().collect()),
                attempts: Mutex::new(Vec::new()),
                peers_tx,
                peers_rx: tokio::sync::Mutex::new(peers_rx),
            }),
        }
    }

    /// Times at which connect was called
    pub fn attempts(&self) -> Vec<Instant> {
        self.inner.attempts.lock().clone()
    }

    /// Server side of the next link that opens
    pub async fn next_peer(&self) -> MockPeer {
        self.inner
            .peers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

impl Connector for MockConnector {
    async fn connect(
        &self,
        _url: &str,
        _headers: &[(HeaderName, HeaderValue)],
    ) -> Result<Link, Error> {
        self.inner.attempts.lock().push(Instant::now());
        let planned = self
            .inner
            .plan
            .lock()
            .pop_front()
            .unwrap_or_else(|| Planned::Fail("connection refused".to_string()));

        match planned {
            Planned::Fail(reason) => Err(Error::ConnectionFailed(reason)),
            Planned::Hang => std::future::pending().await,
            Planned::Open => {
                let (to_client, client_rx) = mpsc::unbounded_channel();
                let (client_tx, from_client) = mpsc::unbounded_channel();

                let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                let sink = futures_util::sink::unfold(
                    client_tx,
                    |tx: mpsc::UnboundedSender<Message>, message: Message| async move {
                        tx.send(message).map_err(|_| WsError::ConnectionClosed)?;
                        Ok::<_, WsError>(tx)
                    },
                );

                let _ = self.inner.peers_tx.send(MockPeer {
                    to_client,
                    from_client,
                });
                Ok(Link::new(sink, stream))
            }
        }
    }
}

/// Event seen by a [`RecordingHandler`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Open,
    Message(Inbound),
    Close(CloseReason),
    Error(ErrorKind, String),
}

/// Handler that forwards every callback into a channel
pub(crate) struct RecordingHandler {
    tx: mpsc::UnboundedSender<Event>,
}

impl RecordingHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConnectionHandler for RecordingHandler {
    async fn on_open(&self, _state: &ConnectionState) {
        let _ = self.tx.send(Event::Open);
    }

    async fn on_message(&self, message: &Inbound, _state: &ConnectionState) {
        let _ = self.tx.send(Event::Message(message.clone()));
    }

    async fn on_close(&self, reason: &CloseReason, _state: &ConnectionState) {
        let _ = self.tx.send(Event::Close(reason.clone()));
    }

    async fn on_error(&self, kind: ErrorKind, message: &str, _state: &ConnectionState) {
        let _ = self.tx.send(Event::Error(kind, message.to_string()));
    }
}
