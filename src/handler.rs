use crate::error::ErrorKind;
use crate::message::Inbound;
use crate::state::ConnectionState;
use std::future::Future;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Why a connection closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close code sent by the peer, if a close frame was received
    pub code: Option<u16>,
    /// Close reason text (empty when none was given)
    pub reason: String,
    /// Whether the close handshake completed (close frame or local close)
    pub was_clean: bool,
}

impl CloseReason {
    pub(crate) fn from_frame(frame: Option<CloseFrame>) -> Self {
        match frame {
            Some(frame) => {
                let reason: &str = &frame.reason;
                Self {
                    code: Some(u16::from(frame.code)),
                    reason: reason.to_owned(),
                    was_clean: true,
                }
            }
            None => Self {
                code: None,
                reason: String::new(),
                was_clean: true,
            },
        }
    }

    pub(crate) fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
            was_clean: false,
        }
    }

    pub(crate) fn local() -> Self {
        Self {
            code: Some(1000),
            reason: "closed by client".to_string(),
            was_clean: true,
        }
    }
}

/// Callbacks invoked by a [`ConnectionManager`](crate::ConnectionManager).
///
/// Every method has a no-op default, so a handler only implements the
/// events it cares about. Callbacks run on the connection task one at a
/// time, in the order the events happen. A panicking callback is logged and
/// the connection carries on.
///
/// # Example
///
/// ```ignore
/// use ws_dashboard_feed::{ConnectionHandler, ConnectionState, Inbound};
///
/// struct Printer;
///
/// impl ConnectionHandler for Printer {
///     async fn on_message(&self, message: &Inbound, _state: &ConnectionState) {
///         println!("{:?}", message);
///     }
/// }
/// ```
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Called after the link opens. The state already reflects the open link.
    fn on_open(&self, _state: &ConnectionState) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called for every inbound frame, parsed or raw.
    fn on_message(
        &self,
        _message: &Inbound,
        _state: &ConnectionState,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called when the link closes, before any reconnection is scheduled.
    fn on_close(
        &self,
        _reason: &CloseReason,
        _state: &ConnectionState,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Called when opening fails or the live link reports an error.
    ///
    /// A close always follows, so reconnection is handled there.
    fn on_error(
        &self,
        _kind: ErrorKind,
        _message: &str,
        _state: &ConnectionState,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Handler that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}
