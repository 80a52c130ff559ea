//! Inbound and outbound payloads.
//!
//! Inbound frames are parsed as JSON when possible. A frame that does not
//! parse is passed through unchanged as raw text (or raw bytes for binary
//! frames); that is a normal outcome, not an error.

use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// A message received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Frame parsed as JSON
    Json(Value),
    /// Text frame that is not valid JSON, unchanged
    Text(String),
    /// Binary frame that is not valid JSON, unchanged
    Binary(Vec<u8>),
}

impl Inbound {
    /// Parse a text frame, falling back to the raw text
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Inbound::Json(value),
            Err(_) => Inbound::Text(text.to_owned()),
        }
    }

    /// Parse a binary frame, falling back to the raw bytes
    pub fn from_binary(data: &[u8]) -> Self {
        match serde_json::from_slice(data) {
            Ok(value) => Inbound::Json(value),
            Err(_) => Inbound::Binary(data.to_vec()),
        }
    }

    /// The parsed JSON value, if this frame parsed
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Inbound::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Whether the frame was passed through without parsing
    pub fn is_raw(&self) -> bool {
        !matches!(self, Inbound::Json(_))
    }
}

/// A payload to send to the server
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Sent as-is
    Text(String),
    /// Serialized to JSON text before sending
    Json(Value),
}

impl Outbound {
    /// The textual wire form of this payload
    pub fn into_text(self) -> String {
        match self {
            Outbound::Text(text) => text,
            Outbound::Json(value) => value.to_string(),
        }
    }

    pub(crate) fn into_message(self) -> Message {
        Message::Text(self.into_text().into())
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Outbound::Text(text.to_owned())
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Outbound::Text(text)
    }
}

impl From<Value> for Outbound {
    fn from(value: Value) -> Self {
        Outbound::Json(value)
    }
}
