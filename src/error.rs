use std::time::Duration;
use thiserror::Error;

/// Categorizes errors for handler decision-making.
///
/// This is a lightweight, cloneable representation of the error type
/// that can be passed to handler callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// WebSocket protocol or transport error on a live link
    WebSocket,
    /// Connection could not be established (DNS, refused, TLS, handshake)
    ConnectionFailed,
    /// Opening the connection took longer than the configured timeout
    Timeout,
    /// The configured address is not a usable WebSocket URL
    InvalidUrl,
    /// Outbound payload could not be serialized
    Serialization,
}

/// Errors that can occur in ws-dashboard-feed
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection could not be opened
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Opening the connection timed out
    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The target address could not be used
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Payload serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get the kind of this error for decision-making.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WebSocket(_) => ErrorKind::WebSocket,
            Error::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Error::ConnectTimeout(_) => ErrorKind::Timeout,
            Error::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl ToString) -> Self {
        Error::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid dashboard page location
    #[error("Invalid page location: {0}")]
    InvalidLocation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            Error::ConnectionFailed("refused".into()).kind(),
            ErrorKind::ConnectionFailed
        );
        assert_eq!(
            Error::ConnectTimeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            Error::invalid_url("nope", "relative URL without a base").kind(),
            ErrorKind::InvalidUrl
        );

        let err = serde_json::from_str::<u32>("nope").expect_err("not a number");
        assert_eq!(Error::from(err).kind(), ErrorKind::Serialization);
    }

    #[test]
    fn test_error_display() {
        let err = Error::invalid_url("ftp://host", "unsupported scheme");
        assert_eq!(
            err.to_string(),
            "Invalid URL 'ftp://host': unsupported scheme"
        );

        let err = ConfigError::InvalidBackoff("multiplier must be > 0".into());
        assert_eq!(
            err.to_string(),
            "Invalid backoff configuration: multiplier must be > 0"
        );
    }
}
