//! # ws-dashboard-feed
//!
//! A WebSocket connection manager with automatic reconnection, plus a live
//! dashboard feed built on top of it.
//!
//! ## Features
//!
//! - **Auto-reconnection** with exponential backoff and a bounded attempt count
//! - **Observable state** via snapshots and a `watch` channel
//! - **Lenient decoding**: JSON when it parses, raw text or bytes otherwise
//! - **Panic isolation** for user callbacks
//! - **Dashboard feed** folding meter readings, alerts and device status into
//!   bounded buffers
//! - **Metrics** for observability
//!
//! ## Example
//!
//! ```ignore
//! use ws_dashboard_feed::{ConnectionConfig, ConnectionHandler, ConnectionManager};
//!
//! struct MyHandler;
//!
//! impl ConnectionHandler for MyHandler {
//!     // ... override the callbacks you need
//! }
//!
//! let config = ConnectionConfig::builder("wss://example.com/stream")
//!     .max_reconnect_attempts(5)
//!     .build()?;
//!
//! let manager = ConnectionManager::new(config, MyHandler);
//! manager.connect();
//! manager.send_message(r#"{"op":"subscribe"}"#);
//! ```

mod buffer;
mod config;
mod connection;
mod dashboard;
mod error;
mod handler;
mod manager;
mod message;
mod metrics;
mod state;
mod transport;

#[cfg(test)]
mod testing;

pub use buffer::BoundedBuffer;
pub use config::{
    BackoffConfig, ConnectionConfig, ConnectionConfigBuilder, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL,
};
pub use dashboard::{
    dashboard_url, DashboardBuffers, DashboardConfig, DashboardEvent, DashboardHandler,
    DashboardUpdates, PageLocation, ALERTS_CAPACITY, DASHBOARD_MAX_RECONNECT_ATTEMPTS,
    DASHBOARD_PATH, DEVICE_STATUS_CAPACITY, METER_READINGS_CAPACITY,
};
pub use error::{ConfigError, Error, ErrorKind};
pub use handler::{CloseReason, ConnectionHandler, NoopHandler};
pub use manager::ConnectionManager;
pub use message::{Inbound, Outbound};
pub use metrics::{Metrics, MetricsSnapshot};
pub use state::{ConnectionState, Phase};
pub use transport::{Connector, FrameSink, FrameStream, Link, WsConnector, WsError};

// Re-export http types for connection headers
pub use http::{HeaderName, HeaderValue};

/// Result type for ws-dashboard-feed operations
pub type Result<T> = std::result::Result<T, Error>;
