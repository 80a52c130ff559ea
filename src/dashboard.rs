//! Dashboard update feed.
//!
//! [`DashboardUpdates`] connects to the dashboard event stream of the page's
//! own host and folds typed events into three bounded buffers: meter
//! readings, alerts and device status changes.

use crate::buffer::BoundedBuffer;
use crate::config::{ConnectionConfig, DEFAULT_RECONNECT_INTERVAL};
use crate::error::{ConfigError, ErrorKind};
use crate::handler::{CloseReason, ConnectionHandler, NoopHandler};
use crate::manager::ConnectionManager;
use crate::message::{Inbound, Outbound};
use crate::metrics::Metrics;
use crate::state::ConnectionState;
use crate::transport::{Connector, WsConnector};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;
use url::Url;

/// Path of the dashboard event stream
pub const DASHBOARD_PATH: &str = "/ws/dashboard";

/// Reconnect attempts for the dashboard feed, which expects long sessions
pub const DASHBOARD_MAX_RECONNECT_ATTEMPTS: u32 = 10;

pub const METER_READINGS_CAPACITY: usize = 100;
pub const ALERTS_CAPACITY: usize = 50;
pub const DEVICE_STATUS_CAPACITY: usize = 50;

/// Protocol and host of the page the dashboard is served from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    /// Page protocol including the colon, e.g. `https:`
    pub protocol: String,
    /// Host with optional port, e.g. `app.example.com:8443`
    pub host: String,
}

impl PageLocation {
    pub fn new(protocol: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
        }
    }

    /// Take protocol and host from a full page URL
    pub fn parse(page_url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(page_url)
            .map_err(|e| ConfigError::InvalidLocation(format!("{}: {}", page_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidLocation(format!("{}: no host", page_url)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Self::new(format!("{}:", url.scheme()), host))
    }

    /// Whether the page itself was loaded over TLS
    pub fn is_secure(&self) -> bool {
        self.protocol
            .trim_end_matches(':')
            .eq_ignore_ascii_case("https")
    }
}

/// Build `{ws|wss}://{host}/ws/dashboard[?site_id={id}]` for `location`.
///
/// The secure scheme is used iff the page is served over `https:`.
pub fn dashboard_url(location: &PageLocation, site_id: Option<&str>) -> Result<String, ConfigError> {
    if location.host.trim().is_empty() {
        return Err(ConfigError::InvalidLocation("empty host".to_string()));
    }

    let scheme = if location.is_secure() { "wss" } else { "ws" };
    let mut url = Url::parse(&format!("{}://{}{}", scheme, location.host, DASHBOARD_PATH))
        .map_err(|e| ConfigError::InvalidLocation(format!("{}: {}", location.host, e)))?;

    if let Some(id) = site_id {
        url.query_pairs_mut().append_pair("site_id", id);
    }

    Ok(url.into())
}

/// A typed dashboard event: `{ "type": ..., "payload": ... }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum DashboardEvent {
    MeterReading(Value),
    Alert(Value),
    DeviceStatus(Value),
}

impl DashboardEvent {
    /// Recognize a dashboard event. Anything else yields `None`.
    pub fn from_inbound(message: &Inbound) -> Option<Self> {
        let value = message.as_json().filter(|v| v.is_object())?;
        DashboardEvent::deserialize(value).ok()
    }
}

/// The three rolling update buffers
#[derive(Debug, Clone)]
pub struct DashboardBuffers {
    meter_readings: BoundedBuffer<Value>,
    alerts: BoundedBuffer<Value>,
    device_status: BoundedBuffer<Value>,
}

impl Default for DashboardBuffers {
    fn default() -> Self {
        Self {
            meter_readings: BoundedBuffer::new(METER_READINGS_CAPACITY),
            alerts: BoundedBuffer::new(ALERTS_CAPACITY),
            device_status: BoundedBuffer::new(DEVICE_STATUS_CAPACITY),
        }
    }
}

impl DashboardBuffers {
    pub fn apply(&mut self, event: DashboardEvent) {
        match event {
            DashboardEvent::MeterReading(payload) => self.meter_readings.push(payload),
            DashboardEvent::Alert(payload) => self.alerts.push(payload),
            DashboardEvent::DeviceStatus(payload) => self.device_status.push(payload),
        }
    }

    pub fn clear(&mut self) {
        self.meter_readings.clear();
        self.alerts.clear();
        self.device_status.clear();
    }

    pub fn meter_readings(&self) -> &BoundedBuffer<Value> {
        &self.meter_readings
    }

    pub fn alerts(&self) -> &BoundedBuffer<Value> {
        &self.alerts
    }

    pub fn device_status(&self) -> &BoundedBuffer<Value> {
        &self.device_status
    }
}

/// Handler that folds dashboard events into the buffers, then forwards
/// every callback to `inner`.
pub struct DashboardHandler<H: ConnectionHandler = NoopHandler> {
    buffers: Arc<RwLock<DashboardBuffers>>,
    inner: H,
}

impl<H: ConnectionHandler> DashboardHandler<H> {
    pub fn new(buffers: Arc<RwLock<DashboardBuffers>>, inner: H) -> Self {
        Self { buffers, inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: ConnectionHandler> ConnectionHandler for DashboardHandler<H> {
    async fn on_open(&self, state: &ConnectionState) {
        self.inner.on_open(state).await
    }

    async fn on_message(&self, message: &Inbound, state: &ConnectionState) {
        if let Some(event) = DashboardEvent::from_inbound(message) {
            let mut buffers = self.buffers.write();
            buffers.apply(event);
        } else {
            trace!("Ignoring non-dashboard message");
        }
        self.inner.on_message(message, state).await
    }

    async fn on_close(&self, reason: &CloseReason, state: &ConnectionState) {
        self.inner.on_close(reason, state).await
    }

    async fn on_error(&self, kind: ErrorKind, message: &str, state: &ConnectionState) {
        self.inner.on_error(kind, message, state).await
    }
}

/// Settings for a dashboard feed
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub location: PageLocation,
    pub site_id: Option<String>,
    pub reconnect_interval: Duration,
}

impl DashboardConfig {
    pub fn new(location: PageLocation) -> Self {
        Self {
            location,
            site_id: None,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }

    /// Restrict the feed to one site
    pub fn site_id(mut self, site_id: impl Into<String>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Connection settings: always reconnecting, with a higher attempt cap
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let url = dashboard_url(&self.location, self.site_id.as_deref())?;
        let name = match &self.site_id {
            Some(id) => format!("dashboard:{}", id),
            None => "dashboard".to_string(),
        };

        ConnectionConfig::builder(url)
            .name(name)
            .reconnect(true)
            .max_reconnect_attempts(DASHBOARD_MAX_RECONNECT_ATTEMPTS)
            .reconnect_interval(self.reconnect_interval)
            .build()
    }
}

/// Live dashboard feed: a managed connection plus the update buffers.
///
/// Dropping the feed closes its connection.
///
/// # Example
///
/// ```ignore
/// let location = PageLocation::parse("https://app.example.com/sites/42")?;
/// let feed = DashboardUpdates::new(DashboardConfig::new(location).site_id("42"))?;
/// feed.connect();
/// // later
/// for reading in feed.meter_readings() { /* ... */ }
/// ```
pub struct DashboardUpdates<H: ConnectionHandler = NoopHandler, C: Connector = WsConnector> {
    manager: ConnectionManager<DashboardHandler<H>, C>,
    buffers: Arc<RwLock<DashboardBuffers>>,
}

impl DashboardUpdates<NoopHandler, WsConnector> {
    pub fn new(config: DashboardConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, NoopHandler, WsConnector)
    }
}

impl<H: ConnectionHandler> DashboardUpdates<H, WsConnector> {
    /// Feed whose callbacks are also forwarded to `handler`
    pub fn with_handler(config: DashboardConfig, handler: H) -> Result<Self, ConfigError> {
        Self::with_parts(config, handler, WsConnector)
    }
}

impl<H: ConnectionHandler, C: Connector> DashboardUpdates<H, C> {
    pub fn with_parts(config: DashboardConfig, handler: H, connector: C) -> Result<Self, ConfigError> {
        let connection_config = config.connection_config()?;
        let buffers = Arc::new(RwLock::new(DashboardBuffers::default()));
        let handler = DashboardHandler::new(buffers.clone(), handler);

        Ok(Self {
            manager: ConnectionManager::with_connector(connection_config, handler, connector),
            buffers,
        })
    }

    pub fn connect(&self) {
        self.manager.connect();
    }

    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    pub fn send_message(&self, payload: impl Into<Outbound>) -> bool {
        self.manager.send_message(payload)
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.manager.watch()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.manager.metrics()
    }

    /// Address the feed connects to
    pub fn url(&self) -> &str {
        &self.manager.config().url
    }

    /// Buffered meter readings, oldest first
    pub fn meter_readings(&self) -> Vec<Value> {
        self.buffers.read().meter_readings().to_vec()
    }

    /// Buffered alerts, oldest first
    pub fn alerts(&self) -> Vec<Value> {
        self.buffers.read().alerts().to_vec()
    }

    /// Buffered device status events, oldest first
    pub fn device_status(&self) -> Vec<Value> {
        self.buffers.read().device_status().to_vec()
    }

    /// Copy of all three buffers taken under one lock
    pub fn buffers(&self) -> DashboardBuffers {
        self.buffers.read().clone()
    }

    /// Empty all three buffers at once
    pub fn clear_updates(&self) {
        self.buffers.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, MockConnector, Planned, RecordingHandler};
    use serde_json::json;

    fn event(kind: &str, payload: Value) -> Inbound {
        Inbound::Json(json!({"type": kind, "payload": payload}))
    }

    fn handler() -> (DashboardHandler, Arc<RwLock<DashboardBuffers>>) {
        let buffers = Arc::new(RwLock::new(DashboardBuffers::default()));
        (DashboardHandler::new(buffers.clone(), NoopHandler), buffers)
    }

    #[test]
    fn test_dashboard_url_secure_with_site() {
        let location = PageLocation::new("https:", "app.example.com");
        assert_eq!(
            dashboard_url(&location, Some("42")).expect("valid"),
            "wss://app.example.com/ws/dashboard?site_id=42"
        );
    }

    #[test]
    fn test_dashboard_url_insecure_without_site() {
        let location = PageLocation::new("http:", "localhost:5173");
        assert_eq!(
            dashboard_url(&location, None).expect("valid"),
            "ws://localhost:5173/ws/dashboard"
        );
    }

    #[test]
    fn test_dashboard_url_encodes_site_id() {
        let location = PageLocation::new("https:", "app.example.com");
        assert_eq!(
            dashboard_url(&location, Some("north site&x=1")).expect("valid"),
            "wss://app.example.com/ws/dashboard?site_id=north+site%26x%3D1"
        );
    }

    #[test]
    fn test_dashboard_url_rejects_empty_host() {
        let location = PageLocation::new("https:", "");
        assert!(matches!(
            dashboard_url(&location, None),
            Err(ConfigError::InvalidLocation(_))
        ));
    }

    #[test]
    fn test_page_location_parse() {
        let location = PageLocation::parse("https://app.example.com:8443/sites/7?tab=live")
            .expect("valid page URL");
        assert_eq!(location, PageLocation::new("https:", "app.example.com:8443"));
        assert!(location.is_secure());

        let location = PageLocation::parse("http://10.0.0.5/").expect("valid page URL");
        assert!(!location.is_secure());
        assert_eq!(location.host, "10.0.0.5");

        assert!(PageLocation::parse("not a url").is_err());
    }

    #[test]
    fn test_event_recognition() {
        assert_eq!(
            DashboardEvent::from_inbound(&event("meter_reading", json!({"kw": 1.5}))),
            Some(DashboardEvent::MeterReading(json!({"kw": 1.5})))
        );
        assert_eq!(
            DashboardEvent::from_inbound(&event("device_status", json!({"online": false}))),
            Some(DashboardEvent::DeviceStatus(json!({"online": false})))
        );

        // Unknown type, non-object, raw text, missing payload
        assert_eq!(DashboardEvent::from_inbound(&event("weather", json!({}))), None);
        assert_eq!(DashboardEvent::from_inbound(&Inbound::Json(json!([1, 2]))), None);
        assert_eq!(
            DashboardEvent::from_inbound(&Inbound::Text("meter_reading".into())),
            None
        );
        assert_eq!(
            DashboardEvent::from_inbound(&Inbound::Json(json!({"type": "alert"}))),
            None
        );
    }

    #[tokio::test]
    async fn test_buffers_capped_to_most_recent() {
        let (handler, buffers) = handler();
        let state = ConnectionState::default();

        for i in 0..(METER_READINGS_CAPACITY + 25) {
            handler
                .on_message(&event("meter_reading", json!({"seq": i})), &state)
                .await;
        }
        for i in 0..(ALERTS_CAPACITY + 3) {
            handler.on_message(&event("alert", json!({"seq": i})), &state).await;
        }

        let buffers = buffers.read();
        let readings = buffers.meter_readings().to_vec();
        assert_eq!(readings.len(), METER_READINGS_CAPACITY);
        assert_eq!(readings.first(), Some(&json!({"seq": 25})));
        assert_eq!(readings.last(), Some(&json!({"seq": 124})));

        let alerts = buffers.alerts().to_vec();
        assert_eq!(alerts.len(), ALERTS_CAPACITY);
        assert_eq!(alerts.first(), Some(&json!({"seq": 3})));
        assert!(buffers.device_status().is_empty());
    }

    #[tokio::test]
    async fn test_device_status_keeps_newest_in_order() {
        let (handler, buffers) = handler();
        let state = ConnectionState::default();

        for i in 0..(DEVICE_STATUS_CAPACITY + 7) {
            handler
                .on_message(&event("device_status", json!({"seq": i})), &state)
                .await;
        }

        let statuses = buffers.read().device_status().to_vec();
        let expected: Vec<Value> = (7..DEVICE_STATUS_CAPACITY + 7)
            .map(|i| json!({"seq": i}))
            .collect();
        assert_eq!(statuses, expected);
    }

    #[tokio::test]
    async fn test_unrecognized_messages_ignored() {
        let (handler, buffers) = handler();
        let state = ConnectionState::default();

        handler.on_message(&event("firmware", json!({})), &state).await;
        handler.on_message(&Inbound::Json(json!("alert")), &state).await;
        handler.on_message(&Inbound::Text("{broken".into()), &state).await;

        let buffers = buffers.read();
        assert!(buffers.meter_readings().is_empty());
        assert!(buffers.alerts().is_empty());
        assert!(buffers.device_status().is_empty());
    }

    #[test]
    fn test_connection_config() {
        let config = DashboardConfig::new(PageLocation::new("https:", "app.example.com"))
            .site_id("9")
            .connection_config()
            .expect("valid config");

        assert_eq!(config.url, "wss://app.example.com/ws/dashboard?site_id=9");
        assert!(config.reconnect);
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.backoff.initial_delay, Duration::from_millis(3000));
        assert_eq!(config.name, "dashboard:9");
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_folds_live_messages() {
        let connector = MockConnector::new([Planned::Open]);
        let (recorder, mut events) = RecordingHandler::new();
        let config = DashboardConfig::new(PageLocation::new("http:", "localhost"));
        let feed = DashboardUpdates::with_parts(config, recorder, connector.clone())
            .expect("valid config");
        assert_eq!(feed.url(), "ws://localhost/ws/dashboard");

        feed.connect();
        let peer = connector.next_peer().await;
        assert_eq!(events.recv().await, Some(Event::Open));

        peer.send_text(r#"{"type":"meter_reading","payload":{"meter_id":"m1","kw":3.2}}"#);
        peer.send_text(r#"{"type":"alert","payload":{"severity":"high"}}"#);
        peer.send_text(r#"{"type":"device_status","payload":{"device":"gw-1","online":true}}"#);
        peer.send_text("keepalive");
        for _ in 0..4 {
            assert!(matches!(events.recv().await, Some(Event::Message(_))));
        }

        assert_eq!(feed.meter_readings(), vec![json!({"meter_id": "m1", "kw": 3.2})]);
        assert_eq!(feed.alerts(), vec![json!({"severity": "high"})]);
        assert_eq!(
            feed.device_status(),
            vec![json!({"device": "gw-1", "online": true})]
        );
        assert_eq!(
            feed.state().last_message,
            Some(Inbound::Text("keepalive".into()))
        );

        feed.clear_updates();
        let buffers = feed.buffers();
        assert!(buffers.meter_readings().is_empty());
        assert!(buffers.alerts().is_empty());
        assert!(buffers.device_status().is_empty());
        assert!(feed.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_allows_ten_reconnects() {
        let connector = MockConnector::new([]);
        let config = DashboardConfig::new(PageLocation::new("https:", "host"))
            .reconnect_interval(Duration::from_millis(10));
        let feed = DashboardUpdates::with_parts(config, NoopHandler, connector.clone())
            .expect("valid config");
        let mut rx = feed.watch();

        feed.connect();
        let state = rx
            .wait_for(|s| s.is_exhausted())
            .await
            .expect("feed alive")
            .clone();

        assert_eq!(state.reconnect_attempts, 10);
        assert_eq!(connector.attempts().len(), 11);
    }
}
