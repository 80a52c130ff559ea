//! Example: following a site's live dashboard feed
//!
//! Connects to the dashboard stream of the host the page was served from,
//! logs every event as it arrives and prints the buffered updates at the end.
//!
//! Run with: cargo run --example dashboard -- https://app.example.com/sites/42 42

use ws_dashboard_feed::{
    CloseReason, ConnectionHandler, ConnectionState, DashboardConfig, DashboardEvent,
    DashboardUpdates, ErrorKind, Inbound, PageLocation,
};
use tracing::{info, warn, Level};

/// Logs dashboard traffic
struct LoggingHandler;

impl ConnectionHandler for LoggingHandler {
    async fn on_open(&self, state: &ConnectionState) {
        info!("Dashboard connected ({})", state.phase);
    }

    async fn on_message(&self, message: &Inbound, _state: &ConnectionState) {
        match DashboardEvent::from_inbound(message) {
            Some(DashboardEvent::MeterReading(payload)) => info!("Meter reading: {}", payload),
            Some(DashboardEvent::Alert(payload)) => warn!("Alert: {}", payload),
            Some(DashboardEvent::DeviceStatus(payload)) => info!("Device status: {}", payload),
            None => info!("Other message: {:?}", message),
        }
    }

    async fn on_close(&self, reason: &CloseReason, state: &ConnectionState) {
        info!(
            "Dashboard closed: {:?} (reconnect attempts: {})",
            reason, state.reconnect_attempts
        );
    }

    async fn on_error(&self, kind: ErrorKind, message: &str, _state: &ConnectionState) {
        warn!("Dashboard error ({:?}): {}", kind, message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let mut args = std::env::args().skip(1);
    let page = args
        .next()
        .unwrap_or_else(|| "http://localhost:8000/".to_string());
    let site_id = args.next();

    let mut config = DashboardConfig::new(PageLocation::parse(&page)?);
    if let Some(id) = site_id {
        config = config.site_id(id);
    }

    let feed = DashboardUpdates::with_handler(config, LoggingHandler)?;
    info!("Connecting to {}", feed.url());
    feed.connect();

    let mut state = feed.watch();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            info!("State: {}", state.borrow_and_update().phase);
        }
    });

    info!("Running for 30 seconds...");
    tokio::time::sleep(std::time::Duration::from_secs(30)).await;

    let buffers = feed.buffers();
    info!("Buffered updates:");
    info!("  Meter readings: {}", buffers.meter_readings().len());
    info!("  Alerts: {}", buffers.alerts().len());
    info!("  Device status: {}", buffers.device_status().len());

    let snapshot = feed.metrics().snapshot();
    info!("Final metrics:");
    info!("  Connections: {}", snapshot.connections_total);
    info!("  Reconnections: {}", snapshot.reconnections_total);
    info!("  Messages received: {}", snapshot.messages_received_total);
    info!("  Errors: {}", snapshot.errors_total);

    feed.disconnect();
    drop(feed);
    watcher.abort();
    info!("Feed stopped");

    Ok(())
}
