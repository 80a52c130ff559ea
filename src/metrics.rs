use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for observability
///
/// Counters for one managed connection. Use `snapshot()` to get a
/// point-in-time view of all metrics, or the individual getters.
///
/// # Example
/// ```ignore
/// let metrics = manager.metrics();
/// println!("Reconnections: {}", metrics.reconnections());
/// let snapshot = metrics.snapshot();
/// ```
#[derive(Debug, Default)]
pub struct Metrics {
    connections_total: AtomicU64,
    reconnections_total: AtomicU64,
    messages_received_total: AtomicU64,
    raw_messages_total: AtomicU64,
    messages_sent_total: AtomicU64,
    sends_rejected_total: AtomicU64,
    errors_total: AtomicU64,
    handler_panics_total: AtomicU64,
    exhaustions_total: AtomicU64,
}

impl Metrics {
    /// Create a new Metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Getters ==========

    /// Get total connections established
    pub fn connections(&self) -> u64 {
        self.connections_total.load(Ordering::Relaxed)
    }

    /// Get total reconnection attempts started
    pub fn reconnections(&self) -> u64 {
        self.reconnections_total.load(Ordering::Relaxed)
    }

    /// Get total messages received
    pub fn messages_received(&self) -> u64 {
        self.messages_received_total.load(Ordering::Relaxed)
    }

    /// Get total messages passed through without parsing
    pub fn raw_messages(&self) -> u64 {
        self.raw_messages_total.load(Ordering::Relaxed)
    }

    /// Get total messages written to the link
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent_total.load(Ordering::Relaxed)
    }

    /// Get total sends refused because no link was open
    pub fn sends_rejected(&self) -> u64 {
        self.sends_rejected_total.load(Ordering::Relaxed)
    }

    /// Get total transport and connect errors
    pub fn errors(&self) -> u64 {
        self.errors_total.load(Ordering::Relaxed)
    }

    /// Get total handler callback panics
    pub fn handler_panics(&self) -> u64 {
        self.handler_panics_total.load(Ordering::Relaxed)
    }

    /// Get number of times reconnection gave up
    pub fn exhaustions(&self) -> u64 {
        self.exhaustions_total.load(Ordering::Relaxed)
    }

    // ========== Recording methods (called internally) ==========

    pub(crate) fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnection(&self) {
        self.reconnections_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self, raw: bool) {
        self.messages_received_total.fetch_add(1, Ordering::Relaxed);
        if raw {
            self.raw_messages_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_message_sent(&self) {
        self.messages_sent_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_rejected(&self) {
        self.sends_rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_handler_panic(&self) {
        self.handler_panics_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhaustions_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a point-in-time snapshot of all metrics for export
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Acquire),
            reconnections_total: self.reconnections_total.load(Ordering::Acquire),
            messages_received_total: self.messages_received_total.load(Ordering::Acquire),
            raw_messages_total: self.raw_messages_total.load(Ordering::Acquire),
            messages_sent_total: self.messages_sent_total.load(Ordering::Acquire),
            sends_rejected_total: self.sends_rejected_total.load(Ordering::Acquire),
            errors_total: self.errors_total.load(Ordering::Acquire),
            handler_panics_total: self.handler_panics_total.load(Ordering::Acquire),
            exhaustions_total: self.exhaustions_total.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub reconnections_total: u64,
    pub messages_received_total: u64,
    pub raw_messages_total: u64,
    pub messages_sent_total: u64,
    pub sends_rejected_total: u64,
    pub errors_total: u64,
    pub handler_panics_total: u64,
    pub exhaustions_total: u64,
}
