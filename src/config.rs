use crate::error::ConfigError;
use http::{HeaderName, HeaderValue};
use std::time::Duration;

/// Default base interval between reconnection attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of reconnection attempts before giving up
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default timeout for opening a connection (TCP, TLS and handshake)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a single managed connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Label used as the prefix of every log line for this connection
    pub name: String,
    /// Target WebSocket address (`ws://` or `wss://`)
    pub url: String,
    /// Reconnect automatically after the connection closes
    pub reconnect: bool,
    /// Maximum reconnection attempts since the last successful connection
    pub max_reconnect_attempts: u32,
    /// Backoff settings for reconnection
    pub backoff: BackoffConfig,
    /// Upper bound on opening the connection. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Extra headers sent with the upgrade request (e.g. authentication)
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl ConnectionConfig {
    /// Create a new builder targeting `url`
    pub fn builder(url: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: ConnectionConfig {
                name: "ws".to_string(),
                url: url.into(),
                reconnect: true,
                max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
                backoff: BackoffConfig::default(),
                connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
                headers: Vec::new(),
            },
        }
    }

    /// Whether another reconnect may be scheduled after `attempts` attempts
    pub fn should_reconnect(&self, attempts: u32) -> bool {
        self.reconnect && attempts < self.max_reconnect_attempts
    }
}

/// Builder for ConnectionConfig
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Set the log label for this connection
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Enable or disable automatic reconnection
    pub fn reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect = enabled;
        self
    }

    /// Set the base reconnect interval (delay before the first retry)
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.backoff.initial_delay = interval;
        self
    }

    /// Set the maximum number of reconnection attempts
    pub fn max_reconnect_attempts(mut self, max: u32) -> Self {
        self.config.max_reconnect_attempts = max;
        self
    }

    /// Set the full backoff configuration
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.config.backoff = config;
        self
    }

    /// Set the connect timeout (`None` disables it)
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Add a header to the upgrade request
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.push((name, value));
        self
    }

    /// Build the configuration with validation.
    ///
    /// The URL itself is not validated here: an unusable address is reported
    /// through the connection state when `connect()` is called.
    pub fn build(self) -> Result<ConnectionConfig, ConfigError> {
        let backoff = &self.config.backoff;

        if backoff.multiplier <= 0.0 || !backoff.multiplier.is_finite() {
            return Err(ConfigError::InvalidBackoff(
                "multiplier must be a finite value > 0".to_string(),
            ));
        }

        if let Some(max_delay) = backoff.max_delay {
            if max_delay < backoff.initial_delay {
                return Err(ConfigError::InvalidBackoff(
                    "max_delay must be >= initial_delay".to_string(),
                ));
            }
        }

        Ok(self.config)
    }
}

/// Backoff configuration for reconnection
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first reconnection attempt
    pub initial_delay: Duration,
    /// Multiplier applied per attempt (2.0 doubles the delay each time)
    pub multiplier: f64,
    /// Optional ceiling on the computed delay. `None` leaves growth unbounded;
    /// the attempt cap is what eventually stops it.
    pub max_delay: Option<Duration>,
    /// Whether to add random jitter to delays
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_RECONNECT_INTERVAL,
            multiplier: 2.0,
            max_delay: None,
            jitter: false,
        }
    }
}

impl BackoffConfig {
    /// Calculate the delay for a given attempt number (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped_delay = match self.max_delay {
            Some(max) => base_delay.min(max.as_millis() as f64),
            None => base_delay,
        };

        if self.jitter {
            // Full jitter: random value between 0 and capped_delay
            let jittered = rand::random::<f64>() * capped_delay;
            Duration::from_millis(jittered as u64)
        } else {
            Duration::from_millis(capped_delay as u64)
        }
    }
}
