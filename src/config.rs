use std::time::Duration;

use url::Url;

/// Configuration for the duplex client.
///
/// Immutable once the client is constructed. Durations correspond to the
/// millisecond knobs of the wire protocol configuration surface.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL to connect to (ws:// or wss://)
    pub url: String,
    /// Subprotocols offered during the handshake
    pub subprotocols: Vec<String>,
    /// Maximum automatic reconnect attempts before entering `Failed`
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt
    pub base_backoff: Duration,
    /// Cap on the exponential backoff delay
    pub max_backoff: Duration,
    /// Whether to apply full jitter to backoff delays
    pub backoff_jitter: bool,
    /// Interval between keep-alive envelopes while connected
    pub heartbeat_interval: Duration,
    /// Deadline for a correlated response to arrive
    pub request_timeout: Duration,
    /// Maximum number of buffered outbound messages
    pub max_queue_size: usize,
    /// Queued messages older than this are dropped at drain time
    pub max_queued_message_age: Duration,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a new builder for the given target URL.
    pub fn builder(url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                url: url.into(),
                subprotocols: Vec::new(),
                max_reconnect_attempts: 5,
                base_backoff: Duration::from_millis(1000),
                max_backoff: Duration::from_secs(30),
                backoff_jitter: false,
                heartbeat_interval: Duration::from_secs(30),
                request_timeout: Duration::from_secs(10),
                max_queue_size: 100,
                max_queued_message_age: Duration::from_secs(60),
                connect_timeout: Duration::from_secs(10),
            },
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the subprotocols offered during the handshake
    pub fn subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.config.subprotocols = subprotocols;
        self
    }

    /// Set the maximum automatic reconnect attempts
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the base backoff delay
    pub fn base_backoff(mut self, delay: Duration) -> Self {
        self.config.base_backoff = delay;
        self
    }

    /// Set the backoff delay cap
    pub fn max_backoff(mut self, delay: Duration) -> Self {
        self.config.max_backoff = delay;
        self
    }

    /// Enable or disable full jitter on backoff delays
    pub fn backoff_jitter(mut self, enabled: bool) -> Self {
        self.config.backoff_jitter = enabled;
        self
    }

    /// Set the heartbeat interval
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the per-request response deadline
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the outbound queue capacity
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    /// Set the maximum age of a queued message
    pub fn max_queued_message_age(mut self, age: Duration) -> Self {
        self.config.max_queued_message_age = age;
        self
    }

    /// Set the connection establishment timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Build the configuration with validation.
    ///
    /// Returns an error for invalid configurations (e.g., an unparseable
    /// URL or `max_queue_size` of 0).
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let url = Url::parse(&self.config.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", self.config.url, e)))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ConfigError::InvalidUrl(format!(
                "unsupported scheme '{}', expected ws or wss",
                url.scheme()
            )));
        }

        if self.config.max_backoff < self.config.base_backoff {
            return Err(ConfigError::InvalidBackoff(
                "max_backoff must be >= base_backoff".to_string(),
            ));
        }

        if self.config.base_backoff.is_zero() {
            return Err(ConfigError::InvalidBackoff(
                "base_backoff must be > 0".to_string(),
            ));
        }

        if self.config.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "heartbeat_interval must be > 0".to_string(),
            ));
        }

        if self.config.request_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "request_timeout must be > 0".to_string(),
            ));
        }

        if self.config.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueue(
                "max_queue_size cannot be 0".to_string(),
            ));
        }

        Ok(self.config)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid target URL
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    /// Invalid backoff configuration
    #[error("Invalid backoff configuration: {0}")]
    InvalidBackoff(String),
    /// Invalid timer interval
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid queue configuration
    #[error("Invalid queue configuration: {0}")]
    InvalidQueue(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ClientConfig::builder("wss://realtime.example.com/ws")
            .build()
            .expect("valid config");

        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.base_backoff, Duration::from_millis(1000));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
        assert!(!config.backoff_jitter);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.max_queue_size, 100);
        assert_eq!(config.max_queued_message_age, Duration::from_secs(60));
    }

    #[test]
    fn test_builder_overrides() {
        let config = ClientConfig::builder("ws://localhost:9000/rt")
            .subprotocols(vec!["v1.chat".to_string()])
            .max_reconnect_attempts(3)
            .max_queue_size(10)
            .request_timeout(Duration::from_secs(5))
            .build()
            .expect("valid config");

        assert_eq!(config.subprotocols, vec!["v1.chat".to_string()]);
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.max_queue_size, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(ClientConfig::builder("not a url").build().is_err());
        assert!(ClientConfig::builder("https://example.com").build().is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let result = ClientConfig::builder("ws://localhost/ws")
            .base_backoff(Duration::from_secs(60))
            .max_backoff(Duration::from_secs(30))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_zero_queue() {
        let result = ClientConfig::builder("ws://localhost/ws")
            .max_queue_size(0)
            .build();
        assert!(result.is_err());
    }
}
