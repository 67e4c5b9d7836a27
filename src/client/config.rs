//! Client configuration

use std::time::Duration;

use crate::protocol::constants::DEFAULT_MAX_FRAME_SIZE;

/// Signaling client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL, e.g. `ws://localhost:8080/signal`
    pub url: String,

    /// Bearer token presented in CONNECT
    pub token: String,

    /// STOMP subprotocol to request (`None` to request none)
    pub subprotocol: Option<String>,

    /// Upgrade plus CONNECT must complete within this time
    pub connect_timeout: Duration,

    /// How long to wait for a RECEIPT
    pub receipt_timeout: Duration,

    /// Largest inbound frame accepted
    pub max_frame_size: usize,

    /// Buffered events before the reader waits on the application
    pub event_buffer: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            subprotocol: Some("v12.stomp".to_string()),
            connect_timeout: Duration::from_secs(10),
            receipt_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            event_buffer: 256,
        }
    }

    pub fn subprotocol(mut self, subprotocol: Option<&str>) -> Self {
        self.subprotocol = subprotocol.map(str::to_string);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn receipt_timeout(mut self, timeout: Duration) -> Self {
        self.receipt_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("ws://localhost:8080/signal", "t");

        assert_eq!(config.subprotocol.as_deref(), Some("v12.stomp"));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::new("ws://h/signal", "t")
            .subprotocol(None)
            .receipt_timeout(Duration::from_millis(500));

        assert!(config.subprotocol.is_none());
        assert_eq!(config.receipt_timeout, Duration::from_millis(500));
    }
}
