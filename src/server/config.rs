//! Server configuration

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::protocol::constants::*;
use crate::relay::{DEFAULT_BROADCAST_INTERVAL, DEFAULT_SYSTEM_SENDER_NAME, MIN_BROADCAST_INTERVAL};

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// HTTP path the WebSocket upgrade must target
    pub endpoint_path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Upgrade and CONNECT must both complete within this time
    pub connection_timeout: Duration,

    /// Largest STOMP frame (and WebSocket message) accepted
    pub max_frame_size: usize,

    /// Frames buffered per session before the writer applies backpressure
    pub outbound_queue_size: usize,

    /// Period of the full peer/channel snapshot broadcast
    pub broadcast_interval: Duration,

    /// Per-destination broker buffer; slower subscribers skip ahead
    pub topic_capacity: usize,

    /// Display label on system notifications
    pub system_sender_name: String,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            endpoint_path: DEFAULT_ENDPOINT_PATH.to_string(),
            max_connections: 0, // Unlimited
            connection_timeout: Duration::from_secs(10),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue_size: 256,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            topic_capacity: 64,
            system_sender_name: DEFAULT_SYSTEM_SENDER_NAME.to_string(),
            tcp_nodelay: true, // Signaling is latency sensitive
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket endpoint path
    ///
    /// A missing leading slash is added.
    pub fn endpoint_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.endpoint_path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the frame size limit
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size.max(MIN_FRAME_SIZE);
        self
    }

    pub fn outbound_queue_size(mut self, size: usize) -> Self {
        self.outbound_queue_size = size.max(1);
        self
    }

    /// Set the snapshot broadcast period (at least [`MIN_BROADCAST_INTERVAL`])
    pub fn broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval.max(MIN_BROADCAST_INTERVAL);
        self
    }

    pub fn topic_capacity(mut self, capacity: usize) -> Self {
        self.topic_capacity = capacity.max(1);
        self
    }

    pub fn system_sender_name(mut self, name: impl Into<String>) -> Self {
        self.system_sender_name = name.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.endpoint_path, "/signal");
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert_eq!(config.broadcast_interval, Duration::from_secs(5));
        assert_eq!(config.system_sender_name, "System notification");
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 9000);
    }

    #[test]
    fn test_endpoint_path_gets_leading_slash() {
        assert_eq!(ServerConfig::default().endpoint_path("ws").endpoint_path, "/ws");
        assert_eq!(ServerConfig::default().endpoint_path("/ws").endpoint_path, "/ws");
    }

    #[test]
    fn test_frame_size_clamped() {
        let config = ServerConfig::default().max_frame_size(10);

        assert_eq!(config.max_frame_size, MIN_FRAME_SIZE);
    }

    #[test]
    fn test_zero_sizes_clamped() {
        let config = ServerConfig::default().outbound_queue_size(0).topic_capacity(0);

        assert_eq!(config.outbound_queue_size, 1);
        assert_eq!(config.topic_capacity, 1);
    }

    #[test]
    fn test_zero_broadcast_interval_clamped() {
        let config = ServerConfig::default().broadcast_interval(Duration::ZERO);

        assert_eq!(config.broadcast_interval, MIN_BROADCAST_INTERVAL);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .connection_timeout(Duration::from_secs(5))
            .broadcast_interval(Duration::from_secs(1))
            .system_sender_name("Ops");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.broadcast_interval, Duration::from_secs(1));
        assert_eq!(config.system_sender_name, "Ops");
    }
}
