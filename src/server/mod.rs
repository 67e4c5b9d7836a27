//! Signaling server
//!
//! `RelayServer` accepts TCP connections, upgrades them to WebSocket on the
//! configured endpoint and runs one `Connection` per session against the
//! shared `SignalHub`.

pub mod config;
pub mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
