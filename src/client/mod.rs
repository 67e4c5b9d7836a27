//! Signaling client implementation
//!
//! Provides the client side of the STOMP-over-WebSocket protocol for:
//! - Tools and bots that take part in signaling (register, call, chat)
//! - End-to-end testing of a running relay
//! - Load and soak testing

pub mod config;
pub mod connector;

pub use config::ClientConfig;
pub use connector::{ClientEvent, SignalClient};
