//! # rendezvous-rs
//!
//! Peer presence registry and signaling relay for peer-to-peer apps.
//!
//! Clients connect over STOMP 1.2 on a WebSocket, announce themselves as
//! peers, and exchange the small control messages needed to set up direct
//! sessions with each other: call offers and answers, SDP, ICE candidates,
//! chat and file-transfer negotiation. Media never passes through here.
//!
//! ```text
//!   client ──ws──► RelayServer ──► Connection ──► SignalHub
//!                                                   ├─ PeerRegistry
//!                                                   ├─ ChannelRegistry
//!                                                   ├─ RelayRouter ──► Broker ──► subscribers
//!                                                   └─ PresenceBroadcaster (periodic)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rendezvous_rs::auth::{Identity, Role, StaticIdentityProvider};
//! use rendezvous_rs::{RelayServer, ServerConfig};
//!
//! # async fn example() -> rendezvous_rs::error::Result<()> {
//! let provider = StaticIdentityProvider::new();
//! provider.insert("secret-token", Identity::new("alice", Role::User));
//!
//! let server = RelayServer::new(ServerConfig::default(), provider);
//! server.run().await
//! # }
//! ```

pub mod admin;
pub mod auth;
pub mod broker;
pub mod client;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;
pub mod session;
pub mod stats;

#[cfg(test)]
mod testing;

pub use admin::Admin;
pub use auth::{Identity, IdentityProvider, Role, StaticIdentityProvider};
pub use error::{Error, Result};
pub use hub::SignalHub;
pub use registry::{Peer, PublicChannel};
pub use server::{RelayServer, ServerConfig};
pub use stats::ServerStats;
