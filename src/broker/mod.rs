//! In-process topic broker
//!
//! The broker is the transport's publish/subscribe primitive. Every
//! `/topic/...` destination gets its own `tokio::sync::broadcast` channel,
//! created lazily on first subscription. Publishing to a destination nobody
//! subscribes to is a no-op.
//!
//! ```text
//!     RelayRouter / PresenceBroadcaster
//!                  │ publish(destination, body)
//!                  ▼
//!         ┌─────────────────────────────┐
//!         │ Broker                      │
//!         │  topics: DashMap<String,    │
//!         │    broadcast::Sender>       │
//!         └──────┬──────────────┬───────┘
//!                │              │
//!                ▼              ▼
//!        [subscription]   [subscription]
//!        session 1        session 7
//!        MESSAGE frame    MESSAGE frame
//! ```
//!
//! Bodies are `bytes::Bytes`, so fan-out to many subscribers shares a single
//! allocation.

pub mod store;

use bytes::Bytes;

pub use store::{Broker, Delivery};

/// Publish side of the transport
///
/// The relay core only ever needs this one operation, which keeps it
/// testable against a recording implementation.
pub trait Publisher: Send + Sync {
    /// Publish `body` to every current subscriber of `destination`
    ///
    /// Returns how many subscribers the message reached. Zero is not an error.
    fn publish(&self, destination: &str, body: Bytes) -> usize;
}
