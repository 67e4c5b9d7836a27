//! Signaling relay
//!
//! ```text
//!   SEND /app/call/bob ──► Route::parse ──► RelayRouter::relay ──► Broker
//!                                              │                 /topic/call/bob
//!                                              └─ presence check (call only)
//!
//!   every 5s: PresenceBroadcaster::tick ──► /topic/peers, /topic/channels
//! ```

pub mod broadcaster;
pub mod route;
pub mod router;

pub use broadcaster::{PresenceBroadcaster, DEFAULT_BROADCAST_INTERVAL, MIN_BROADCAST_INTERVAL};
pub use route::{channel_topic, RelayKind, Route, CHANNELS_TOPIC, PEERS_TOPIC};
pub use router::{
    RelayOutcome, RelayRouter, SystemNotification, DEFAULT_SYSTEM_SENDER_NAME, SYSTEM_SENDER_ID,
};
