//! Presence and channel registries
//!
//! All presence state is ephemeral and held here. Nothing is persisted; a
//! restart starts from empty registries and clients converge again through
//! re-registration and the periodic broadcast.
//!
//! ```text
//!        register / disconnect              channel/register, admin
//!               │                                   │
//!               ▼                                   ▼
//!   ┌───────────────────────────┐     ┌───────────────────────────┐
//!   │ PeerRegistry              │     │ ChannelRegistry           │
//!   │  peers:    id -> Peer     │     │  channels: id -> Channel  │
//!   │  sessions: sid -> id      │     └─────────────┬─────────────┘
//!   └─────────────┬─────────────┘                   │
//!                 │ snapshot()                      │ snapshot()
//!                 └──────────────┬──────────────────┘
//!                                ▼
//!                RelayRouter / PresenceBroadcaster
//! ```
//!
//! The two registries are independent: nothing ever needs to change both
//! atomically.

pub mod channels;
pub mod entry;
pub mod error;
pub mod peers;

pub use channels::ChannelRegistry;
pub use entry::{ChannelSnapshot, Peer, PeerSnapshot, PublicChannel, SessionId};
pub use error::RegistryError;
pub use peers::PeerRegistry;
