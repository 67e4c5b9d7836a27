//! Signaling hub
//!
//! Owns every piece of shared state and is the single entry point sessions
//! use to act on it.
//!
//! ```text
//!   Connection ──SEND──► SignalHub::dispatch ──► Route::parse
//!                               │                    │
//!                               │     ┌──────────────┼─────────────────┐
//!                               │     ▼              ▼                 ▼
//!                               │ LifecycleHooks  RelayRouter ──► Broker ──► subscribers
//!                               │     │                ▲
//!                               │     ▼                │
//!                               │ PeerRegistry   PresenceBroadcaster (every 5s)
//!                               │
//!   Connection ──close──► SignalHub::session_closed
//! ```

use std::sync::Arc;

use bytes::Bytes;

use crate::admin::Admin;
use crate::broker::Broker;
use crate::registry::{ChannelRegistry, Peer, PeerRegistry, PublicChannel, SessionId};
use crate::relay::route::{is_topic, peer_id_from_body};
use crate::relay::{PresenceBroadcaster, RelayRouter, Route};
use crate::server::config::ServerConfig;
use crate::session::LifecycleHooks;
use crate::stats::{RelayStats, ServerStats};

/// Shared presence and relay state
pub struct SignalHub {
    peers: Arc<PeerRegistry>,
    channels: Arc<ChannelRegistry>,
    broker: Arc<Broker>,
    router: Arc<RelayRouter>,
    hooks: LifecycleHooks,
    broadcaster: Arc<PresenceBroadcaster>,
    stats: Arc<RelayStats>,
}

impl SignalHub {
    pub fn new(config: &ServerConfig) -> Self {
        let peers = Arc::new(PeerRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let broker = Arc::new(Broker::new(config.topic_capacity));
        let stats = Arc::new(RelayStats::new());

        let router = Arc::new(
            RelayRouter::new(
                Arc::clone(&peers),
                Arc::clone(&channels),
                broker.clone(),
                Arc::clone(&stats),
            )
            .system_sender_name(config.system_sender_name.clone()),
        );

        let hooks = LifecycleHooks::new(Arc::clone(&peers), Arc::clone(&router));
        let broadcaster = Arc::new(PresenceBroadcaster::new(
            Arc::clone(&peers),
            Arc::clone(&channels),
            Arc::clone(&router),
            config.broadcast_interval,
        ));

        Self {
            peers,
            channels,
            broker,
            router,
            hooks,
            broadcaster,
            stats,
        }
    }

    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn router(&self) -> &Arc<RelayRouter> {
        &self.router
    }

    pub fn broadcaster(&self) -> &Arc<PresenceBroadcaster> {
        &self.broadcaster
    }

    pub fn relay_stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Server-wide statistics
    pub fn stats(&self) -> ServerStats {
        self.stats.snapshot(self.peers.len(), self.channels.len())
    }

    /// Administrative handle
    pub fn admin(&self) -> Admin {
        Admin::new(
            Arc::clone(&self.peers),
            Arc::clone(&self.channels),
            Arc::clone(&self.router),
            Arc::clone(&self.stats),
        )
    }

    /// Handle a SEND from `session_id`
    ///
    /// Never fails: malformed payloads and unknown destinations are logged
    /// and dropped.
    pub fn dispatch(&self, session_id: SessionId, destination: &str, body: Bytes) {
        let route = match Route::parse(destination) {
            Some(route) => route,
            None if is_topic(destination) => {
                self.router.publish_raw(destination, body);
                return;
            }
            None => {
                tracing::warn!(
                    session_id = session_id,
                    destination = %destination,
                    "Dropping message for unknown destination"
                );
                self.stats.record_dropped();
                return;
            }
        };

        match route {
            Route::Register => match serde_json::from_slice::<Peer>(&body) {
                Ok(peer) if !peer.id.is_empty() => {
                    self.hooks.on_register(peer, session_id);
                }
                Ok(_) => {
                    tracing::warn!(session_id = session_id, "Dropping register without peer id");
                    self.stats.record_dropped();
                }
                Err(e) => {
                    tracing::warn!(session_id = session_id, error = %e, "Malformed register payload");
                    self.stats.record_dropped();
                }
            },
            Route::Disconnect => match peer_id_from_body(&body) {
                Some(peer_id) => {
                    self.hooks.on_disconnect_message(&peer_id);
                }
                None => {
                    tracing::warn!(session_id = session_id, "Dropping disconnect without peer id");
                    self.stats.record_dropped();
                }
            },
            Route::ChannelRegister => {
                let registered = serde_json::from_slice::<PublicChannel>(&body)
                    .map_err(|e| e.to_string())
                    .and_then(|channel| {
                        self.router
                            .register_channel(channel)
                            .map_err(|e| e.to_string())
                    });

                if let Err(e) = registered {
                    tracing::warn!(session_id = session_id, error = %e, "Rejected channel registration");
                    self.stats.record_dropped();
                }
            }
            Route::ChannelMessage(channel_id) => {
                self.router.channel_message(&channel_id, body);
            }
            Route::Answer => {
                self.router.answer(body);
            }
            Route::Directed(kind, target) => {
                self.router.relay(kind, &target, body);
            }
        }
    }

    /// The transport for `session_id` went away
    pub fn session_closed(&self, session_id: SessionId) -> Option<String> {
        self.hooks.on_session_closed(session_id)
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new(&ServerConfig::default())
    }
}
