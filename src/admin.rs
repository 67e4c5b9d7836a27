//! Administrative operations
//!
//! What an operator console needs from the live engine. Every change goes
//! through the same registries and broker as client traffic, so connected
//! clients see admin changes the same way they see each other's.

use std::sync::Arc;

use uuid::Uuid;

use crate::registry::{
    ChannelRegistry, ChannelSnapshot, PeerRegistry, PeerSnapshot, PublicChannel, RegistryError,
};
use crate::relay::RelayRouter;
use crate::stats::{RelayStats, ServerStats};

/// Handle for administrative operations
#[derive(Clone)]
pub struct Admin {
    peers: Arc<PeerRegistry>,
    channels: Arc<ChannelRegistry>,
    router: Arc<RelayRouter>,
    stats: Arc<RelayStats>,
}

impl Admin {
    pub(crate) fn new(
        peers: Arc<PeerRegistry>,
        channels: Arc<ChannelRegistry>,
        router: Arc<RelayRouter>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            peers,
            channels,
            router,
            stats,
        }
    }

    pub fn list_peers(&self) -> PeerSnapshot {
        self.peers.snapshot()
    }

    pub fn list_channels(&self) -> ChannelSnapshot {
        self.channels.snapshot()
    }

    /// Create or replace a public channel
    ///
    /// An empty id is replaced with a fresh UUID. The stored channel is
    /// returned and the channel set republished.
    pub fn add_channel(&self, mut channel: PublicChannel) -> Result<PublicChannel, RegistryError> {
        if channel.id.is_empty() {
            channel.id = Uuid::new_v4().to_string();
        }

        self.router.register_channel(channel.clone())?;
        Ok(channel)
    }

    /// Delete a public channel
    ///
    /// The channel set is republished only if something was removed.
    pub fn remove_channel(&self, id: &str) -> bool {
        if self.channels.remove(id).is_none() {
            return false;
        }
        self.router.publish_channels();
        true
    }

    /// Push a system chat message to every registered peer
    pub fn broadcast_system_notification(&self, text: &str) -> usize {
        self.router.broadcast_system_notification(text)
    }

    pub fn stats(&self) -> ServerStats {
        self.stats.snapshot(self.peers.len(), self.channels.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Peer;
    use crate::relay::{SystemNotification, CHANNELS_TOPIC, SYSTEM_SENDER_ID};
    use crate::testing::RecordingPublisher;

    struct Fixture {
        admin: Admin,
        peers: Arc<PeerRegistry>,
        publisher: Arc<RecordingPublisher>,
    }

    fn fixture() -> Fixture {
        let peers = Arc::new(PeerRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let stats = Arc::new(RelayStats::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let router = Arc::new(
            RelayRouter::new(
                Arc::clone(&peers),
                Arc::clone(&channels),
                publisher.clone(),
                Arc::clone(&stats),
            )
            .system_sender_name("Ops"),
        );

        Fixture {
            admin: Admin::new(Arc::clone(&peers), channels, router, stats),
            peers,
            publisher,
        }
    }

    #[test]
    fn test_add_channel_generates_id() {
        let f = fixture();

        let channel = f.admin.add_channel(PublicChannel::new("", "Lobby")).unwrap();

        assert!(Uuid::parse_str(&channel.id).is_ok());
        assert_eq!(f.admin.list_channels()[&channel.id].name, "Lobby");
        assert_eq!(f.publisher.count_to(CHANNELS_TOPIC), 1);
    }

    #[test]
    fn test_add_channel_keeps_given_id() {
        let f = fixture();

        let channel = f.admin.add_channel(PublicChannel::new("c1", "General")).unwrap();

        assert_eq!(channel.id, "c1");
    }

    #[test]
    fn test_remove_channel() {
        let f = fixture();
        f.admin.add_channel(PublicChannel::new("c1", "General")).unwrap();
        f.publisher.clear();

        assert!(!f.admin.remove_channel("nope"));
        assert!(f.publisher.sent().is_empty());

        assert!(f.admin.remove_channel("c1"));
        assert!(f.admin.list_channels().is_empty());
        assert_eq!(f.publisher.count_to(CHANNELS_TOPIC), 1);
    }

    #[test]
    fn test_system_notification_reaches_every_peer() {
        let f = fixture();
        f.peers.register(Peer::new("a"), 1);
        f.peers.register(Peer::new("b"), 2);

        assert_eq!(f.admin.broadcast_system_notification("maintenance at 22:00"), 2);

        let body = f.publisher.last_to("/topic/message/a").unwrap();
        let notification: SystemNotification = serde_json::from_slice(&body).unwrap();
        assert_eq!(notification.sender_id, SYSTEM_SENDER_ID);
        assert_eq!(notification.sender_name, "Ops");
        assert_eq!(notification.text, "maintenance at 22:00");
        assert_eq!(notification.kind, "text");
        assert!(f.publisher.last_to("/topic/message/b").is_some());
    }

    #[test]
    fn test_list_peers_and_stats() {
        let f = fixture();
        f.peers.register(Peer::new("a"), 1);

        assert!(f.admin.list_peers().contains_key("a"));

        let stats = f.admin.stats();
        assert_eq!(stats.registered_peers, 1);
        assert_eq!(stats.public_channels, 0);
    }
}
