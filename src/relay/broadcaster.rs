//! Periodic presence broadcast
//!
//! Incremental updates (register echoes, disconnect broadcasts) are best
//! effort. A client that missed one converges on the next tick, when the
//! full peer and channel sets are republished. Empty registries are never
//! broadcast.

use std::sync::Arc;
use std::time::Duration;

use super::router::RelayRouter;
use crate::registry::{ChannelRegistry, PeerRegistry};

/// Default interval between snapshot broadcasts
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest accepted interval; a zero period would stop the ticker
pub const MIN_BROADCAST_INTERVAL: Duration = Duration::from_millis(1);

/// Republishes registry snapshots on a fixed interval
pub struct PresenceBroadcaster {
    peers: Arc<PeerRegistry>,
    channels: Arc<ChannelRegistry>,
    router: Arc<RelayRouter>,
    interval: Duration,
}

impl PresenceBroadcaster {
    pub fn new(
        peers: Arc<PeerRegistry>,
        channels: Arc<ChannelRegistry>,
        router: Arc<RelayRouter>,
        interval: Duration,
    ) -> Self {
        Self {
            peers,
            channels,
            router,
            interval: interval.max(MIN_BROADCAST_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one broadcast round
    ///
    /// Returns the number of snapshots published (0, 1 or 2).
    pub fn tick(&self) -> usize {
        let mut sends = 0;

        let peers = self.peers.snapshot();
        if !peers.is_empty() {
            self.router.publish_peer_snapshot(&peers);
            sends += 1;
        }

        let channels = self.channels.snapshot();
        if !channels.is_empty() {
            self.router.publish_channel_snapshot(&channels);
            sends += 1;
        }

        tracing::trace!(
            peers = peers.len(),
            channels = channels.len(),
            sends = sends,
            "Presence broadcast tick"
        );

        sends
    }

    /// Spawn the broadcast loop
    ///
    /// Runs until the returned handle is aborted.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let broadcaster = Arc::clone(self);
        let interval = broadcaster.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broadcaster.tick();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::registry::{Peer, PeerSnapshot, PublicChannel};
    use crate::relay::route::{CHANNELS_TOPIC, PEERS_TOPIC};
    use crate::stats::RelayStats;
    use crate::testing::RecordingPublisher;

    fn broadcaster(
        interval: Duration,
    ) -> (
        Arc<PresenceBroadcaster>,
        Arc<PeerRegistry>,
        Arc<ChannelRegistry>,
        Arc<RecordingPublisher>,
    ) {
        let peers = Arc::new(PeerRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let router = Arc::new(RelayRouter::new(
            Arc::clone(&peers),
            Arc::clone(&channels),
            publisher.clone(),
            Arc::new(RelayStats::new()),
        ));
        let broadcaster = Arc::new(PresenceBroadcaster::new(
            Arc::clone(&peers),
            Arc::clone(&channels),
            router,
            interval,
        ));
        (broadcaster, peers, channels, publisher)
    }

    #[test]
    fn test_empty_registries_send_nothing() {
        let (broadcaster, _, _, publisher) = broadcaster(DEFAULT_BROADCAST_INTERVAL);

        assert_eq!(broadcaster.tick(), 0);
        assert!(publisher.sent().is_empty());
    }

    #[test]
    fn test_peers_only() {
        let (broadcaster, peers, _, publisher) = broadcaster(DEFAULT_BROADCAST_INTERVAL);
        peers.register(Peer::new("a"), 1);

        assert_eq!(broadcaster.tick(), 1);
        assert_eq!(publisher.count_to(PEERS_TOPIC), 1);
        assert_eq!(publisher.count_to(CHANNELS_TOPIC), 0);
    }

    #[test]
    fn test_peers_and_channels() {
        let (broadcaster, peers, channels, publisher) = broadcaster(DEFAULT_BROADCAST_INTERVAL);
        peers.register(Peer::new("a"), 1);
        channels.put(PublicChannel::new("c1", "General")).unwrap();

        assert_eq!(broadcaster.tick(), 2);
        assert_eq!(publisher.count_to(PEERS_TOPIC), 1);
        assert_eq!(publisher.count_to(CHANNELS_TOPIC), 1);
    }

    #[test]
    fn test_channels_without_peers() {
        let (broadcaster, _, channels, publisher) = broadcaster(DEFAULT_BROADCAST_INTERVAL);
        channels.put(PublicChannel::new("c1", "General")).unwrap();

        assert_eq!(broadcaster.tick(), 1);
        assert_eq!(publisher.destinations(), vec![CHANNELS_TOPIC.to_string()]);
    }

    #[test]
    fn test_snapshot_reflects_disconnect() {
        let (broadcaster, peers, _, publisher) = broadcaster(DEFAULT_BROADCAST_INTERVAL);
        peers.register(Peer::new("a"), 1);
        peers.register(Peer::new("b"), 2);
        peers.unregister_by_peer_id("a");

        broadcaster.tick();

        let body: Bytes = publisher.last_to(PEERS_TOPIC).unwrap();
        let snapshot: PeerSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_ticks_on_interval() {
        let (broadcaster, peers, _, publisher) = broadcaster(Duration::from_secs(5));
        peers.register(Peer::new("a"), 1);

        let handle = broadcaster.spawn();

        // First tick fires immediately, then every 5s
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(publisher.count_to(PEERS_TOPIC), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(publisher.count_to(PEERS_TOPIC), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_still_ticks() {
        let (broadcaster, peers, _, publisher) = broadcaster(Duration::ZERO);
        peers.register(Peer::new("a"), 1);
        assert_eq!(broadcaster.interval(), MIN_BROADCAST_INTERVAL);

        let handle = broadcaster.spawn();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!handle.is_finished());
        assert!(publisher.count_to(PEERS_TOPIC) >= 2);
        handle.abort();
    }
}
