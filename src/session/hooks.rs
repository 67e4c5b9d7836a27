//! Connection lifecycle hooks
//!
//! Glue between session events and the peer registry. Each hook mutates
//! the registry first and then publishes the resulting peer set, so a
//! subscriber never sees a snapshot older than the change that caused it.

use std::sync::Arc;

use crate::registry::{Peer, PeerRegistry, PeerSnapshot, SessionId};
use crate::relay::RelayRouter;

/// Registry updates driven by session events
pub struct LifecycleHooks {
    peers: Arc<PeerRegistry>,
    router: Arc<RelayRouter>,
}

impl LifecycleHooks {
    pub fn new(peers: Arc<PeerRegistry>, router: Arc<RelayRouter>) -> Self {
        Self { peers, router }
    }

    /// A session announced a peer
    ///
    /// The new peer set is published to `/topic/peers`, including to the
    /// registering session if it already subscribes there.
    pub fn on_register(&self, peer: Peer, session_id: SessionId) -> PeerSnapshot {
        let snapshot = self.peers.register(peer, session_id);
        self.router.publish_peer_snapshot(&snapshot);
        snapshot
    }

    /// A session asked to remove a peer
    ///
    /// The peer set is published even when the id was unknown.
    pub fn on_disconnect_message(&self, peer_id: &str) -> PeerSnapshot {
        self.peers.unregister_by_peer_id(peer_id);
        let snapshot = self.peers.snapshot();
        self.router.publish_peer_snapshot(&snapshot);
        snapshot
    }

    /// The transport for a session closed
    ///
    /// Only publishes when a peer was actually removed. Returns its id.
    pub fn on_session_closed(&self, session_id: SessionId) -> Option<String> {
        let removed = self.peers.unregister_by_session(session_id)?;
        self.router.publish_peers();
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelRegistry;
    use crate::relay::PEERS_TOPIC;
    use crate::stats::RelayStats;
    use crate::testing::RecordingPublisher;

    fn hooks() -> (LifecycleHooks, Arc<PeerRegistry>, Arc<RecordingPublisher>) {
        let peers = Arc::new(PeerRegistry::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let router = Arc::new(RelayRouter::new(
            Arc::clone(&peers),
            Arc::new(ChannelRegistry::new()),
            publisher.clone(),
            Arc::new(RelayStats::new()),
        ));
        (LifecycleHooks::new(Arc::clone(&peers), router), peers, publisher)
    }

    fn published_peers(publisher: &RecordingPublisher) -> PeerSnapshot {
        let body = publisher.last_to(PEERS_TOPIC).unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_register_publishes_snapshot() {
        let (hooks, _, publisher) = hooks();

        hooks.on_register(Peer::new("a"), 1);
        let snapshot = hooks.on_register(Peer::new("b"), 2);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(publisher.count_to(PEERS_TOPIC), 2);
        assert_eq!(published_peers(&publisher), snapshot);
    }

    #[test]
    fn test_disconnect_message_publishes_even_if_unknown() {
        let (hooks, peers, publisher) = hooks();
        hooks.on_register(Peer::new("a"), 1);
        publisher.clear();

        let snapshot = hooks.on_disconnect_message("ghost");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(publisher.count_to(PEERS_TOPIC), 1);

        let snapshot = hooks.on_disconnect_message("a");
        assert!(snapshot.is_empty());
        assert!(peers.is_empty());
        assert!(published_peers(&publisher).is_empty());
    }

    #[test]
    fn test_session_closed_removes_owned_peer() {
        let (hooks, peers, publisher) = hooks();
        hooks.on_register(Peer::new("a"), 1);
        hooks.on_register(Peer::new("b"), 2);
        publisher.clear();

        assert_eq!(hooks.on_session_closed(1).as_deref(), Some("a"));
        assert!(!peers.contains("a"));
        assert!(published_peers(&publisher).contains_key("b"));
    }

    #[test]
    fn test_session_closed_without_peer_is_silent() {
        let (hooks, _, publisher) = hooks();

        assert_eq!(hooks.on_session_closed(42), None);
        assert!(publisher.sent().is_empty());
    }

    #[test]
    fn test_reconnect_survives_old_session_close() {
        let (hooks, peers, publisher) = hooks();
        hooks.on_register(Peer::new("a"), 1);
        hooks.on_register(Peer::new("a").with_status("back"), 2);
        publisher.clear();

        assert_eq!(hooks.on_session_closed(1), None);
        assert_eq!(peers.get("a").unwrap().status, "back");
        assert!(publisher.sent().is_empty());
    }
}
