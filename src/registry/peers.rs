//! Peer registry
//!
//! Single source of truth for who is online. Holds two maps:
//!
//! - peer id -> presence record (plus the session that registered it)
//! - session id -> peer id last registered on that session
//!
//! Both are `DashMap`s, so handlers on every session, the periodic
//! broadcaster and the disconnect hook can all touch them without a global
//! lock. Every insert and delete is atomic per key.

use dashmap::DashMap;

use super::entry::{Peer, PeerSnapshot, SessionId};

struct PeerEntry {
    peer: Peer,
    session_id: SessionId,
}

/// Registry of currently reachable peers
pub struct PeerRegistry {
    peers: DashMap<String, PeerEntry>,
    sessions: DashMap<SessionId, String>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Insert or replace a peer and bind it to `session_id`
    ///
    /// A reused id overwrites the previous record wholesale; nothing is
    /// merged. Returns the registry contents after the insert.
    pub fn register(&self, peer: Peer, session_id: SessionId) -> PeerSnapshot {
        let id = peer.id.clone();
        let replaced = self
            .peers
            .insert(id.clone(), PeerEntry { peer, session_id })
            .is_some();
        self.sessions.insert(session_id, id.clone());

        tracing::info!(
            peer_id = %id,
            session_id = session_id,
            replaced = replaced,
            "Registered peer"
        );

        self.snapshot()
    }

    /// Remove a peer by id
    ///
    /// Removing an absent id is a no-op. The session binding is left alone;
    /// it is cleared when the session itself closes.
    pub fn unregister_by_peer_id(&self, id: &str) -> Option<Peer> {
        let removed = self.peers.remove(id).map(|(_, entry)| entry.peer);

        if removed.is_some() {
            tracing::info!(peer_id = %id, "Disconnected peer");
        } else {
            tracing::debug!(peer_id = %id, "Disconnect for unknown peer");
        }

        removed
    }

    /// Clear a session binding and remove the peer it points to
    ///
    /// The peer is only removed if it is still owned by this session. A peer
    /// that re-registered the same id from a newer session survives the old
    /// session going away. This is deliberately stricter than removing the
    /// bound id outright, which would evict a peer that reconnected before
    /// its old transport timed out. Returns the id of the peer actually
    /// removed.
    pub fn unregister_by_session(&self, session_id: SessionId) -> Option<String> {
        let (_, peer_id) = self.sessions.remove(&session_id)?;

        let removed = self
            .peers
            .remove_if(&peer_id, |_, entry| entry.session_id == session_id)
            .is_some();

        if removed {
            tracing::info!(
                peer_id = %peer_id,
                session_id = session_id,
                "Auto-removed peer (session closed)"
            );
            Some(peer_id)
        } else {
            tracing::debug!(
                peer_id = %peer_id,
                session_id = session_id,
                "Session closed, peer already gone or owned by another session"
            );
            None
        }
    }

    /// Copy of the current registry contents
    pub fn snapshot(&self) -> PeerSnapshot {
        self.peers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().peer.clone()))
            .collect()
    }

    /// Ids of every registered peer
    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Look up one peer
    pub fn get(&self, id: &str) -> Option<Peer> {
        self.peers.get(id).map(|entry| entry.peer.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    /// Peer id bound to a session, if any
    pub fn peer_for_session(&self, session_id: SessionId) -> Option<String> {
        self.sessions.get(&session_id).map(|id| id.value().clone())
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use super::*;

    fn ids(snapshot: &PeerSnapshot) -> BTreeSet<String> {
        snapshot.keys().cloned().collect()
    }

    #[test]
    fn test_register_returns_snapshot() {
        let registry = PeerRegistry::new();

        registry.register(Peer::new("a"), 1);
        let snapshot = registry.register(Peer::new("b"), 2);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key("a"));
        assert!(snapshot.contains_key("b"));
        assert_eq!(registry.peer_for_session(2).as_deref(), Some("b"));
    }

    #[test]
    fn test_reregister_replaces_whole_record() {
        let registry = PeerRegistry::new();
        registry.register(
            Peer::new("a").with_display_name("Alice").with_status("busy"),
            1,
        );

        registry.register(Peer::new("a").with_ip("10.0.0.9"), 1);

        let peer = registry.get("a").unwrap();
        assert_eq!(peer.ip, "10.0.0.9");
        assert_eq!(peer.display_name, "");
        assert_eq!(peer.status, "");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = PeerRegistry::new();
        registry.register(Peer::new("a"), 1);

        assert!(registry.unregister_by_peer_id("ghost").is_none());
        assert!(registry.unregister_by_peer_id("a").is_some());
        assert!(registry.unregister_by_peer_id("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_disconnect_sequence() {
        let registry = PeerRegistry::new();

        registry.register(Peer::new("a"), 1);
        registry.register(Peer::new("b"), 2);
        registry.register(Peer::new("c"), 3);
        registry.unregister_by_peer_id("b");
        registry.register(Peer::new("b").with_status("back"), 4);
        registry.unregister_by_peer_id("a");
        registry.register(Peer::new("d"), 5);

        let snapshot = registry.snapshot();
        let expected: BTreeSet<String> = ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids(&snapshot), expected);
        assert_eq!(snapshot["b"].status, "back");
    }

    #[test]
    fn test_session_loss_without_binding_is_noop() {
        let registry = PeerRegistry::new();
        registry.register(Peer::new("a"), 1);

        assert!(registry.unregister_by_session(99).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_session_loss_removes_only_bound_peer() {
        let registry = PeerRegistry::new();
        registry.register(Peer::new("a"), 1);
        registry.register(Peer::new("b"), 2);
        registry.register(Peer::new("c"), 3);

        assert_eq!(registry.unregister_by_session(2).as_deref(), Some("b"));

        let expected: BTreeSet<String> = ["a", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(ids(&registry.snapshot()), expected);
        assert!(registry.peer_for_session(2).is_none());

        // Binding is gone, second loss event does nothing
        assert!(registry.unregister_by_session(2).is_none());
    }

    #[test]
    fn test_session_loss_after_explicit_disconnect() {
        let registry = PeerRegistry::new();
        registry.register(Peer::new("a"), 1);
        registry.unregister_by_peer_id("a");

        assert!(registry.unregister_by_session(1).is_none());
        assert!(registry.peer_for_session(1).is_none());
    }

    #[test]
    fn test_reconnect_survives_old_session_loss() {
        let registry = PeerRegistry::new();
        registry.register(Peer::new("a"), 1);

        // Client reconnects on a new session before the old one is reaped
        registry.register(Peer::new("a").with_status("reconnected"), 2);
        assert!(registry.unregister_by_session(1).is_none());

        assert_eq!(registry.get("a").unwrap().status, "reconnected");
        assert_eq!(registry.unregister_by_session(2).as_deref(), Some("a"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sessions() {
        let registry = Arc::new(PeerRegistry::new());

        let mut handles = Vec::new();
        for session in 0..32u64 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register(Peer::new(format!("peer-{}", session)), session);
                if session % 2 == 0 {
                    registry.unregister_by_session(session);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(registry.len(), 16);
        assert!(registry.peer_ids().iter().all(|id| {
            let n: u64 = id.trim_start_matches("peer-").parse().unwrap();
            n % 2 == 1
        }));
    }
}
