//! Session state machine
//!
//! Tracks a signaling session from WebSocket upgrade to close.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::auth::Identity;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// WebSocket open, waiting for CONNECT
    Connected,
    /// CONNECT accepted
    Active,
    /// DISCONNECT received or connection failing
    Closing,
    /// Session torn down
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Time CONNECT was accepted
    pub authenticated_at: Option<Instant>,

    /// Authenticated identity (after CONNECT)
    pub identity: Option<Identity>,

    /// Subscription id -> destination
    subscriptions: HashMap<String, String>,

    /// Frames received from the client
    pub frames_received: u64,

    /// Frames queued towards the client
    pub frames_sent: u64,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Connected,
            connected_at: Instant::now(),
            authenticated_at: None,
            identity: None,
            subscriptions: HashMap::new(),
            frames_received: 0,
            frames_sent: 0,
        }
    }

    /// Accept CONNECT
    pub fn on_connect(&mut self, identity: Identity) {
        if self.phase == SessionPhase::Connected {
            self.identity = Some(identity);
            self.authenticated_at = Some(Instant::now());
            self.phase = SessionPhase::Active;
        }
    }

    /// Record a subscription; returns the destination it replaced, if any
    pub fn add_subscription(&mut self, id: impl Into<String>, destination: impl Into<String>) -> Option<String> {
        self.subscriptions.insert(id.into(), destination.into())
    }

    pub fn remove_subscription(&mut self, id: &str) -> Option<String> {
        self.subscriptions.remove(id)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.phase = SessionPhase::Closed;
        self.subscriptions.clear();
    }

    /// Authenticated username, if any
    pub fn username(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.username.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        SessionState::new(1, addr)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Connected);
        assert!(state.username().is_none());

        state.on_connect(Identity::new("alice", Role::User));
        assert!(state.is_active());
        assert!(state.authenticated_at.is_some());
        assert_eq!(state.username(), Some("alice"));

        state.close();
        assert_eq!(state.phase, SessionPhase::Closing);

        state.mark_closed();
        assert_eq!(state.phase, SessionPhase::Closed);

        // Closed is terminal
        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_connect_only_once() {
        let mut state = state();
        state.on_connect(Identity::new("alice", Role::User));
        state.on_connect(Identity::new("bob", Role::Admin));

        assert_eq!(state.username(), Some("alice"));
    }

    #[test]
    fn test_subscriptions() {
        let mut state = state();

        assert_eq!(state.add_subscription("sub-0", "/topic/peers"), None);
        assert_eq!(
            state.add_subscription("sub-0", "/topic/channels"),
            Some("/topic/peers".to_string())
        );
        state.add_subscription("sub-1", "/topic/call/alice");
        assert_eq!(state.subscription_count(), 2);

        assert_eq!(state.remove_subscription("sub-1").as_deref(), Some("/topic/call/alice"));
        assert_eq!(state.remove_subscription("sub-1"), None);

        state.mark_closed();
        assert_eq!(state.subscription_count(), 0);
    }
}
