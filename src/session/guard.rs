//! Session release guard
//!
//! Ties a session's hub-side footprint to a value: creating the guard
//! counts the session as active, and the guard gives back the peer binding
//! and the active count exactly once, either through [`SessionGuard::release`]
//! or when it is dropped. A connection task that unwinds still cleans up.

use std::sync::Arc;

use crate::hub::SignalHub;
use crate::registry::SessionId;

/// Releases a session's peer binding when it goes away
pub struct SessionGuard {
    hub: Arc<SignalHub>,
    session_id: SessionId,
    released: bool,
}

impl SessionGuard {
    /// Count a new session as open
    pub fn open(hub: Arc<SignalHub>, session_id: SessionId) -> Self {
        hub.relay_stats().session_opened();
        Self {
            hub,
            session_id,
            released: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Release now; later calls and the drop are no-ops
    ///
    /// Returns the id of the peer that was bound to the session, if any.
    pub fn release(&mut self) -> Option<String> {
        if self.released {
            return None;
        }
        self.released = true;

        let removed = self.hub.session_closed(self.session_id);
        self.hub.relay_stats().session_closed();
        removed
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        if std::thread::panicking() {
            tracing::warn!(session_id = self.session_id, "Session task panicked, releasing peer binding");
        }
        if let Some(peer_id) = self.release() {
            tracing::debug!(
                session_id = self.session_id,
                peer_id = %peer_id,
                "Released peer binding on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Peer;

    fn hub_with(peer: &str, session_id: SessionId) -> Arc<SignalHub> {
        let hub = Arc::new(SignalHub::default());
        hub.peers().register(Peer::new(peer), session_id);
        hub
    }

    #[test]
    fn test_drop_releases_binding() {
        let hub = hub_with("alice", 7);
        let guard = SessionGuard::open(Arc::clone(&hub), 7);
        assert_eq!(hub.stats().active_sessions, 1);

        drop(guard);

        assert!(!hub.peers().contains("alice"));
        assert_eq!(hub.stats().active_sessions, 0);
    }

    #[test]
    fn test_release_once() {
        let hub = hub_with("alice", 7);
        let mut guard = SessionGuard::open(Arc::clone(&hub), 7);
        let _other = SessionGuard::open(Arc::clone(&hub), 8);

        assert_eq!(guard.release(), Some("alice".to_string()));
        assert!(guard.is_released());
        assert_eq!(guard.release(), None);
        drop(guard);

        assert_eq!(hub.stats().active_sessions, 1);
    }

    #[test]
    fn test_unwinding_task_releases_binding() {
        let hub = hub_with("alice", 3);
        let task_hub = Arc::clone(&hub);

        let result = std::thread::spawn(move || {
            let _guard = SessionGuard::open(task_hub, 3);
            panic!("session task failed");
        })
        .join();

        assert!(result.is_err());
        assert!(!hub.peers().contains("alice"));
        assert_eq!(hub.stats().active_sessions, 0);
    }
}
