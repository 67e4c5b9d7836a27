//! Relay router
//!
//! Forwards opaque payloads to a peer's or a channel's outbound address.
//! Delivery is fire-and-forget: the broker drops messages for addresses
//! nobody subscribes to, and nothing is retried or acknowledged.
//!
//! Only `call` checks that the target is registered. Every other directed
//! kind relies on the broker's no-subscriber no-op. The asymmetry is kept for
//! compatibility with existing clients, which expect `answer`, `hangup` and
//! signaling to reach a peer whose registration has not landed yet.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::route::{channel_topic, RelayKind, CHANNELS_TOPIC, PEERS_TOPIC};
use crate::broker::Publisher;
use crate::registry::{
    ChannelRegistry, ChannelSnapshot, PeerRegistry, PeerSnapshot, PublicChannel, RegistryError,
};
use crate::stats::RelayStats;

/// Sender id stamped on every system notification
pub const SYSTEM_SENDER_ID: &str = "system_admin";

/// Default display label for system notifications
pub const DEFAULT_SYSTEM_SENDER_NAME: &str = "System notification";

/// Result of a relay attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Handed to the broker; `receivers` subscribers were listening
    Forwarded { receivers: usize },
    /// Not handed to the broker
    Dropped,
}

impl RelayOutcome {
    pub fn is_forwarded(&self) -> bool {
        matches!(self, RelayOutcome::Forwarded { .. })
    }
}

/// Chat message synthesized for administrative broadcasts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemNotification {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerTarget {
    caller_id: Option<String>,
}

/// Stateless dispatch of directed and channel messages
pub struct RelayRouter {
    peers: Arc<PeerRegistry>,
    channels: Arc<ChannelRegistry>,
    publisher: Arc<dyn Publisher>,
    stats: Arc<RelayStats>,
    system_sender_name: String,
}

impl RelayRouter {
    pub fn new(
        peers: Arc<PeerRegistry>,
        channels: Arc<ChannelRegistry>,
        publisher: Arc<dyn Publisher>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            peers,
            channels,
            publisher,
            stats,
            system_sender_name: DEFAULT_SYSTEM_SENDER_NAME.to_string(),
        }
    }

    /// Set the display label used for system notifications
    pub fn system_sender_name(mut self, name: impl Into<String>) -> Self {
        self.system_sender_name = name.into();
        self
    }

    /// Forward a payload to one peer
    ///
    /// `Call` to an unregistered target is dropped and logged. Every other
    /// kind is forwarded unconditionally.
    pub fn relay(&self, kind: RelayKind, target: &str, payload: Bytes) -> RelayOutcome {
        if kind == RelayKind::Call && !self.peers.contains(target) {
            tracing::warn!(target_id = %target, "Call failed: target not found");
            self.stats.record_dropped();
            return RelayOutcome::Dropped;
        }

        let receivers = self.publisher.publish(&kind.topic(target), payload);
        self.stats.record_relayed();

        tracing::debug!(
            kind = %kind,
            target_id = %target,
            receivers = receivers,
            "Relayed message"
        );

        RelayOutcome::Forwarded { receivers }
    }

    /// Forward a call answer to the caller named in its `callerId` field
    pub fn answer(&self, payload: Bytes) -> RelayOutcome {
        let caller_id = serde_json::from_slice::<AnswerTarget>(&payload)
            .ok()
            .and_then(|a| a.caller_id)
            .filter(|id| !id.is_empty());

        match caller_id {
            Some(caller_id) => self.relay(RelayKind::Answer, &caller_id, payload),
            None => {
                tracing::warn!("Dropping answer without callerId");
                self.stats.record_dropped();
                RelayOutcome::Dropped
            }
        }
    }

    /// Post to a public channel
    ///
    /// Membership is not tracked; any peer can post to any channel id.
    pub fn channel_message(&self, channel_id: &str, payload: Bytes) -> RelayOutcome {
        let receivers = self.publisher.publish(&channel_topic(channel_id), payload);
        self.stats.record_relayed();

        tracing::debug!(
            channel_id = %channel_id,
            receivers = receivers,
            "Relayed channel message"
        );

        RelayOutcome::Forwarded { receivers }
    }

    /// Publish straight to a broker destination
    pub fn publish_raw(&self, destination: &str, payload: Bytes) -> RelayOutcome {
        let receivers = self.publisher.publish(destination, payload);
        self.stats.record_relayed();

        tracing::debug!(
            destination = %destination,
            receivers = receivers,
            "Published to topic"
        );

        RelayOutcome::Forwarded { receivers }
    }

    /// Store a channel and republish the full channel set
    pub fn register_channel(&self, channel: PublicChannel) -> Result<ChannelSnapshot, RegistryError> {
        self.channels.put(channel)?;
        let snapshot = self.channels.snapshot();
        self.publish_channel_snapshot(&snapshot);
        Ok(snapshot)
    }

    /// Publish the current peer set to `/topic/peers`
    pub fn publish_peers(&self) -> usize {
        self.publish_peer_snapshot(&self.peers.snapshot())
    }

    /// Publish the current channel set to `/topic/channels`
    pub fn publish_channels(&self) -> usize {
        self.publish_channel_snapshot(&self.channels.snapshot())
    }

    pub fn publish_peer_snapshot(&self, snapshot: &PeerSnapshot) -> usize {
        self.publish_json(PEERS_TOPIC, snapshot)
    }

    pub fn publish_channel_snapshot(&self, snapshot: &ChannelSnapshot) -> usize {
        self.publish_json(CHANNELS_TOPIC, snapshot)
    }

    /// Send a system chat message to every registered peer
    ///
    /// Directed chat addresses have no shared broadcast address, so this is
    /// one publish per peer. Returns the number of publishes.
    pub fn broadcast_system_notification(&self, text: &str) -> usize {
        let notification = SystemNotification {
            sender_id: SYSTEM_SENDER_ID.to_string(),
            sender_name: self.system_sender_name.clone(),
            text: text.to_string(),
            kind: "text".to_string(),
            timestamp: now_millis(),
        };

        let body = match serde_json::to_vec(&notification) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode system notification");
                return 0;
            }
        };

        let mut sent = 0;
        for peer_id in self.peers.peer_ids() {
            self.publisher
                .publish(&RelayKind::Message.topic(&peer_id), body.clone());
            self.stats.record_relayed();
            sent += 1;
        }

        tracing::info!(recipients = sent, "Broadcast system notification");
        sent
    }

    fn publish_json<T: Serialize>(&self, destination: &str, value: &T) -> usize {
        match serde_json::to_vec(value) {
            Ok(body) => {
                self.stats.record_broadcast();
                self.publisher.publish(destination, Bytes::from(body))
            }
            Err(e) => {
                tracing::warn!(destination = %destination, error = %e, "Failed to encode snapshot");
                0
            }
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Peer;
    use crate::testing::RecordingPublisher;

    struct Fixture {
        peers: Arc<PeerRegistry>,
        channels: Arc<ChannelRegistry>,
        publisher: Arc<RecordingPublisher>,
        stats: Arc<RelayStats>,
        router: RelayRouter,
    }

    fn fixture() -> Fixture {
        let peers = Arc::new(PeerRegistry::new());
        let channels = Arc::new(ChannelRegistry::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let stats = Arc::new(RelayStats::new());
        let router = RelayRouter::new(
            Arc::clone(&peers),
            Arc::clone(&channels),
            publisher.clone(),
            Arc::clone(&stats),
        );
        Fixture {
            peers,
            channels,
            publisher,
            stats,
            router,
        }
    }

    #[test]
    fn test_call_to_registered_peer_forwards_verbatim() {
        let f = fixture();
        f.peers.register(Peer::new("alice"), 1);
        let payload = Bytes::from_static(br#"{"callerId":"bob","video":true}"#);

        let outcome = f.router.relay(RelayKind::Call, "alice", payload.clone());

        assert!(outcome.is_forwarded());
        assert_eq!(f.publisher.sent(), vec![("/topic/call/alice".to_string(), payload)]);
    }

    #[test]
    fn test_call_to_absent_peer_is_dropped() {
        let f = fixture();

        let outcome = f.router.relay(RelayKind::Call, "ghost", Bytes::from_static(b"{}"));

        assert_eq!(outcome, RelayOutcome::Dropped);
        assert!(f.publisher.sent().is_empty());
        assert_eq!(f.stats.snapshot(0, 0).messages_dropped, 1);
    }

    #[test]
    fn test_other_kinds_skip_presence_check() {
        let f = fixture();

        for kind in RelayKind::ALL {
            if kind == RelayKind::Call {
                continue;
            }
            let outcome = f.router.relay(kind, "ghost", Bytes::from_static(b"x"));
            assert!(outcome.is_forwarded(), "{}", kind);
        }

        assert_eq!(f.publisher.sent().len(), RelayKind::ALL.len() - 1);
        assert!(f
            .publisher
            .destinations()
            .contains(&"/topic/file/ice/ghost".to_string()));
    }

    #[test]
    fn test_answer_routes_by_caller_id() {
        let f = fixture();
        let payload = Bytes::from_static(br#"{"callerId":"bob","accepted":true}"#);

        let outcome = f.router.answer(payload.clone());

        assert!(outcome.is_forwarded());
        assert_eq!(f.publisher.last_to("/topic/answer/bob"), Some(payload));
    }

    #[test]
    fn test_answer_without_caller_id_is_dropped() {
        let f = fixture();

        assert_eq!(f.router.answer(Bytes::from_static(b"{\"accepted\":true}")), RelayOutcome::Dropped);
        assert_eq!(f.router.answer(Bytes::from_static(b"not json")), RelayOutcome::Dropped);
        assert_eq!(f.router.answer(Bytes::from_static(b"{\"callerId\":\"\"}")), RelayOutcome::Dropped);
        assert!(f.publisher.sent().is_empty());
    }

    #[test]
    fn test_channel_message_has_no_membership_check() {
        let f = fixture();

        let outcome = f
            .router
            .channel_message("unknown-channel", Bytes::from_static(b"{\"text\":\"hi\"}"));

        assert!(outcome.is_forwarded());
        assert_eq!(f.publisher.destinations(), vec!["/topic/channel/unknown-channel".to_string()]);
    }

    #[test]
    fn test_register_channel_publishes_full_set() {
        let f = fixture();
        f.router
            .register_channel(PublicChannel::new("c1", "One"))
            .unwrap();

        let snapshot = f
            .router
            .register_channel(PublicChannel::new("c2", "Two").with_creator("alice"))
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(f.publisher.count_to(CHANNELS_TOPIC), 2);

        let body = f.publisher.last_to(CHANNELS_TOPIC).unwrap();
        let published: ChannelSnapshot = serde_json::from_slice(&body).unwrap();
        assert_eq!(published["c2"].creator_id, "alice");
        assert!(published.contains_key("c1"));
    }

    #[test]
    fn test_register_channel_rejects_empty_id() {
        let f = fixture();

        let result = f.router.register_channel(PublicChannel::new("", "Nameless"));

        assert_eq!(result, Err(RegistryError::EmptyChannelId));
        assert!(f.channels.is_empty());
        assert!(f.publisher.sent().is_empty());
    }

    #[test]
    fn test_system_notification_fans_out_per_peer() {
        let f = fixture();
        f.peers.register(Peer::new("a"), 1);
        f.peers.register(Peer::new("b"), 2);
        f.peers.register(Peer::new("c"), 3);

        let sent = f.router.broadcast_system_notification("maintenance at 22:00");

        assert_eq!(sent, 3);
        assert_eq!(f.stats.snapshot(3, 0).messages_relayed, 3);
        let mut destinations = f.publisher.destinations();
        destinations.sort();
        assert_eq!(
            destinations,
            vec!["/topic/message/a", "/topic/message/b", "/topic/message/c"]
        );

        for (_, body) in f.publisher.sent() {
            let notification: SystemNotification = serde_json::from_slice(&body).unwrap();
            assert_eq!(notification.sender_id, SYSTEM_SENDER_ID);
            assert_eq!(notification.sender_name, DEFAULT_SYSTEM_SENDER_NAME);
            assert_eq!(notification.kind, "text");
            assert_eq!(notification.text, "maintenance at 22:00");
            assert!(notification.timestamp > 0);
        }
    }

    #[test]
    fn test_system_notification_wire_format() {
        let f = fixture();
        let router = RelayRouter::new(
            Arc::clone(&f.peers),
            Arc::clone(&f.channels),
            f.publisher.clone(),
            Arc::clone(&f.stats),
        )
        .system_sender_name("Ops");
        f.peers.register(Peer::new("a"), 1);

        router.broadcast_system_notification("hello");

        let body = f.publisher.last_to("/topic/message/a").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["senderId"], "system_admin");
        assert_eq!(value["senderName"], "Ops");
        assert_eq!(value["type"], "text");
    }

    #[test]
    fn test_system_notification_with_no_peers() {
        let f = fixture();

        assert_eq!(f.router.broadcast_system_notification("anyone?"), 0);
        assert!(f.publisher.sent().is_empty());
    }
}
