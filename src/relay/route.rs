//! Inbound routes and outbound addresses
//!
//! Clients SEND to `/app/...` destinations and SUBSCRIBE to `/topic/...`
//! destinations. Path variables are single segments.
//!
//! | Inbound (`/app/`)             | Outbound (`/topic/`)          |
//! |-------------------------------|-------------------------------|
//! | `register`                    | `peers`                       |
//! | `disconnect`                  | `peers`                       |
//! | `call/{target}`               | `call/{target}`               |
//! | `answer`                      | `answer/{callerId}`           |
//! | `hangup/{target}`             | `hangup/{target}`             |
//! | `webrtc/sdp/{target}`         | `webrtc/sdp/{target}`         |
//! | `webrtc/ice/{target}`         | `webrtc/ice/{target}`         |
//! | `message/{target}`            | `message/{target}`            |
//! | `channel/register`            | `channels`                    |
//! | `channel/message/{channel}`   | `channel/{channel}`           |
//! | `file/{phase}/{target}`       | `file/{phase}/{target}`       |

use crate::protocol::constants::{APP_PREFIX, TOPIC_PREFIX};

/// Full peer snapshot topic
pub const PEERS_TOPIC: &str = "/topic/peers";

/// Full channel snapshot topic
pub const CHANNELS_TOPIC: &str = "/topic/channels";

/// Topic a public channel's messages are published to
pub fn channel_topic(channel_id: &str) -> String {
    format!("{}/channel/{}", TOPIC_PREFIX, channel_id)
}

/// Kinds of message forwarded to a single peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    Call,
    Answer,
    Hangup,
    Sdp,
    Ice,
    Message,
    FileRequest,
    FileAccept,
    FileSdp,
    FileIce,
}

impl RelayKind {
    /// Every directed kind
    pub const ALL: [RelayKind; 10] = [
        RelayKind::Call,
        RelayKind::Answer,
        RelayKind::Hangup,
        RelayKind::Sdp,
        RelayKind::Ice,
        RelayKind::Message,
        RelayKind::FileRequest,
        RelayKind::FileAccept,
        RelayKind::FileSdp,
        RelayKind::FileIce,
    ];

    fn path(&self) -> &'static str {
        match self {
            RelayKind::Call => "call",
            RelayKind::Answer => "answer",
            RelayKind::Hangup => "hangup",
            RelayKind::Sdp => "webrtc/sdp",
            RelayKind::Ice => "webrtc/ice",
            RelayKind::Message => "message",
            RelayKind::FileRequest => "file/request",
            RelayKind::FileAccept => "file/accept",
            RelayKind::FileSdp => "file/sdp",
            RelayKind::FileIce => "file/ice",
        }
    }

    /// Outbound address for this kind and peer
    pub fn topic(&self, peer_id: &str) -> String {
        format!("{}/{}/{}", TOPIC_PREFIX, self.path(), peer_id)
    }
}

impl std::fmt::Display for RelayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// A parsed inbound `/app/...` destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Register,
    Disconnect,
    /// Target comes from the body's `callerId`
    Answer,
    ChannelRegister,
    ChannelMessage(String),
    /// Forward to `kind.topic(target)`
    Directed(RelayKind, String),
}

impl Route {
    /// Parse an application destination; `None` for anything unrouted
    pub fn parse(destination: &str) -> Option<Route> {
        let path = destination.strip_prefix(APP_PREFIX)?.strip_prefix('/')?;
        let segments: Vec<&str> = path.split('/').collect();

        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }

        match segments.as_slice() {
            ["register"] => Some(Route::Register),
            ["disconnect"] => Some(Route::Disconnect),
            ["answer"] => Some(Route::Answer),
            ["channel", "register"] => Some(Route::ChannelRegister),
            ["channel", "message", id] => Some(Route::ChannelMessage(id.to_string())),
            ["call", target] => directed(RelayKind::Call, target),
            ["hangup", target] => directed(RelayKind::Hangup, target),
            ["webrtc", "sdp", target] => directed(RelayKind::Sdp, target),
            ["webrtc", "ice", target] => directed(RelayKind::Ice, target),
            ["message", target] => directed(RelayKind::Message, target),
            ["file", "request", target] => directed(RelayKind::FileRequest, target),
            ["file", "accept", target] => directed(RelayKind::FileAccept, target),
            ["file", "sdp", target] => directed(RelayKind::FileSdp, target),
            ["file", "ice", target] => directed(RelayKind::FileIce, target),
            _ => None,
        }
    }
}

fn directed(kind: RelayKind, target: &str) -> Option<Route> {
    Some(Route::Directed(kind, target.to_string()))
}

/// Whether a destination belongs to the broker rather than the application
pub fn is_topic(destination: &str) -> bool {
    destination
        .strip_prefix(TOPIC_PREFIX)
        .map_or(false, |rest| rest.starts_with('/') && rest.len() > 1)
}

/// Extract a peer id from a `disconnect` body
///
/// Clients send either the bare id or a JSON string.
pub fn peer_id_from_body(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body).ok()?.trim();
    let id = serde_json::from_str::<String>(text).unwrap_or_else(|_| text.to_string());
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
