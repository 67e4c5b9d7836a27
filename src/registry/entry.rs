//! Presence and channel records
//!
//! Every descriptive field is client-controlled and stored as-is. `online`
//! and `status` are whatever the client asserted; liveness is decided only
//! by whether the peer id is present in the registry.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Transport session identifier, assigned by the listener
pub type SessionId = u64;

/// Full copy of the peer registry, keyed by peer id
pub type PeerSnapshot = HashMap<String, Peer>;

/// Full copy of the channel registry, keyed by channel id
pub type ChannelSnapshot = HashMap<String, PublicChannel>;

/// Presence record for one connected client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    /// Client-chosen id, unique among active peers
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub ip: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    /// Client-asserted; not a liveness signal
    #[serde(default, deserialize_with = "null_as_default")]
    pub online: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub avatar_base64: String,
}

impl Peer {
    /// Create a peer with only an id set
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            online: true,
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

/// A public broadcast channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicChannel {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creator_id: String,
}

impl PublicChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_creator(mut self, creator_id: impl Into<String>) -> Self {
        self.creator_id = creator_id.into();
        self
    }
}

/// Clients send explicit `null` for fields they have not filled in
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
