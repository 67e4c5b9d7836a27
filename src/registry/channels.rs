//! Public channel registry

use dashmap::DashMap;

use super::entry::{ChannelSnapshot, PublicChannel};
use super::error::RegistryError;

/// Registry of public broadcast channels
///
/// Channels never expire; they go away only through [`ChannelRegistry::remove`]
/// or a restart. Membership is not tracked.
pub struct ChannelRegistry {
    channels: DashMap<String, PublicChannel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Insert or replace a channel keyed by its id
    pub fn put(&self, channel: PublicChannel) -> Result<(), RegistryError> {
        if channel.id.is_empty() {
            return Err(RegistryError::EmptyChannelId);
        }

        tracing::info!(
            channel_id = %channel.id,
            name = %channel.name,
            "Registered public channel"
        );
        self.channels.insert(channel.id.clone(), channel);
        Ok(())
    }

    /// Remove a channel; returns it if it existed
    pub fn remove(&self, id: &str) -> Option<PublicChannel> {
        let removed = self.channels.remove(id).map(|(_, channel)| channel);
        if removed.is_some() {
            tracing::info!(channel_id = %id, "Removed public channel");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<PublicChannel> {
        self.channels.get(id).map(|c| c.value().clone())
    }

    /// Copy of the current registry contents
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_replace() {
        let registry = ChannelRegistry::new();

        registry.put(PublicChannel::new("c1", "General")).unwrap();
        registry
            .put(PublicChannel::new("c1", "Renamed").with_tags(["news"]))
            .unwrap();

        let channel = registry.get("c1").unwrap();
        assert_eq!(channel.name, "Renamed");
        assert_eq!(channel.tags, vec!["news".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let registry = ChannelRegistry::new();

        let result = registry.put(PublicChannel::new("", "Nameless"));

        assert_eq!(result, Err(RegistryError::EmptyChannelId));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ChannelRegistry::new();
        registry.put(PublicChannel::new("c1", "General")).unwrap();

        assert!(registry.remove("c1").is_some());
        assert!(registry.remove("c1").is_none());
        assert!(registry.snapshot().is_empty());
    }
}
