//! In-memory identity provider

use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use super::{Identity, IdentityProvider};
use crate::error::AuthError;

/// Fixed token table with username bans
///
/// Meant for demos, tests and small deployments that hand out tokens by
/// other means.
#[derive(Default)]
pub struct StaticIdentityProvider {
    tokens: DashMap<String, Identity>,
    /// username -> ban expiry (`None` = permanent)
    bans: DashMap<String, Option<SystemTime>>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`
    pub fn insert(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    /// Stop accepting a token; returns whether it was known
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    /// Ban a user until `until`, or permanently
    pub fn ban(&self, username: impl Into<String>, until: Option<SystemTime>) {
        let username = username.into();
        tracing::info!(username = %username, until = ?until, "User banned");
        self.bans.insert(username, until);
    }

    /// Ban a user for a duration from now
    pub fn ban_for(&self, username: impl Into<String>, duration: Duration) {
        self.ban(username, Some(SystemTime::now() + duration));
    }

    pub fn unban(&self, username: &str) -> bool {
        self.bans.remove(username).is_some()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .map(|identity| identity.value().clone())
            .ok_or(AuthError::InvalidToken)
    }

    async fn is_banned(&self, username: &str) -> bool {
        match self.bans.get(username).map(|until| *until.value()) {
            Some(None) => true,
            Some(Some(until)) => until > SystemTime::now(),
            None => false,
        }
    }
}
