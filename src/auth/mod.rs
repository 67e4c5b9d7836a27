//! Connection authentication
//!
//! Every session must present a credential in its CONNECT frame before any
//! other frame is accepted. Issuing credentials and storing users is the job
//! of an external service behind [`IdentityProvider`].

pub mod provider;

use std::future::Future;
use std::time::SystemTime;

use crate::error::AuthError;
use crate::protocol::constants::header;
use crate::protocol::Frame;

pub use provider::StaticIdentityProvider;

/// Account role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => f.write_str("USER"),
            Role::Admin => f.write_str("ADMIN"),
        }
    }
}

/// Who is behind a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub role: Role,
    /// Ban expiry; `None` if not banned
    pub banned_until: Option<SystemTime>,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            banned_until: None,
        }
    }

    pub fn banned_until(mut self, until: SystemTime) -> Self {
        self.banned_until = Some(until);
        self
    }

    /// Whether a ban is in force at `now`
    pub fn is_banned_at(&self, now: SystemTime) -> bool {
        self.banned_until.map_or(false, |until| until > now)
    }
}

/// Source of identities for incoming connections
///
/// Implementations may use `async fn` for both methods.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Resolve a credential token to an identity
    fn authenticate(&self, token: &str) -> impl Future<Output = Result<Identity, AuthError>> + Send;

    /// Whether the named user is currently banned
    fn is_banned(&self, username: &str) -> impl Future<Output = bool> + Send;
}

/// Pull the credential out of a CONNECT frame
///
/// `Authorization: Bearer <token>` wins; a non-empty `passcode` is the
/// fallback for clients that cannot set arbitrary headers.
pub fn extract_token(frame: &Frame) -> Option<&str> {
    let bearer = frame
        .get(header::AUTHORIZATION)
        .or_else(|| frame.get("authorization"))
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer.or_else(|| frame.get(header::PASSCODE).filter(|p| !p.is_empty()))
}

/// Authenticate a CONNECT frame against a provider
pub async fn authorize<I: IdentityProvider>(provider: &I, frame: &Frame) -> Result<Identity, AuthError> {
    let token = extract_token(frame).ok_or(AuthError::MissingCredentials)?;
    let identity = provider.authenticate(token).await?;

    if identity.is_banned_at(SystemTime::now()) || provider.is_banned(&identity.username).await {
        return Err(AuthError::Banned(identity.username));
    }

    Ok(identity)
}
