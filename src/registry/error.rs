//! Registry error types

use thiserror::Error;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Channels are keyed by id; an empty key is never stored
    #[error("channel id must not be empty")]
    EmptyChannelId,
}
