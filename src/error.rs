//! Error types
//!
//! Errors that can end a session. Nothing in the relay path itself fails
//! because a recipient is missing; undeliverable messages are dropped.

use std::time::Duration;

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// STOMP framing and sequencing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header")]
    InvalidEscape,

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("frame body not terminated by NUL")]
    MissingNul,

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("unexpected frame: {0}")]
    UnexpectedFrame(String),
}

/// Reasons a connection attempt is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no credentials supplied")]
    MissingCredentials,

    #[error("invalid token")]
    InvalidToken,

    #[error("user {0} is banned")]
    Banned(String),
}
