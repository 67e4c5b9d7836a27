//! STOMP protocol constants

/// Protocol version announced in CONNECTED
pub const STOMP_VERSION: &str = "1.2";

/// WebSocket subprotocols we accept, most preferred first
pub const SUPPORTED_SUBPROTOCOLS: &[&str] = &["v12.stomp", "v11.stomp", "v10.stomp"];

/// Default WebSocket endpoint path
pub const DEFAULT_ENDPOINT_PATH: &str = "/signal";

/// Prefix for client-to-server application destinations
pub const APP_PREFIX: &str = "/app";

/// Prefix for broker (publish/subscribe) destinations
pub const TOPIC_PREFIX: &str = "/topic";

/// Server name announced in CONNECTED
pub const SERVER_NAME: &str = concat!("rendezvous-rs/", env!("CARGO_PKG_VERSION"));

/// Content type for every body we emit
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Lower bound for the configurable frame size limit
pub const MIN_FRAME_SIZE: usize = 4 * 1024;

/// Default maximum frame size (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

pub mod header {
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    pub const DESTINATION: &str = "destination";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const ID: &str = "id";
    pub const MESSAGE: &str = "message";
    pub const MESSAGE_ID: &str = "message-id";
    pub const PASSCODE: &str = "passcode";
    pub const RECEIPT: &str = "receipt";
    pub const RECEIPT_ID: &str = "receipt-id";
    pub const SERVER: &str = "server";
    pub const SESSION: &str = "session";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const USER_NAME: &str = "user-name";
    pub const VERSION: &str = "version";
}
