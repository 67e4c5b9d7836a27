//! STOMP frames on WebSocket messages

use bytes::BytesMut;
use tokio_tungstenite::tungstenite::Message;

use super::Frame;

/// Wrap an encoded frame in a WebSocket message
///
/// STOMP-over-WebSocket clients expect text messages. Frames whose body is
/// not UTF-8 go out as binary.
pub fn to_message(frame: &Frame) -> Message {
    let bytes = frame.to_bytes();
    match String::from_utf8(bytes.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

/// Append a message's payload to the decode buffer
///
/// Returns `false` for control messages, which carry no frame data.
pub fn append_payload(buf: &mut BytesMut, message: &Message) -> bool {
    match message {
        Message::Text(text) => buf.extend_from_slice(text.as_bytes()),
        Message::Binary(data) => buf.extend_from_slice(data),
        _ => return false,
    }
    true
}
