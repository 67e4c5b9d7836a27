//! STOMP frame codec
//!
//! A STOMP frame on the wire:
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! <body bytes>\0
//! ```
//!
//! Lines may also end in `\r\n`. Bare EOLs between frames are heart-beats.
//! When `content-length` is present the body is exactly that many bytes (and
//! may contain NULs); otherwise it runs to the first NUL.
//!
//! Reference: STOMP Protocol Specification, Version 1.2

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{header, JSON_CONTENT_TYPE, SERVER_NAME, STOMP_VERSION};
use crate::error::ProtocolError;

/// STOMP frame command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    // Client frames
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED frames carry header values unescaped
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
///
/// Headers keep their wire order. Repeated headers are allowed; lookups
/// return the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    /// Create an empty frame
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value (first occurrence wins)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Body as UTF-8 text
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// CONNECTED reply for an accepted session
    pub fn connected(session_id: u64, username: &str) -> Self {
        Frame::new(Command::Connected)
            .header(header::VERSION, STOMP_VERSION)
            .header(header::HEART_BEAT, "0,0")
            .header(header::SERVER, SERVER_NAME)
            .header(header::SESSION, session_id.to_string())
            .header(header::USER_NAME, username)
    }

    /// MESSAGE delivered to a subscription
    pub fn message(destination: &str, subscription: &str, message_id: u64, body: Bytes) -> Self {
        Frame::new(Command::Message)
            .header(header::DESTINATION, destination)
            .header(header::SUBSCRIPTION, subscription)
            .header(header::MESSAGE_ID, message_id.to_string())
            .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(body)
    }

    /// RECEIPT for a frame that asked for one
    pub fn receipt(receipt_id: &str) -> Self {
        Frame::new(Command::Receipt).header(header::RECEIPT_ID, receipt_id)
    }

    /// ERROR frame; the session is closed after sending it
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Frame::new(Command::Error)
            .header(header::MESSAGE, message.clone())
            .header(header::CONTENT_TYPE, "text/plain")
            .with_body(message)
    }

    /// Client CONNECT carrying a bearer token
    pub fn connect(host: &str, token: &str) -> Self {
        Frame::new(Command::Connect)
            .header(header::ACCEPT_VERSION, "1.2,1.1,1.0")
            .header("host", host)
            .header(header::HEART_BEAT, "0,0")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
    }

    /// Client SEND
    pub fn send(destination: &str, body: impl Into<Bytes>) -> Self {
        Frame::new(Command::Send)
            .header(header::DESTINATION, destination)
            .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .with_body(body)
    }

    /// Client SUBSCRIBE
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header(header::ID, id)
            .header(header::DESTINATION, destination)
    }

    /// Client UNSUBSCRIBE
    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header(header::ID, id)
    }

    /// Client DISCONNECT, optionally asking for a receipt
    pub fn disconnect(receipt: Option<&str>) -> Self {
        let frame = Frame::new(Command::Disconnect);
        match receipt {
            Some(id) => frame.header(header::RECEIPT, id),
            None => frame,
        }
    }

    /// Serialize the frame into `buf`
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already set one.
    pub fn encode(&self, buf: &mut BytesMut) {
        let escape = self.command.escapes_headers();

        buf.put_slice(self.command.as_str().as_bytes());
        buf.put_u8(b'\n');

        for (name, value) in &self.headers {
            if escape {
                buf.put_slice(escape_header(name).as_bytes());
                buf.put_u8(b':');
                buf.put_slice(escape_header(value).as_bytes());
            } else {
                buf.put_slice(name.as_bytes());
                buf.put_u8(b':');
                buf.put_slice(value.as_bytes());
            }
            buf.put_u8(b'\n');
        }

        if !self.body.is_empty() && self.get(header::CONTENT_LENGTH).is_none() {
            buf.put_slice(header::CONTENT_LENGTH.as_bytes());
            buf.put_u8(b':');
            buf.put_slice(self.body.len().to_string().as_bytes());
            buf.put_u8(b'\n');
        }

        buf.put_u8(b'\n');
        buf.put_slice(&self.body);
        buf.put_u8(0);
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64 + self.body.len());
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Incremental frame decoder
///
/// Feed raw transport bytes into a `BytesMut` and call [`FrameDecoder::decode`]
/// until it returns `Ok(None)`.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Try to take one complete frame off the front of `buf`
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        skip_heartbeats(buf);
        if buf.is_empty() {
            return Ok(None);
        }

        let (head_len, body_start) = match find_head_end(buf) {
            Some(bounds) => bounds,
            None => return self.need_more(buf),
        };

        let head = std::str::from_utf8(&buf[..head_len]).map_err(|_| ProtocolError::InvalidUtf8)?;
        let mut lines = head
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l));

        let command_line = lines.next().unwrap_or_default();
        let command = Command::parse(command_line)
            .ok_or_else(|| ProtocolError::UnknownCommand(command_line.to_string()))?;

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == header::CONTENT_LENGTH)
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                let body_end = match body_start.checked_add(len) {
                    Some(end) if end <= self.max_frame_size => end,
                    _ => {
                        return Err(ProtocolError::FrameTooLarge {
                            limit: self.max_frame_size,
                        })
                    }
                };
                if buf.len() <= body_end {
                    return Ok(None);
                }
                if buf[body_end] != 0 {
                    return Err(ProtocolError::MissingNul);
                }
                len
            }
            None => match buf[body_start..].iter().position(|&b| b == 0) {
                Some(len) => len,
                None => return self.need_more(buf),
            },
        };

        let raw = buf.split_to(body_start + body_len + 1).freeze();
        let frame = Frame {
            command,
            headers,
            body: raw.slice(body_start..body_start + body_len),
        };

        tracing::trace!(
            command = %frame.command,
            headers = frame.headers.len(),
            body_len = frame.body.len(),
            "Decoded frame"
        );

        Ok(Some(frame))
    }

    fn need_more(&self, buf: &BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if buf.len() > self.max_frame_size {
            Err(ProtocolError::FrameTooLarge {
                limit: self.max_frame_size,
            })
        } else {
            Ok(None)
        }
    }
}

fn skip_heartbeats(buf: &mut BytesMut) {
    let mut skip = 0;
    while skip < buf.len() {
        match buf[skip] {
            b'\n' => skip += 1,
            b'\r' if buf.get(skip + 1) == Some(&b'\n') => skip += 2,
            _ => break,
        }
    }
    let _ = buf.split_to(skip);
}

/// Locate the blank line ending the header section
///
/// Returns (length of command + header text, offset of first body byte).
fn find_head_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut line_start = 0;
    for (i, &b) in buf.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let line = &buf[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && line_start > 0 {
            return Some((line_start, i + 1));
        }
        line_start = i + 1;
    }
    None
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape),
        }
    }
    Ok(out)
}
