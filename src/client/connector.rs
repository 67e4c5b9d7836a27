//! Signaling client
//!
//! Connects to a relay server over WebSocket, performs the STOMP CONNECT
//! exchange and then runs two background tasks: a writer draining an
//! outbound frame queue, and a reader turning inbound frames into
//! [`ClientEvent`]s and completing receipt waits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::config::ClientConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::header;
use crate::protocol::ws::{append_payload, to_message};
use crate::protocol::{Command, Frame, FrameDecoder};
use crate::registry::Peer;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type PendingReceipts = Arc<DashMap<String, oneshot::Sender<()>>>;

/// Events from the signaling client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A publish on one of our subscriptions
    Message {
        destination: String,
        subscription: String,
        body: Bytes,
    },

    /// A receipt nobody was waiting for
    Receipt(String),

    /// ERROR frame or transport failure
    Error(String),

    /// Connection closed
    Disconnected,
}

impl ClientEvent {
    /// Decode a message body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            ClientEvent::Message { body, .. } => serde_json::from_slice(body).ok(),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&str> {
        match self {
            ClientEvent::Message { destination, .. } => Some(destination),
            _ => None,
        }
    }
}

/// Connected signaling client
///
/// # Example
/// ```no_run
/// use rendezvous_rs::client::{ClientConfig, SignalClient};
/// use rendezvous_rs::registry::Peer;
///
/// # async fn example() -> rendezvous_rs::error::Result<()> {
/// let config = ClientConfig::new("ws://localhost:8080/signal", "my-token");
/// let (client, mut events) = SignalClient::connect(config).await?;
///
/// client.subscribe("/topic/call/alice").await?;
/// client.register(&Peer::new("alice").with_display_name("Alice")).await?;
///
/// while let Some(event) = events.recv().await {
///     println!("Event: {:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct SignalClient {
    config: ClientConfig,
    session: Option<String>,
    outbound: mpsc::Sender<Frame>,
    pending: PendingReceipts,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SignalClient {
    /// Connect and authenticate
    ///
    /// Returns the client and a receiver for events. A server refusal
    /// surfaces as [`Error::Rejected`].
    pub async fn connect(config: ClientConfig) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let timeout = config.connect_timeout;
        tokio::time::timeout(timeout, Self::establish(config))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    async fn establish(config: ClientConfig) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let mut request = config.url.as_str().into_client_request()?;
        if let Some(ref subprotocol) = config.subprotocol {
            let value = HeaderValue::from_str(subprotocol)
                .map_err(|_| ProtocolError::MalformedHeader(subprotocol.clone()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
        let host = request.uri().host().unwrap_or("localhost").to_string();

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut sink, mut stream) = ws.split();

        sink.send(to_message(&Frame::connect(&host, &config.token))).await?;

        let decoder = FrameDecoder::new(config.max_frame_size);
        let mut buf = BytesMut::new();
        let reply = read_frame(&mut stream, &decoder, &mut buf)
            .await?
            .ok_or(Error::ConnectionClosed)?;

        match reply.command {
            Command::Connected => {}
            Command::Error => {
                let message = reply.get(header::MESSAGE).unwrap_or("connection refused");
                return Err(Error::Rejected(message.to_string()));
            }
            other => return Err(ProtocolError::UnexpectedFrame(other.to_string()).into()),
        }

        let session = reply.get(header::SESSION).map(str::to_string);
        tracing::debug!(url = %config.url, session = ?session, "Connected");

        let (outbound, outbound_rx) = mpsc::channel(config.event_buffer);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);
        let pending: PendingReceipts = Arc::new(DashMap::new());

        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(stream, decoder, buf, event_tx, Arc::clone(&pending)));

        let client = Self {
            config,
            session,
            outbound,
            pending,
            next_id: AtomicU64::new(0),
            reader,
            writer,
        };

        Ok((client, event_rx))
    }

    /// Session id assigned by the server
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    /// Subscribe to a topic
    ///
    /// Resolves once the server has confirmed the subscription, so publishes
    /// made after this returns are guaranteed to be delivered.
    pub async fn subscribe(&self, destination: &str) -> Result<String> {
        let id = self.next_id("sub");
        self.request(Frame::subscribe(&id, destination)).await?;
        Ok(id)
    }

    pub async fn unsubscribe(&self, id: &str) -> Result<()> {
        self.request(Frame::unsubscribe(id)).await
    }

    /// Fire-and-forget SEND
    pub async fn send(&self, destination: &str, body: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Frame::send(destination, body)).await
    }

    /// SEND and wait until the server has processed it
    pub async fn send_with_receipt(&self, destination: &str, body: impl Into<Bytes>) -> Result<()> {
        self.request(Frame::send(destination, body)).await
    }

    /// Serialize `value` and SEND it, waiting for the receipt
    pub async fn send_json<T: Serialize>(&self, destination: &str, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.send_with_receipt(destination, body).await
    }

    /// Announce a peer on this session
    pub async fn register(&self, peer: &Peer) -> Result<()> {
        self.send_json("/app/register", peer).await
    }

    /// Remove a peer by id
    pub async fn unregister(&self, peer_id: &str) -> Result<()> {
        self.send_json("/app/disconnect", &peer_id).await
    }

    /// Graceful DISCONNECT
    ///
    /// Waits for the server's receipt so queued frames are flushed first.
    pub async fn disconnect(self) -> Result<()> {
        let id = self.next_id("disconnect");
        self.request_with_id(Frame::disconnect(None), id).await
    }

    /// Drop the connection without a DISCONNECT
    pub fn abort(self) {}

    async fn request(&self, frame: Frame) -> Result<()> {
        let id = self.next_id("rcpt");
        self.request_with_id(frame, id).await
    }

    async fn request_with_id(&self, frame: Frame, id: String) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);

        if let Err(e) = self.enqueue(frame.header(header::RECEIPT, id.clone())).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.receipt_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::Timeout(self.config.receipt_timeout))
            }
        }
    }

    async fn enqueue(&self, frame: Frame) -> Result<()> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Drop for SignalClient {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Read until one full frame is decoded; `None` on close
async fn read_frame(
    stream: &mut SplitStream<WsStream>,
    decoder: &FrameDecoder,
    buf: &mut BytesMut,
) -> Result<Option<Frame>> {
    loop {
        if let Some(frame) = decoder.decode(buf)? {
            return Ok(Some(frame));
        }

        let message = match stream.next().await {
            Some(message) => message?,
            None => return Ok(None),
        };

        if message.is_close() {
            return Ok(None);
        }
        append_payload(buf, &message);
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    decoder: FrameDecoder,
    mut buf: BytesMut,
    events: mpsc::Sender<ClientEvent>,
    pending: PendingReceipts,
) {
    loop {
        let frame = match read_frame(&mut stream, &decoder, &mut buf).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                let _ = events.send(ClientEvent::Error(e.to_string())).await;
                break;
            }
        };

        match frame.command {
            Command::Message => {
                let event = ClientEvent::Message {
                    destination: frame.get(header::DESTINATION).unwrap_or_default().to_string(),
                    subscription: frame.get(header::SUBSCRIPTION).unwrap_or_default().to_string(),
                    body: frame.body,
                };
                let _ = events.send(event).await;
            }
            Command::Receipt => {
                let id = frame.get(header::RECEIPT_ID).unwrap_or_default();
                match pending.remove(id) {
                    Some((_, waiter)) => {
                        let _ = waiter.send(());
                    }
                    None => {
                        let _ = events.send(ClientEvent::Receipt(id.to_string())).await;
                    }
                }
            }
            Command::Error => {
                let message = frame.get(header::MESSAGE).unwrap_or("server error").to_string();
                tracing::debug!(error = %message, "Server sent ERROR");
                let _ = events.send(ClientEvent::Error(message)).await;
                break;
            }
            other => {
                tracing::trace!(command = %other, "Ignoring frame");
            }
        }
    }

    // Fail every outstanding receipt wait
    pending.clear();
    let _ = events.send(ClientEvent::Disconnected).await;
}

async fn write_loop(mut sink: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(to_message(&frame)).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            return;
        }
    }
    let _ = sink.close().await;
}
