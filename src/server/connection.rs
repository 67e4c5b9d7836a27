//! Per-session connection handler
//!
//! Each accepted WebSocket gets one `Connection`. The read side decodes
//! STOMP frames and acts on them; a writer task owns the sink and drains an
//! outbound queue fed by the session itself and by one forwarder task per
//! subscription.
//!
//! ```text
//!   ws stream ──► FrameDecoder ──► handle_frame ──► SignalHub::dispatch
//!                                       │
//!                                       └─ SUBSCRIBE ──► forwarder task ─┐
//!                                                                        ▼
//!   ws sink ◄── writer task ◄────────── mpsc<Frame> ◄────────── replies / MESSAGE
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::auth::{authorize, IdentityProvider};
use crate::error::{Error, ProtocolError, Result};
use crate::hub::SignalHub;
use crate::protocol::constants::{header, SUPPORTED_SUBPROTOCOLS};
use crate::protocol::ws::{append_payload, to_message};
use crate::protocol::{Command, Frame, FrameDecoder};
use crate::relay::route::is_topic;
use crate::server::config::ServerConfig;
use crate::session::{SessionGuard, SessionPhase, SessionState};

/// How long the writer gets to flush a final ERROR or RECEIPT
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on a single WebSocket write to a client that stopped reading
const SEND_TIME_LIMIT: Duration = Duration::from_secs(60);

enum Flow {
    Continue,
    Close,
}

/// Upgrade a raw stream to a WebSocket on the configured endpoint
///
/// Upgrades for any other path are refused with 404. The first supported
/// STOMP subprotocol the client offers is echoed back.
pub async fn accept_websocket<S>(stream: S, config: &ServerConfig) -> Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let endpoint = config.endpoint_path.clone();

    let callback = move |request: &Request, mut response: Response| {
        if request.uri().path() != endpoint {
            tracing::debug!(path = %request.uri().path(), "Upgrade refused: unknown endpoint");
            let mut refusal = ErrorResponse::new(Some("not found".to_string()));
            *refusal.status_mut() = StatusCode::NOT_FOUND;
            return Err(refusal);
        }

        if let Some(protocol) = negotiate_subprotocol(request) {
            response
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(protocol));
        }
        Ok(response)
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_frame_size);
    ws_config.max_frame_size = Some(config.max_frame_size);

    let ws = tokio_tungstenite::accept_hdr_async_with_config(stream, callback, Some(ws_config)).await?;
    Ok(ws)
}

fn negotiate_subprotocol(request: &Request) -> Option<&'static str> {
    let offered: Vec<&str> = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .collect();

    SUPPORTED_SUBPROTOCOLS
        .iter()
        .copied()
        .find(|supported| offered.contains(supported))
}

/// One signaling session
pub struct Connection<I: IdentityProvider> {
    state: SessionState,
    guard: SessionGuard,
    config: ServerConfig,
    hub: Arc<SignalHub>,
    provider: Arc<I>,
    decoder: FrameDecoder,
    read_buf: BytesMut,
    /// Subscription id -> forwarder task
    forwarders: HashMap<String, JoinHandle<()>>,
    next_message_id: Arc<AtomicU64>,
}

impl<I: IdentityProvider> Connection<I> {
    /// Create the session and count it as active
    ///
    /// The session stays counted, and keeps its peer binding, until the
    /// connection shuts down or is dropped.
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        config: ServerConfig,
        hub: Arc<SignalHub>,
        provider: Arc<I>,
    ) -> Self {
        let decoder = FrameDecoder::new(config.max_frame_size);
        Self {
            state: SessionState::new(session_id, peer_addr),
            guard: SessionGuard::open(Arc::clone(&hub), session_id),
            config,
            hub,
            provider,
            decoder,
            read_buf: BytesMut::with_capacity(4096),
            forwarders: HashMap::new(),
            next_message_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn session_id(&self) -> u64 {
        self.state.id
    }

    /// Drive the session until the client leaves or an error ends it
    ///
    /// The session's peer binding is released on every exit path, including
    /// a panic while the session is being driven.
    pub async fn run<S>(&mut self, ws: WebSocketStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut stream) = ws.split();
        let (tx, rx) = mpsc::channel(self.config.outbound_queue_size);
        let mut writer = tokio::spawn(write_loop(sink, rx));

        let result = self.read_loop(&mut stream, &tx).await;

        if let Some(message) = error_reply(&result) {
            let _ = tx.send(Frame::error(message)).await;
        }

        self.shutdown();
        drop(tx);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            tracing::debug!(session_id = self.state.id, "Writer did not drain in time");
            writer.abort();
        }

        result
    }

    async fn read_loop<S>(&mut self, stream: &mut SplitStream<WebSocketStream<S>>, tx: &mpsc::Sender<Frame>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let connect_deadline = Instant::now() + self.config.connection_timeout;

        loop {
            let next = if self.state.is_active() {
                stream.next().await
            } else {
                tokio::time::timeout_at(connect_deadline, stream.next())
                    .await
                    .map_err(|_| Error::Timeout(self.config.connection_timeout))?
            };

            let message = match next {
                Some(message) => message?,
                None => return Ok(()),
            };

            if message.is_close() {
                return Ok(());
            }
            // Pings are answered by tungstenite
            if !append_payload(&mut self.read_buf, &message) {
                continue;
            }

            while let Some(frame) = self.decoder.decode(&mut self.read_buf)? {
                self.state.frames_received += 1;
                if let Flow::Close = self.handle_frame(frame, tx).await? {
                    return Ok(());
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame, tx: &mpsc::Sender<Frame>) -> Result<Flow> {
        tracing::trace!(
            session_id = self.state.id,
            command = %frame.command,
            "Frame received"
        );

        if !self.state.is_active() && !matches!(frame.command, Command::Connect | Command::Stomp) {
            return Err(ProtocolError::UnexpectedFrame(format!("{} before CONNECT", frame.command)).into());
        }

        let flow = match frame.command {
            Command::Connect | Command::Stomp => {
                self.on_connect(&frame, tx).await?;
                Flow::Continue
            }
            Command::Send => {
                let destination = frame
                    .get(header::DESTINATION)
                    .ok_or(ProtocolError::MissingHeader(header::DESTINATION))?;
                self.hub.dispatch(self.state.id, destination, frame.body.clone());
                Flow::Continue
            }
            Command::Subscribe => {
                self.on_subscribe(&frame, tx)?;
                Flow::Continue
            }
            Command::Unsubscribe => {
                let id = frame
                    .get(header::ID)
                    .ok_or(ProtocolError::MissingHeader(header::ID))?;
                if let Some(forwarder) = self.forwarders.remove(id) {
                    forwarder.abort();
                }
                self.state.remove_subscription(id);
                Flow::Continue
            }
            Command::Disconnect => {
                self.state.close();
                tracing::debug!(session_id = self.state.id, "Client disconnected");
                Flow::Close
            }
            Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => Flow::Continue,
            Command::Connected | Command::Message | Command::Receipt | Command::Error => {
                return Err(ProtocolError::UnexpectedFrame(frame.command.to_string()).into());
            }
        };

        if let Some(receipt) = frame.get(header::RECEIPT) {
            self.send(tx, Frame::receipt(receipt)).await?;
        }

        Ok(flow)
    }

    async fn on_connect(&mut self, frame: &Frame, tx: &mpsc::Sender<Frame>) -> Result<()> {
        if self.state.phase != SessionPhase::Connected {
            return Err(ProtocolError::UnexpectedFrame("duplicate CONNECT".into()).into());
        }

        let identity = match authorize(self.provider.as_ref(), frame).await {
            Ok(identity) => identity,
            Err(e) => {
                tracing::warn!(
                    session_id = self.state.id,
                    peer = %self.state.peer_addr,
                    error = %e,
                    "Connection rejected"
                );
                self.hub.relay_stats().session_rejected();
                return Err(e.into());
            }
        };

        tracing::debug!(
            session_id = self.state.id,
            username = %identity.username,
            role = %identity.role,
            "Session authenticated"
        );

        let reply = Frame::connected(self.state.id, &identity.username);
        self.state.on_connect(identity);
        self.send(tx, reply).await
    }

    fn on_subscribe(&mut self, frame: &Frame, tx: &mpsc::Sender<Frame>) -> Result<()> {
        let id = frame
            .get(header::ID)
            .ok_or(ProtocolError::MissingHeader(header::ID))?
            .to_string();
        let destination = frame
            .get(header::DESTINATION)
            .ok_or(ProtocolError::MissingHeader(header::DESTINATION))?
            .to_string();

        if !is_topic(&destination) {
            tracing::warn!(
                session_id = self.state.id,
                destination = %destination,
                "Ignoring subscription outside the broker"
            );
            return Ok(());
        }

        let rx = self.hub.broker().subscribe(&destination);
        let forwarder = tokio::spawn(forward_loop(
            self.state.id,
            id.clone(),
            rx,
            tx.clone(),
            Arc::clone(&self.next_message_id),
        ));

        if let Some(previous) = self.forwarders.insert(id.clone(), forwarder) {
            previous.abort();
        }

        tracing::debug!(
            session_id = self.state.id,
            subscription = %id,
            destination = %destination,
            "Subscribed"
        );
        self.state.add_subscription(id, destination);
        Ok(())
    }

    async fn send(&mut self, tx: &mpsc::Sender<Frame>, frame: Frame) -> Result<()> {
        tx.send(frame).await.map_err(|_| Error::ConnectionClosed)?;
        self.state.frames_sent += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
        self.state.mark_closed();

        if let Some(peer_id) = self.guard.release() {
            tracing::debug!(
                session_id = self.state.id,
                peer_id = %peer_id,
                "Released peer binding"
            );
        }

        tracing::debug!(
            session_id = self.state.id,
            duration = ?self.state.duration(),
            frames_received = self.state.frames_received,
            frames_sent = self.state.frames_sent,
            "Session closed"
        );
    }
}

impl<I: IdentityProvider> Drop for Connection<I> {
    fn drop(&mut self) {
        // Forwarders hold the outbound queue open; stop them so the writer exits
        for (_, forwarder) in self.forwarders.drain() {
            forwarder.abort();
        }
    }
}

/// What to tell the client before closing, if anything
fn error_reply(result: &Result<()>) -> Option<String> {
    match result {
        Err(Error::Protocol(e)) => Some(e.to_string()),
        Err(Error::Auth(e)) => Some(e.to_string()),
        Err(Error::Timeout(after)) => Some(format!("no CONNECT within {:?}", after)),
        _ => None,
    }
}

async fn forward_loop(
    session_id: u64,
    subscription: String,
    mut rx: broadcast::Receiver<crate::broker::Delivery>,
    tx: mpsc::Sender<Frame>,
    next_message_id: Arc<AtomicU64>,
) {
    loop {
        match rx.recv().await {
            Ok(delivery) => {
                let message_id = next_message_id.fetch_add(1, Ordering::Relaxed);
                let frame = Frame::message(&delivery.destination, &subscription, message_id, delivery.body);
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    session_id = session_id,
                    subscription = %subscription,
                    skipped = skipped,
                    "Subscriber lagging, messages skipped"
                );
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_loop<S>(mut sink: SplitSink<WebSocketStream<S>, Message>, mut rx: mpsc::Receiver<Frame>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let is_error = frame.command == Command::Error;

        match tokio::time::timeout(SEND_TIME_LIMIT, sink.send(to_message(&frame))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket write failed");
                return;
            }
            Err(_) => {
                tracing::warn!(limit = ?SEND_TIME_LIMIT, "WebSocket write timed out, dropping client");
                return;
            }
        }

        if is_error {
            break;
        }
    }

    let _ = sink.close().await;
}
