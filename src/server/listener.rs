//! Signaling server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::auth::IdentityProvider;
use crate::error::{Error, Result};
use crate::hub::SignalHub;
use crate::server::config::ServerConfig;
use crate::server::connection::{accept_websocket, Connection};

/// Signaling server
pub struct RelayServer<I: IdentityProvider> {
    config: ServerConfig,
    provider: Arc<I>,
    hub: Arc<SignalHub>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<I: IdentityProvider> RelayServer<I> {
    /// Create a new server with the given configuration and identity provider
    pub fn new(config: ServerConfig, provider: I) -> Self {
        let hub = Arc::new(SignalHub::new(&config));
        Self::with_hub(config, provider, hub)
    }

    /// Create a server around an existing hub
    pub fn with_hub(config: ServerConfig, provider: I, hub: Arc<SignalHub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            provider: Arc::new(provider),
            hub,
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the shared hub
    pub fn hub(&self) -> &Arc<SignalHub> {
        &self.hub
    }

    /// Run the server
    ///
    /// This method blocks until the server fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    ///
    /// Lets callers bind port 0 and learn the address before serving.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            endpoint = %self.config.endpoint_path,
            "Signaling server listening"
        );

        let background = self.spawn_background_tasks();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop background tasks on shutdown
        for handle in background {
            handle.abort();
        }

        result
    }

    fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.hub.broadcaster().spawn(),
            self.hub.broker().spawn_prune_task(self.config.broadcast_interval),
        ]
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.hub.relay_stats().session_rejected();
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);
        let provider = Arc::clone(&self.provider);

        tokio::spawn(async move {
            let _permit = permit;

            let upgrade = tokio::time::timeout(config.connection_timeout, accept_websocket(socket, &config));
            let ws = match upgrade.await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    tracing::debug!(session_id = session_id, error = %e, "WebSocket upgrade failed");
                    return;
                }
                Err(_) => {
                    let e = Error::Timeout(config.connection_timeout);
                    tracing::debug!(session_id = session_id, error = %e, "WebSocket upgrade failed");
                    return;
                }
            };

            let mut connection = Connection::new(session_id, peer_addr, config, hub, provider);

            if let Err(e) = connection.run(ws).await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
