//! Statistics for the relay

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters updated by the router and the listener
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    relayed: AtomicU64,
    dropped: AtomicU64,
    broadcasts: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_active: AtomicU64,
    sessions_rejected: AtomicU64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            relayed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            sessions_rejected: AtomicU64::new(0),
        }
    }

    /// A message was handed to the broker
    pub fn record_relayed(&self) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// A message was dropped before reaching the broker
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A registry snapshot was published
    pub fn record_broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Never underflow, even if close is reported twice
        let _ = self
            .sessions_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn session_rejected(&self) {
        self.sessions_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy, combined with registry sizes
    pub fn snapshot(&self, peers: usize, channels: usize) -> ServerStats {
        ServerStats {
            uptime: self.started_at.elapsed(),
            messages_relayed: self.relayed.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            snapshot_broadcasts: self.broadcasts.load(Ordering::Relaxed),
            total_sessions: self.sessions_opened.load(Ordering::Relaxed),
            active_sessions: self.sessions_active.load(Ordering::Relaxed),
            rejected_sessions: self.sessions_rejected.load(Ordering::Relaxed),
            registered_peers: peers,
            public_channels: channels,
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Time since the hub was created
    pub uptime: Duration,
    /// Directed and channel messages handed to the broker
    pub messages_relayed: u64,
    /// Messages dropped (absent call target, malformed routed payload)
    pub messages_dropped: u64,
    /// Peer and channel snapshots published
    pub snapshot_broadcasts: u64,
    /// Sessions accepted since start
    pub total_sessions: u64,
    /// Sessions currently open
    pub active_sessions: u64,
    /// Connections refused (limit reached or authentication failed)
    pub rejected_sessions: u64,
    pub registered_peers: usize,
    pub public_channels: usize,
}
