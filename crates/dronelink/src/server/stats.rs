//! Ingestion counters shared by the accept loop and every handler.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live server counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_active: AtomicU64,
    connections_total: AtomicU64,
    messages_received: AtomicU64,
    protocol_errors: AtomicU64,
    connection_errors: AtomicU64,
}

impl ServerStats {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            connections_total: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
        }
    }

    /// Record an accepted connection. Returns the new active count.
    #[inline]
    pub fn connection_opened(&self) -> u64 {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a finished connection. Returns the new active count.
    #[inline]
    pub fn connection_closed(&self) -> u64 {
        self.connections_active.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Record a decoded message.
    #[inline]
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a well-framed message that was ignored.
    #[inline]
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection that ended on a framing or transport error.
    #[inline]
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of connections currently being served.
    #[must_use]
    pub fn active(&self) -> u64 {
        self.connections_active.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`ServerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub messages_received: u64,
    pub protocol_errors: u64,
    pub connection_errors: u64,
}
