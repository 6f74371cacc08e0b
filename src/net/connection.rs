//! Connection identity and admission accounting.
//!
//! # Responsibilities
//! - Generate unique connection IDs for log correlation
//! - Bound the number of concurrent per-connection tasks
//! - Release the admission slot when a connection's task finishes
//!
//! # Design Decisions
//! - The slot permit rides inside the guard, so a panicking connection
//!   task still releases its slot on unwind

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient; only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts live per-connection tasks and hands out admission slots.
#[derive(Debug, Clone)]
pub struct ActiveConnections {
    slots: Arc<Semaphore>,
    live: Arc<AtomicU64>,
}

impl ActiveConnections {
    pub fn new(max_connections: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_connections)),
            live: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Wait for an admission slot. Applies backpressure before `accept`.
    pub async fn slot(&self) -> OwnedSemaphorePermit {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .expect("admission semaphore closed unexpectedly")
    }

    /// Record a new live connection. Returns a guard that releases the
    /// slot and decrements the count on drop.
    pub fn admit(&self, permit: OwnedSemaphorePermit) -> ConnectionGuard {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(live);
        ConnectionGuard {
            id: ConnectionId::new(),
            live: Arc::clone(&self.live),
            _permit: permit,
        }
    }

    /// Current number of live per-connection tasks.
    pub fn live(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Admission slots not currently in use.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

/// Guard tracking one connection's task lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    id: ConnectionId,
    live: Arc<AtomicU64>,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_active_connections(live);
        tracing::trace!(connection_id = %self.id, "connection finished");
    }
}
