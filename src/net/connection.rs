//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and registry ownership checks
//! - Bound the number of concurrent relay sessions
//! - Let shutdown wait for live sessions to drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
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

/// Tracks live relay sessions against a fixed capacity.
///
/// Each session holds a [`ConnectionGuard`]; dropping the guard frees the slot.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ConnectionTracker {
    /// Create a tracker allowing at most `capacity` concurrent sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Claim a slot for a new session, or `None` when at capacity.
    pub fn try_track(&self) -> Option<ConnectionGuard> {
        let permit = self.slots.clone().try_acquire_owned().ok()?;
        Some(ConnectionGuard {
            _permit: permit,
            id: ConnectionId::new(),
        })
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until every session has released its slot, up to `timeout`.
    ///
    /// Returns `true` if the tracker drained in time.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Guard that tracks a session's lifetime.
/// Releases its slot when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this session's tracking ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        tracing::trace!(tracking_id = %self.id, "Session slot released");
    }
}
