//! Connection handles.
//!
//! A handle is the write half of one admitted peer's bidirectional stream.
//! The owning session task keeps the read half; any router task that looks
//! the peer up in the registry may write through the handle concurrently.
//!
//! # Design Decisions
//! - Writers are serialized by an async mutex around the sink, readers never
//!   touch it, so reads and writes on the same peer proceed independently
//! - The sink is type-erased (`BoxMessageSink`) so the registry does not care
//!   whether the transport is a WebSocket or an in-memory test channel
//! - Closing a handle cancels its token; the owning session observes the
//!   token and ends its read loop

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::net::connection::ConnectionId;

/// Failure on the underlying transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer or the local side closed the stream.
    #[error("connection closed")]
    Closed,

    /// Any other transport-level failure.
    #[error("transport error: {0}")]
    Io(String),
}

impl From<axum::Error> for TransportError {
    fn from(err: axum::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Type-erased outbound message sink; one item is one complete message unit.
pub type BoxMessageSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Write side of one admitted connection.
pub struct ConnectionHandle {
    id: ConnectionId,
    sink: Mutex<BoxMessageSink>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Wrap an outbound sink into a handle with a fresh connection id.
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<String, Error = TransportError> + Send + 'static,
    {
        Self {
            id: ConnectionId::new(),
            sink: Mutex::new(Box::pin(sink)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Write one complete message unit and flush it.
    ///
    /// Concurrent callers are queued on the sink lock in arrival order.
    pub async fn send(&self, payload: String) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(payload).await
    }

    /// Signal the owning session to stop and close the outbound stream.
    ///
    /// The sink close is bounded by `timeout` because a stalled writer may be
    /// holding the lock.
    pub async fn close(&self, timeout: Duration) {
        self.closed.cancel();
        let closing = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(timeout, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Error closing connection sink");
            }
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "Timed out closing connection sink");
            }
        }
    }

    /// Resolves once `close` has been called on this handle.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}
