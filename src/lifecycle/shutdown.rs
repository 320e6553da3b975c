//! Shutdown coordination for the relay.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Shutdown runs in two phases:
/// 1. **Drain** (`trigger`): stop accepting connections and stop reading new
///    frames; deliveries already in flight continue under their own deadline.
/// 2. **Terminate** (`force`): abandon whatever is still running.
///
/// Clones share the same state, so the coordinator can be handed to every
/// long-running task.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    draining: CancellationToken,
    terminate: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin draining.
    pub fn trigger(&self) {
        if !self.draining.is_cancelled() {
            tracing::info!("Shutdown triggered, draining");
        }
        self.draining.cancel();
    }

    /// Terminate remaining work. Implies `trigger`.
    pub fn force(&self) {
        self.draining.cancel();
        self.terminate.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.draining.is_cancelled()
    }

    pub fn is_forced(&self) -> bool {
        self.terminate.is_cancelled()
    }

    /// Resolves once draining has begun.
    pub async fn drained(&self) {
        self.draining.cancelled().await
    }

    /// Resolves once termination has been forced.
    pub async fn terminated(&self) {
        self.terminate.cancelled().await
    }
}
