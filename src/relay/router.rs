//! Message routing between admitted peers.
//!
//! # Data Flow
//! ```text
//! sender's inbound stream
//!     → read one message (idle deadline)
//!     → Frame::parse (malformed → dropped, loop continues)
//!     → Registry::lookup(target) (absent → TargetUnreachable, loop continues)
//!     → ConnectionHandle::send (delivery deadline; failure → loop continues)
//! on EOF / read error / idle timeout / supersede / shutdown:
//!     → Admission released (sender removed from the registry)
//! ```
//!
//! # Design Decisions
//! - Best-effort relay: no acknowledgement, retry or feedback to the sender
//! - Frames from one sender are delivered one at a time, in read order
//! - A failed delivery never tears down either party's connection; only the
//!   owner's own read path removes a peer

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::relay::frame::Frame;
use crate::relay::handle::TransportError;
use crate::relay::peer::PeerId;
use crate::relay::registry::{Admission, Registry};

/// Why a single delivery did not reach its target.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("peer {0} is not connected")]
    TargetUnreachable(PeerId),

    #[error("delivery to {target} timed out after {timeout:?}")]
    Timeout { target: PeerId, timeout: Duration },

    #[error("delivery to {target} failed: {source}")]
    Transport {
        target: PeerId,
        #[source]
        source: TransportError,
    },
}

impl DeliveryError {
    fn outcome(&self) -> &'static str {
        match self {
            DeliveryError::TargetUnreachable(_) => "unreachable",
            DeliveryError::Timeout { .. } => "timeout",
            DeliveryError::Transport { .. } => "failed",
        }
    }
}

/// Why a sender's routing loop ended.
#[derive(Debug)]
pub enum Disconnect {
    /// The sender closed its stream.
    PeerClosed,
    /// No inbound message within the idle deadline.
    IdleTimeout,
    /// Reading from the sender failed.
    Transport(TransportError),
    /// The sender's handle was closed, normally by a newer admission.
    Superseded,
    /// The server is shutting down.
    Shutdown,
}

impl Disconnect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disconnect::PeerClosed => "peer_closed",
            Disconnect::IdleTimeout => "idle_timeout",
            Disconnect::Transport(_) => "transport_error",
            Disconnect::Superseded => "superseded",
            Disconnect::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::Transport(e) => write!(f, "{}: {}", self.as_str(), e),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Running totals of routing outcomes.
#[derive(Debug, Default)]
pub struct RouterStats {
    frames: AtomicU64,
    delivered: AtomicU64,
    malformed: AtomicU64,
    unreachable: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterStatsSnapshot {
    pub frames: u64,
    pub delivered: u64,
    pub malformed: u64,
    pub unreachable: u64,
    pub failed: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Routes frames from each sender's stream to target handles in the registry.
#[derive(Debug)]
pub struct Router {
    registry: Arc<Registry>,
    idle_timeout: Duration,
    delivery_timeout: Duration,
    stats: RouterStats,
}

impl Router {
    pub fn new(registry: Arc<Registry>, idle_timeout: Duration, delivery_timeout: Duration) -> Self {
        Self {
            registry,
            idle_timeout,
            delivery_timeout,
            stats: RouterStats::default(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stats(&self) -> RouterStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Deliver `payload` to `target` as one message, bounded by the delivery deadline.
    pub async fn deliver(&self, target: &str, payload: &str) -> Result<(), DeliveryError> {
        let result = self.try_deliver(target, payload).await;
        match &result {
            Ok(()) => {
                RouterStats::bump(&self.stats.delivered);
                metrics::record_frame("delivered");
            }
            Err(e) => {
                match e {
                    DeliveryError::TargetUnreachable(_) => RouterStats::bump(&self.stats.unreachable),
                    _ => RouterStats::bump(&self.stats.failed),
                }
                metrics::record_frame(e.outcome());
            }
        }
        result
    }

    async fn try_deliver(&self, target: &str, payload: &str) -> Result<(), DeliveryError> {
        let handle = self
            .registry
            .lookup(target)
            .ok_or_else(|| DeliveryError::TargetUnreachable(PeerId::from(target)))?;

        match tokio::time::timeout(self.delivery_timeout, handle.send(payload.to_string())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DeliveryError::Transport {
                target: PeerId::from(target),
                source,
            }),
            Err(_) => Err(DeliveryError::Timeout {
                target: PeerId::from(target),
                timeout: self.delivery_timeout,
            }),
        }
    }

    /// Parse one inbound message and deliver it. Never fails the caller.
    pub async fn dispatch(&self, sender: &PeerId, message: &str) {
        RouterStats::bump(&self.stats.frames);

        let frame = match Frame::parse(message) {
            Ok(frame) => frame,
            Err(e) => {
                RouterStats::bump(&self.stats.malformed);
                metrics::record_frame("malformed");
                tracing::warn!(sender = %sender, error = %e, len = message.len(), "Dropping malformed frame");
                return;
            }
        };

        match self.deliver(frame.target, frame.payload).await {
            Ok(()) => {
                tracing::trace!(sender = %sender, target = frame.target, "Frame delivered");
            }
            Err(e @ DeliveryError::TargetUnreachable(_)) => {
                tracing::info!(sender = %sender, error = %e, "Frame not delivered");
            }
            Err(e) => {
                tracing::warn!(sender = %sender, error = %e, "Frame delivery failed");
            }
        }
    }

    /// Run the routing loop for one admitted sender until it disconnects.
    ///
    /// The admission is released before this returns, whatever the reason.
    pub async fn route<S>(&self, admission: Admission, mut inbound: S, shutdown: &Shutdown) -> Disconnect
    where
        S: Stream<Item = Result<String, TransportError>> + Unpin,
    {
        let sender = admission.peer().clone();
        let handle = admission.handle().clone();

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.drained() => break Disconnect::Shutdown,
                _ = handle.closed() => break Disconnect::Superseded,
                next = tokio::time::timeout(self.idle_timeout, inbound.next()) => next,
            };

            let message = match next {
                Err(_) => break Disconnect::IdleTimeout,
                Ok(None) => break Disconnect::PeerClosed,
                Ok(Some(Err(e))) => break Disconnect::Transport(e),
                Ok(Some(Ok(message))) => message,
            };

            // Draining lets this delivery finish; termination abandons it.
            tokio::select! {
                biased;
                _ = shutdown.terminated() => break Disconnect::Shutdown,
                _ = self.dispatch(&sender, &message) => {}
            }
        };

        admission.release();
        metrics::record_disconnect(reason.as_str());
        match &reason {
            Disconnect::Transport(_) => {
                tracing::warn!(peer = %sender, reason = %reason, "Peer disconnected");
            }
            _ => {
                tracing::info!(peer = %sender, reason = %reason, "Peer disconnected");
            }
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::handle::testing::*;
    use crate::relay::handle::ConnectionHandle;
    use futures_util::stream;
    use std::collections::HashMap;

    const IDLE: Duration = Duration::from_secs(100);
    const DELIVERY: Duration = Duration::from_millis(100);

    fn router() -> Arc<Router> {
        Arc::new(Router::new(Arc::new(Registry::new()), IDLE, DELIVERY))
    }

    fn admit(router: &Router, peer: &str, handle: ConnectionHandle) -> Admission {
        let (admission, _) = Admission::admit(router.registry().clone(), peer.into(), Arc::new(handle));
        admission
    }

    fn inbound(messages: &[&str]) -> impl Stream<Item = Result<String, TransportError>> + Unpin {
        stream::iter(messages.iter().map(|m| Ok(m.to_string())).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn delivers_payload_to_target() {
        let router = router();
        let (target, mut rx) = channel_handle();
        let _bob = admit(&router, "bob", target);
        let alice = admit(&router, "alice", null_handle());

        let reason = router
            .route(alice, inbound(&["bob:hello", "bob:hi:there"]), &Shutdown::new())
            .await;

        assert!(matches!(reason, Disconnect::PeerClosed));
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert_eq!(rx.recv().await.as_deref(), Some("hi:there"));
        assert_eq!(router.stats().delivered, 2);
    }

    #[tokio::test]
    async fn unreachable_target_is_reported_not_fatal() {
        let router = router();
        let err = router.deliver("ghost", "boo").await.unwrap_err();
        assert!(matches!(err, DeliveryError::TargetUnreachable(ref p) if p.as_str() == "ghost"));

        let (target, mut rx) = channel_handle();
        let _bob = admit(&router, "bob", target);
        let alice = admit(&router, "alice", null_handle());
        router
            .route(alice, inbound(&["ghost:boo", "bob:after"]), &Shutdown::new())
            .await;

        assert_eq!(rx.recv().await.as_deref(), Some("after"));
        let stats = router.stats();
        assert_eq!(stats.unreachable, 2);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let router = router();
        let (target, mut rx) = channel_handle();
        let _bob = admit(&router, "bob", target);
        let alice = admit(&router, "alice", null_handle());

        router
            .route(alice, inbound(&["noDelimiter", ":payload", "bob:ok"]), &Shutdown::new())
            .await;

        assert_eq!(rx.recv().await.as_deref(), Some("ok"));
        let stats = router.stats();
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.malformed, 2);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn stalled_target_times_out_and_stays_admitted() {
        let router = router();
        let _bob = admit(&router, "bob", stalled_handle());

        let err = router.deliver("bob", "slow").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Timeout { .. }));
        assert!(router.registry().contains("bob"));
    }

    #[tokio::test]
    async fn broken_target_fails_delivery_only() {
        let router = router();
        let _bob = admit(&router, "bob", broken_handle());
        let alice = admit(&router, "alice", null_handle());

        let err = router.deliver("bob", "x").await.unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));

        let reason = router.route(alice, inbound(&["bob:y"]), &Shutdown::new()).await;
        assert!(matches!(reason, Disconnect::PeerClosed));
        assert!(router.registry().contains("bob"));
        assert_eq!(router.stats().failed, 2);
    }

    fn pending_after(message: &str) -> impl Stream<Item = Result<String, TransportError>> + Send + Unpin {
        stream::iter(vec![Ok(message.to_string())])
            .chain(stream::pending::<Result<String, TransportError>>())
    }

    #[tokio::test]
    async fn drain_lets_in_flight_delivery_finish() {
        let router = Arc::new(Router::new(Arc::new(Registry::new()), IDLE, Duration::from_secs(5)));
        let (bob_handle, mut bob_rx) = slow_handle(Duration::from_millis(200));
        let _bob = admit(&router, "bob", bob_handle);
        let alice = admit(&router, "alice", null_handle());
        let shutdown = Shutdown::new();

        let routing = {
            let router = router.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { router.route(alice, pending_after("bob:in-flight"), &shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.trigger();

        let reason = tokio::time::timeout(Duration::from_secs(2), routing)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reason, Disconnect::Shutdown));
        assert_eq!(bob_rx.try_recv().as_deref(), Ok("in-flight"));
        assert_eq!(router.stats().delivered, 1);
        assert!(!router.registry().contains("alice"));
    }

    #[tokio::test]
    async fn force_abandons_in_flight_delivery() {
        let router = Arc::new(Router::new(Arc::new(Registry::new()), IDLE, Duration::from_secs(60)));
        let _bob = admit(&router, "bob", stalled_handle());
        let alice = admit(&router, "alice", null_handle());
        let shutdown = Shutdown::new();

        let routing = {
            let router = router.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { router.route(alice, pending_after("bob:stuck"), &shutdown).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.force();

        let reason = tokio::time::timeout(Duration::from_secs(1), routing)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(reason, Disconnect::Shutdown));
        assert_eq!(router.stats().delivered, 0);
        assert!(!router.registry().contains("alice"));
        assert!(router.registry().contains("bob"));
    }

    #[tokio::test]
    async fn eof_removes_sender() {
        let router = router();
        let alice = admit(&router, "alice", null_handle());
        assert!(router.registry().contains("alice"));

        router.route(alice, inbound(&[]), &Shutdown::new()).await;
        assert!(!router.registry().contains("alice"));
    }

    #[tokio::test]
    async fn read_error_removes_sender() {
        let router = router();
        let alice = admit(&router, "alice", null_handle());
        let failing = stream::iter(vec![Err(TransportError::Io("reset".into()))]);

        let reason = router.route(alice, failing, &Shutdown::new()).await;
        assert!(matches!(reason, Disconnect::Transport(_)));
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn idle_sender_is_disconnected() {
        let router = Arc::new(Router::new(
            Arc::new(Registry::new()),
            Duration::from_millis(50),
            DELIVERY,
        ));
        let alice = admit(&router, "alice", null_handle());
        let silent = stream::pending::<Result<String, TransportError>>();

        let reason = router.route(alice, silent, &Shutdown::new()).await;
        assert!(matches!(reason, Disconnect::IdleTimeout));
        assert!(router.registry().is_empty());
    }

    #[tokio::test]
    async fn superseded_session_ends_without_evicting_replacement() {
        let router = router();
        let first = admit(&router, "alice", null_handle());
        let first_handle = first.handle().clone();

        let task = {
            let router = router.clone();
            tokio::spawn(async move {
                let silent = stream::pending::<Result<String, TransportError>>();
                router.route(first, silent, &Shutdown::new()).await
            })
        };

        let (second, superseded) =
            Admission::admit(router.registry().clone(), "alice".into(), Arc::new(null_handle()));
        assert_eq!(superseded.unwrap().id(), first_handle.id());
        first_handle.close(Duration::from_millis(50)).await;

        let reason = task.await.unwrap();
        assert!(matches!(reason, Disconnect::Superseded));
        assert_eq!(router.registry().lookup("alice").unwrap().id(), second.handle().id());
    }

    #[tokio::test]
    async fn shutdown_ends_the_loop() {
        let router = router();
        let alice = admit(&router, "alice", null_handle());
        let shutdown = Shutdown::new();
        shutdown.trigger();

        let silent = stream::pending::<Result<String, TransportError>>();
        let reason = router.route(alice, silent, &shutdown).await;
        assert!(matches!(reason, Disconnect::Shutdown));
        assert!(router.registry().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn per_sender_order_is_preserved_under_concurrency() {
        const SENDERS: usize = 100;
        const FRAMES: usize = 100;

        let router = Arc::new(Router::new(
            Arc::new(Registry::new()),
            IDLE,
            Duration::from_secs(10),
        ));
        let (target, mut rx) = channel_handle();
        let _target = admit(&router, "target", target);

        let tasks: Vec<_> = (0..SENDERS)
            .map(|s| {
                let router = router.clone();
                let sender = admit(&router, &format!("sender-{s}"), null_handle());
                tokio::spawn(async move {
                    let frames: Vec<Result<String, TransportError>> = (0..FRAMES)
                        .map(|n| Ok(format!("target:{s}:{n}")))
                        .collect();
                    router.route(sender, stream::iter(frames), &Shutdown::new()).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut seen: HashMap<usize, Vec<usize>> = HashMap::new();
        for _ in 0..SENDERS * FRAMES {
            let payload = rx.recv().await.unwrap();
            let (s, n) = payload.split_once(':').unwrap();
            seen.entry(s.parse().unwrap())
                .or_default()
                .push(n.parse().unwrap());
        }

        assert_eq!(seen.len(), SENDERS);
        for (sender, payloads) in seen {
            let expected: Vec<usize> = (0..FRAMES).collect();
            assert_eq!(payloads, expected, "sender {sender} saw frames out of order");
        }
        assert_eq!(router.stats().delivered, (SENDERS * FRAMES) as u64);
    }
}
