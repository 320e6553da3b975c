//! Connection registry.
//!
//! # Responsibilities
//! - Map each peer identifier to the handle of its live connection
//! - Admit, remove, look up and enumerate peers under one lock
//! - Tie a session's registry entry to an [`Admission`] guard that removes
//!   it exactly once
//!
//! # Design Decisions
//! - A single `std::sync::Mutex` guards the map; it is held only for the map
//!   operation itself and never across an `.await`
//! - `snapshot` copies the identifiers out so callers can do slow work
//!   (profile lookups, I/O) without blocking admissions
//! - At most one handle per peer: a second admission supersedes the first and
//!   hands the old handle back so the caller can close it
//! - Session teardown removes the entry only if it still belongs to the
//!   exiting connection, so a superseded session cannot evict its replacement

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::relay::handle::ConnectionHandle;
use crate::relay::peer::PeerId;

/// Registry of currently reachable peers.
#[derive(Debug, Default)]
pub struct Registry {
    peers: Mutex<HashMap<PeerId, Arc<ConnectionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<PeerId, Arc<ConnectionHandle>>> {
        // The map holds no invariants a panicking holder could break halfway.
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the handle for `peer`.
    ///
    /// Returns the superseded handle, if any. Closing it is the caller's job.
    pub fn admit(
        &self,
        peer: PeerId,
        handle: Arc<ConnectionHandle>,
    ) -> Option<Arc<ConnectionHandle>> {
        let (previous, count) = {
            let mut peers = self.peers();
            let previous = peers.insert(peer, handle);
            (previous, peers.len())
        };
        metrics::record_connected_peers(count);
        previous
    }

    /// Remove `peer` if present. Idempotent.
    pub fn remove(&self, peer: &str) -> Option<Arc<ConnectionHandle>> {
        let (removed, count) = {
            let mut peers = self.peers();
            let removed = peers.remove(peer);
            (removed, peers.len())
        };
        if removed.is_some() {
            metrics::record_connected_peers(count);
        }
        removed
    }

    /// Remove `peer` only while its entry is still connection `id`.
    pub fn remove_connection(&self, peer: &str, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut peers = self.peers();
            let owned = peers.get(peer).is_some_and(|h| h.id() == id);
            if owned {
                peers.remove(peer);
            }
            (owned, peers.len())
        };
        if removed {
            metrics::record_connected_peers(count);
        }
        removed
    }

    /// Current handle for `peer`, if reachable.
    pub fn lookup(&self, peer: &str) -> Option<Arc<ConnectionHandle>> {
        self.peers().get(peer).cloned()
    }

    /// Identifiers admitted at the instant of the call.
    ///
    /// The lock is released before this returns; entries may disappear at any
    /// point afterwards.
    pub fn snapshot(&self) -> Vec<PeerId> {
        self.peers().keys().cloned().collect()
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.peers().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A session's stake in the registry.
///
/// Created by admitting a connection; removes the entry when released or
/// dropped, at most once, and only if the entry still belongs to this
/// connection.
#[derive(Debug)]
pub struct Admission {
    registry: Arc<Registry>,
    peer: PeerId,
    handle: Arc<ConnectionHandle>,
    released: bool,
}

impl Admission {
    /// Admit `handle` for `peer`, returning the guard and any superseded handle.
    pub fn admit(
        registry: Arc<Registry>,
        peer: PeerId,
        handle: Arc<ConnectionHandle>,
    ) -> (Self, Option<Arc<ConnectionHandle>>) {
        let superseded = registry.admit(peer.clone(), handle.clone());
        let admission = Self {
            registry,
            peer,
            handle,
            released: false,
        };
        (admission, superseded)
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn handle(&self) -> &Arc<ConnectionHandle> {
        &self.handle
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Remove this connection's entry now. Returns whether an entry was removed.
    pub fn release(mut self) -> bool {
        self.release_once()
    }

    fn release_once(&mut self) -> bool {
        if std::mem::replace(&mut self.released, true) {
            return false;
        }
        let removed = self
            .registry
            .remove_connection(self.peer.as_str(), self.handle.id());
        tracing::debug!(
            peer = %self.peer,
            connection_id = %self.handle.id(),
            removed,
            "Admission released"
        );
        removed
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::handle::testing::null_handle;
    use std::collections::BTreeSet;

    fn handle() -> Arc<ConnectionHandle> {
        Arc::new(null_handle())
    }

    #[test]
    fn admit_then_lookup() {
        let registry = Registry::new();
        let h = handle();
        assert!(registry.admit("alice".into(), h.clone()).is_none());
        assert_eq!(registry.lookup("alice").unwrap().id(), h.id());
        assert!(registry.lookup("bob").is_none());
    }

    #[test]
    fn second_admission_replaces_first() {
        let registry = Registry::new();
        let h1 = handle();
        let h2 = handle();
        registry.admit("alice".into(), h1.clone());
        let superseded = registry.admit("alice".into(), h2.clone()).unwrap();

        assert_eq!(superseded.id(), h1.id());
        assert_eq!(registry.lookup("alice").unwrap().id(), h2.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = Registry::new();
        registry.admit("alice".into(), handle());
        assert!(registry.remove("alice").is_some());
        assert!(registry.remove("alice").is_none());
        assert!(registry.remove("never-admitted").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_connection_ignores_replaced_entry() {
        let registry = Registry::new();
        let h1 = handle();
        let h2 = handle();
        registry.admit("alice".into(), h1.clone());
        registry.admit("alice".into(), h2.clone());

        assert!(!registry.remove_connection("alice", h1.id()));
        assert!(registry.contains("alice"));
        assert!(registry.remove_connection("alice", h2.id()));
        assert!(!registry.contains("alice"));
    }

    #[test]
    fn snapshot_tracks_admissions_and_removals() {
        let registry = Registry::new();
        let mut expected = BTreeSet::new();
        for i in 0..20 {
            let id = format!("peer-{i}");
            registry.admit(id.clone().into(), handle());
            expected.insert(PeerId::from(id));
            if i % 3 == 0 {
                let victim = format!("peer-{}", i / 2);
                registry.remove(&victim);
                expected.remove(victim.as_str());
            }
            let snapshot: BTreeSet<PeerId> = registry.snapshot().into_iter().collect();
            assert_eq!(snapshot, expected);
        }
    }

    #[test]
    fn concurrent_disjoint_admissions_are_all_visible() {
        let registry = Arc::new(Registry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("t{t}-{i}");
                        registry.admit(id.clone().into(), handle());
                        if i % 2 == 1 {
                            registry.remove(&id);
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let snapshot: BTreeSet<PeerId> = registry.snapshot().into_iter().collect();
        let expected: BTreeSet<PeerId> = (0..8)
            .flat_map(|t| (0..50).filter(|i| i % 2 == 0).map(move |i| PeerId::from(format!("t{t}-{i}"))))
            .collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn admission_removes_exactly_once() {
        let registry = Arc::new(Registry::new());
        let (admission, superseded) = Admission::admit(registry.clone(), "alice".into(), handle());
        assert!(superseded.is_none());
        assert!(registry.contains("alice"));

        assert!(admission.release());
        assert!(!registry.contains("alice"));
    }

    #[test]
    fn dropped_admission_does_not_evict_replacement() {
        let registry = Arc::new(Registry::new());
        let (first, _) = Admission::admit(registry.clone(), "alice".into(), handle());
        let (second, superseded) = Admission::admit(registry.clone(), "alice".into(), handle());
        assert_eq!(superseded.unwrap().id(), first.handle().id());

        drop(first);
        assert_eq!(registry.lookup("alice").unwrap().id(), second.handle().id());

        drop(second);
        assert!(registry.is_empty());
    }
}
