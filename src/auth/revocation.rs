//! Revocation-aware key-value store for renewal credentials.
//!
//! A renewal credential is honoured only while an entry keyed by its hash
//! exists here. Issuance writes the entry with a TTL equal to the credential
//! lifetime; deleting the entry, or letting it expire, revokes it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

/// Failure talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revocation store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store; entries expire lazily on read and in bulk on `purge_expired`.
#[derive(Debug, Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, Entry>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        // The read guard is dropped by now; removing under it would deadlock the shard.
        if expired {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemoryRevocationStore::new();
        store.set("k", "valid", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("valid"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryRevocationStore::new();
        store.set("short", "valid", Duration::from_millis(20)).await.unwrap();
        store.set("long", "valid", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = MemoryRevocationStore::new();
        store.set("a", "valid", Duration::from_millis(10)).await.unwrap();
        store.set("b", "valid", Duration::from_millis(10)).await.unwrap();
        store.set("c", "valid", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
    }
}
