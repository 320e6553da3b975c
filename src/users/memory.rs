//! In-memory user store.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::users::{normalize_email, NewProfile, Profile, UserId, UserStore, UserStoreError};

/// Thread-safe profile store keyed by id, with an email index.
#[derive(Debug)]
pub struct MemoryUserStore {
    profiles: DashMap<UserId, Profile>,
    emails: DashMap<String, UserId>,
    next_id: AtomicU64,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self {
            profiles: DashMap::new(),
            emails: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: UserId) -> Result<Option<Profile>, UserStoreError> {
        Ok(self.profiles.get(&id).map(|p| p.value().clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserId>, UserStoreError> {
        Ok(self.emails.get(&normalize_email(email)).map(|id| *id))
    }

    async fn create(&self, profile: NewProfile) -> Result<UserId, UserStoreError> {
        let email = normalize_email(&profile.email);
        match self.emails.entry(email.clone()) {
            Entry::Occupied(_) => Err(UserStoreError::DuplicateEmail(email)),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.profiles.insert(
                    id,
                    Profile {
                        id,
                        name: profile.name,
                        email,
                        profile_url: profile.profile_url,
                        password_hash: profile.password_hash,
                    },
                );
                slot.insert(id);
                Ok(id)
            }
        }
    }
}
