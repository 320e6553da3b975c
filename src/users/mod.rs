//! User profiles.
//!
//! The relay itself never reads profiles; they back login and the
//! profile-facing HTTP endpoints. Storage sits behind [`UserStore`] so a
//! database-backed implementation can replace [`MemoryUserStore`].

pub mod avatar;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryUserStore;

pub type UserId = u64;

/// A stored user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub profile_url: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// Fields for a profile that has not been assigned an id yet.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub profile_url: String,
}

/// Sign-up request body.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("user store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: UserId) -> Result<Option<Profile>, UserStoreError>;

    /// Resolve the secondary key (email) to an id.
    async fn get_by_email(&self, email: &str) -> Result<Option<UserId>, UserStoreError>;

    async fn create(&self, profile: NewProfile) -> Result<UserId, UserStoreError>;
}

/// Canonical form of an email used for lookups and avatar hashing.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
