//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! login:   password.rs (verify secret) → credentials.rs (issue access + renewal)
//!                                          → revocation.rs (record renewal hash, TTL)
//! connect: credentials.rs (verify access: signature, algorithm, expiry)
//! refresh: credentials.rs (verify renewal) → revocation.rs (presence check)
//!                                          → credentials.rs (issue access)
//! ```
//!
//! # Design Decisions
//! - Access credentials are stateless; only renewal credentials touch the store
//! - The store is an injected trait object so deployments can back it with an
//!   external cache; the in-memory implementation serves single-node setups

pub mod credentials;
pub mod password;
pub mod revocation;

pub use credentials::{
    Claims, Credential, CredentialAuthority, CredentialError, CredentialKind, RefreshError,
    VerificationError,
};
pub use revocation::{MemoryRevocationStore, RevocationStore, StoreError};
