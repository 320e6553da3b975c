//! Session gate: the control flow binding credentials, users and the registry.
//!
//! # Responsibilities
//! - Turn a connection credential into a peer identifier (or a rejection)
//!   before any transport handshake completes
//! - Log principals in and hand out access + renewal credentials
//! - Exchange and revoke renewal credentials
//! - Resolve registry snapshots into profiles without holding the registry lock

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{
    CredentialAuthority, CredentialError, CredentialKind, RefreshError, StoreError,
    VerificationError,
};
use crate::observability::metrics;
use crate::relay::PeerId;
use crate::users::avatar::profile_picture_url;
use crate::users::{NewProfile, Profile, Registration, UserId, UserStore, UserStoreError};

/// Why a caller was refused.
#[derive(Debug, Error)]
pub enum AuthFailure {
    #[error(transparent)]
    Credential(#[from] VerificationError),

    #[error("{0} credential not accepted here")]
    WrongKind(CredentialKind),

    #[error("renewal credential revoked or expired")]
    Revoked,

    #[error("missing credential")]
    Missing,

    #[error("unknown user")]
    UnknownUser,

    #[error("invalid password")]
    InvalidPassword,
}

impl AuthFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::Credential(e) => e.reason(),
            AuthFailure::WrongKind(_) => "wrong_kind",
            AuthFailure::Revoked => "revoked",
            AuthFailure::Missing => "missing",
            AuthFailure::UnknownUser => "unknown_user",
            AuthFailure::InvalidPassword => "invalid_password",
        }
    }
}

/// Request-level failures surfaced by the gate.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("unauthorized: {0}")]
    Unauthorized(AuthFailure),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("user not found")]
    NotFound,

    #[error("email {0} is already registered")]
    Conflict(String),

    #[error("{0}")]
    StoreUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthFailure> for GateError {
    fn from(failure: AuthFailure) -> Self {
        metrics::record_auth_failure(failure.reason());
        GateError::Unauthorized(failure)
    }
}

impl From<VerificationError> for GateError {
    fn from(err: VerificationError) -> Self {
        AuthFailure::Credential(err).into()
    }
}

impl From<StoreError> for GateError {
    fn from(err: StoreError) -> Self {
        GateError::StoreUnavailable(err.to_string())
    }
}

impl From<UserStoreError> for GateError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::DuplicateEmail(email) => GateError::Conflict(email),
            UserStoreError::Unavailable(_) => GateError::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<CredentialError> for GateError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Store(e) => e.into(),
            CredentialError::Signing(e) => GateError::Internal(e),
        }
    }
}

impl From<RefreshError> for GateError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Verification(e) => e.into(),
            RefreshError::WrongKind(kind) => AuthFailure::WrongKind(kind).into(),
            RefreshError::Revoked => AuthFailure::Revoked.into(),
            RefreshError::Store(e) => e.into(),
            RefreshError::Issue(e) => e.into(),
        }
    }
}

/// Login response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Refresh response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    pub access_token: String,
}

/// Admission and credential flows.
#[derive(Clone)]
pub struct SessionGate {
    authority: Arc<CredentialAuthority>,
    users: Arc<dyn UserStore>,
}

impl SessionGate {
    pub fn new(authority: Arc<CredentialAuthority>, users: Arc<dyn UserStore>) -> Self {
        Self { authority, users }
    }

    pub fn authority(&self) -> &Arc<CredentialAuthority> {
        &self.authority
    }

    /// Verify an access credential and derive the caller's peer identifier.
    pub fn authenticate(&self, token: &str) -> Result<PeerId, GateError> {
        if token.is_empty() {
            return Err(AuthFailure::Missing.into());
        }
        let claims = self.authority.verify(token)?;
        if claims.kind != CredentialKind::Access {
            return Err(AuthFailure::WrongKind(claims.kind).into());
        }
        Ok(claims.subject())
    }

    /// Check `secret` for `user_id` and issue an access + renewal pair.
    pub async fn login(&self, user_id: UserId, secret: &str) -> Result<TokenPair, GateError> {
        if secret.is_empty() {
            return Err(GateError::BadRequest("password is required".into()));
        }
        let profile = self
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthFailure::UnknownUser)?;

        let secret = secret.to_string();
        let stored = profile.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&secret, &stored))
            .await
            .map_err(|e| GateError::Internal(e.to_string()))?;
        if !matches {
            return Err(AuthFailure::InvalidPassword.into());
        }

        let subject = user_id.to_string();
        let access = self.authority.issue(&subject, CredentialKind::Access).await?;
        let renewal = self.authority.issue(&subject, CredentialKind::Renewal).await?;
        tracing::info!(user_id, "User logged in");

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: renewal.token,
        })
    }

    /// Exchange a renewal credential for a new access credential.
    pub async fn refresh(&self, renewal_token: &str) -> Result<AccessGrant, GateError> {
        if renewal_token.is_empty() {
            return Err(AuthFailure::Missing.into());
        }
        let access = self.authority.refresh(renewal_token).await?;
        Ok(AccessGrant {
            access_token: access.token,
        })
    }

    /// Revoke a renewal credential so it can no longer be refreshed.
    pub async fn logout(&self, renewal_token: &str) -> Result<(), GateError> {
        if renewal_token.is_empty() {
            return Err(AuthFailure::Missing.into());
        }
        let claims = self.authority.verify(renewal_token)?;
        if claims.kind != CredentialKind::Renewal {
            return Err(AuthFailure::WrongKind(claims.kind).into());
        }
        self.authority.revoke(renewal_token).await?;
        tracing::info!(subject = %claims.sub, "Renewal credential revoked");
        Ok(())
    }

    /// Create a user from a sign-up request.
    pub async fn register(&self, registration: Registration) -> Result<UserId, GateError> {
        let email = registration.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(GateError::BadRequest("a valid email is required".into()));
        }
        if registration.password.is_empty() {
            return Err(GateError::BadRequest("password is required".into()));
        }

        let password = registration.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| GateError::Internal(e.to_string()))?
            .map_err(|e| GateError::Internal(e.to_string()))?;

        let id = self
            .users
            .create(NewProfile {
                name: registration.name,
                profile_url: profile_picture_url(&email),
                email,
                password_hash,
            })
            .await?;
        tracing::info!(user_id = id, "User registered");
        Ok(id)
    }

    /// Profile of the caller identified by an access credential.
    pub async fn profile(&self, token: &str) -> Result<Profile, GateError> {
        let peer = self.authenticate(token)?;
        let id: UserId = peer.as_str().parse().map_err(|_| GateError::NotFound)?;
        self.users.get_by_id(id).await?.ok_or(GateError::NotFound)
    }

    /// Resolve peer identifiers to profiles, skipping any that no longer resolve.
    ///
    /// Takes an already-copied snapshot; never call this with the registry locked.
    pub async fn resolve_peers(&self, peers: Vec<PeerId>) -> Result<Vec<Profile>, GateError> {
        let mut profiles = Vec::with_capacity(peers.len());
        for peer in peers {
            let Ok(id) = peer.as_str().parse::<UserId>() else {
                tracing::debug!(peer = %peer, "Skipping non-numeric peer id");
                continue;
            };
            match self.users.get_by_id(id).await? {
                Some(profile) => profiles.push(profile),
                None => tracing::debug!(peer = %peer, "Connected peer has no profile"),
            }
        }
        profiles.sort_by_key(|p| p.id);
        Ok(profiles)
    }
}
