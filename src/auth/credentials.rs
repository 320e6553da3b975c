//! Credential authority: issuance, verification, renewal and revocation.
//!
//! # Responsibilities
//! - Sign access and renewal credentials (HS256 JWTs) for a subject
//! - Verify signature, algorithm and expiry without any external lookup
//! - Record renewal credentials in the revocation store at issuance and
//!   check their presence on renewal
//!
//! # Design Decisions
//! - `verify` is pure; the store presence check is a separate capability that
//!   only the renewal flow composes in
//! - Store keys are SHA-256 digests of the serialized credential, so the
//!   store never holds a usable token
//! - Renewal credentials are not rotated on use: one renewal credential can
//!   mint access credentials until its store entry expires or is deleted

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::revocation::{RevocationStore, StoreError};
use crate::config::AuthConfig;
use crate::observability::metrics;
use crate::relay::PeerId;

/// Value stored for an honourable renewal credential.
const RENEWAL_MARKER: &str = "valid";

/// Which lifetime and checks a credential is issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Renewal,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Access => "access",
            CredentialKind::Renewal => "renewal",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signed claims carried by every credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the principal's peer identifier.
    pub sub: String,
    /// Issued-at, seconds since the Unix epoch.
    pub iat: u64,
    /// Expires-at, seconds since the Unix epoch.
    pub exp: u64,
    pub kind: CredentialKind,
    /// Unique per issuance, so two credentials minted in the same second differ.
    #[serde(default)]
    pub jti: String,
}

impl Claims {
    pub fn subject(&self) -> PeerId {
        PeerId::new(self.sub.clone())
    }
}

/// A freshly issued credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: String,
    pub claims: Claims,
}

/// Why a credential failed cryptographic or temporal verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("unexpected signing algorithm")]
    UnexpectedAlgorithm,

    #[error("credential expired")]
    Expired,

    #[error("malformed credential: {0}")]
    Malformed(String),
}

impl VerificationError {
    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::InvalidSignature => "invalid_signature",
            VerificationError::UnexpectedAlgorithm => "unexpected_algorithm",
            VerificationError::Expired => "expired",
            VerificationError::Malformed(_) => "malformed",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => VerificationError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                VerificationError::UnexpectedAlgorithm
            }
            ErrorKind::ExpiredSignature => VerificationError::Expired,
            _ => VerificationError::Malformed(err.to_string()),
        }
    }
}

/// Failure while issuing a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to sign credential: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of the renewal flow.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("expected a renewal credential, got {0}")]
    WrongKind(CredentialKind),

    #[error("renewal credential revoked or expired")]
    Revoked,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Issue(#[from] CredentialError),
}

/// SHA-256 hex digest used as the revocation store key.
pub fn credential_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Issues and verifies credentials.
pub struct CredentialAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    renewal_ttl: Duration,
    store: Arc<dyn RevocationStore>,
}

impl CredentialAuthority {
    pub fn new(
        secret: &[u8],
        access_ttl: Duration,
        renewal_ttl: Duration,
        store: Arc<dyn RevocationStore>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_ttl,
            renewal_ttl,
            store,
        }
    }

    /// Build from config; an empty secret yields a random per-process one.
    pub fn from_config(config: &AuthConfig, store: Arc<dyn RevocationStore>) -> Self {
        let secret = if config.jwt_secret.is_empty() {
            tracing::warn!("No auth.jwt_secret configured; using a random secret, credentials will not survive a restart");
            let mut secret = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut secret);
            secret
        } else {
            config.jwt_secret.as_bytes().to_vec()
        };
        Self::new(
            &secret,
            Duration::from_secs(config.access_ttl_secs),
            Duration::from_secs(config.renewal_ttl_secs),
            store,
        )
    }

    pub fn lifetime(&self, kind: CredentialKind) -> Duration {
        match kind {
            CredentialKind::Access => self.access_ttl,
            CredentialKind::Renewal => self.renewal_ttl,
        }
    }

    /// Issue a credential for `subject`.
    ///
    /// Renewal credentials are also recorded in the revocation store; if that
    /// write fails the credential is not handed out.
    pub async fn issue(&self, subject: &str, kind: CredentialKind) -> Result<Credential, CredentialError> {
        let credential = self.sign(subject, kind, now_secs())?;
        if kind == CredentialKind::Renewal {
            self.store
                .set(&credential_hash(&credential.token), RENEWAL_MARKER, self.renewal_ttl)
                .await?;
        }
        metrics::record_credential_issued(kind.as_str());
        tracing::debug!(subject, kind = %kind, exp = credential.claims.exp, "Credential issued");
        Ok(credential)
    }

    fn sign(&self, subject: &str, kind: CredentialKind, issued_at: u64) -> Result<Credential, CredentialError> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at + self.lifetime(kind).as_secs(),
            kind,
            jti: Uuid::new_v4().to_string(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CredentialError::Signing(e.to_string()))?;
        Ok(Credential { token, claims })
    }

    /// Check signature, algorithm and expiry. Never consults the store.
    pub fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }

    /// Whether the store still honours this renewal credential.
    ///
    /// `Ok(false)` means absent or expired in the store, independent of the
    /// credential's own signature and expiry.
    pub async fn check_renewal_valid(&self, token: &str) -> Result<bool, StoreError> {
        if token.is_empty() {
            return Ok(false);
        }
        let value = self.store.get(&credential_hash(token)).await?;
        Ok(value.as_deref() == Some(RENEWAL_MARKER))
    }

    /// Exchange a renewal credential for a new access credential for the same subject.
    pub async fn refresh(&self, renewal_token: &str) -> Result<Credential, RefreshError> {
        let claims = self.verify(renewal_token)?;
        if claims.kind != CredentialKind::Renewal {
            return Err(RefreshError::WrongKind(claims.kind));
        }
        if !self.check_renewal_valid(renewal_token).await? {
            return Err(RefreshError::Revoked);
        }
        Ok(self.issue(&claims.sub, CredentialKind::Access).await?)
    }

    /// Delete a renewal credential's store entry.
    pub async fn revoke(&self, renewal_token: &str) -> Result<(), StoreError> {
        self.store.delete(&credential_hash(renewal_token)).await
    }
}

impl fmt::Debug for CredentialAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialAuthority")
            .field("access_ttl", &self.access_ttl)
            .field("renewal_ttl", &self.renewal_ttl)
            .finish_non_exhaustive()
    }
}
