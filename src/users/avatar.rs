//! Gravatar URLs derived from email addresses.

use sha2::{Digest, Sha256};

use crate::users::normalize_email;

const GRAVATAR_BASE: &str = "https://www.gravatar.com/avatar";

/// Identicon URL for `email`; unknown addresses still get a generated image.
pub fn profile_picture_url(email: &str) -> String {
    let digest = hex::encode(Sha256::digest(normalize_email(email).as_bytes()));
    format!("{GRAVATAR_BASE}/{digest}?d=identicon")
}
