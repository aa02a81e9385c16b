//! Anonymous-but-verifiable authorship.
//!
//! A client keeps a random [`OwnerToken`] in a long-lived cookie. Resources
//! store only the [`OwnershipHash`] of that token under the site secret, so
//! presenting the same token later proves authorship without accounts.
//!
//! This is a trust boundary, not an access-control mechanism: anyone holding
//! the token is the owner, and tokens are never rotated or revoked.

use crate::error::{ForumError, ForumResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

pub const TOKEN_COOKIE: &str = "forum_user_id";
pub const TOKEN_HEADER: &str = "x-user-cookie";
pub const TOKEN_LIFETIME_DAYS: i64 = 365;
pub const HASH_LEN: usize = 16;

/// Client-held identity token. Opaque and not secret by itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// A fresh token for the caller to persist.
    pub fn issue() -> Self {
        Self(format!("user_{}", Uuid::new_v4().simple()))
    }

    pub fn new(token: impl Into<String>) -> ForumResult<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(ForumError::MissingToken);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Token from the `x-user-cookie` header, falling back to the
    /// `forum_user_id` entry of a `Cookie` header.
    pub fn from_headers(header: Option<&str>, cookie: Option<&str>) -> ForumResult<Self> {
        if let Some(value) = header.filter(|v| !v.trim().is_empty()) {
            return Self::new(value);
        }
        cookie
            .and_then(|c| {
                c.split(';').find_map(|pair| {
                    let (name, value) = pair.trim().split_once('=')?;
                    (name == TOKEN_COOKIE).then_some(value)
                })
            })
            .ok_or(ForumError::MissingToken)
            .and_then(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep tokens out of logs.
impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OwnerToken(..)")
    }
}

/// 16 lowercase hex characters stored with every resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnershipHash(String);

impl OwnershipHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnershipHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-held secret mixed into every ownership hash.
///
/// Writers and verifiers must share the same secret, byte for byte, or no
/// ownership check will ever succeed.
#[derive(Clone)]
pub struct SiteSecret(String);

impl SiteSecret {
    pub fn new(secret: impl Into<String>) -> ForumResult<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(ForumError::Config {
                message: "SITE_SECRET is not configured".to_string(),
            });
        }
        Ok(Self(secret))
    }

    /// `hex(SHA-256(token || secret))[..16]`, identical to the browser-side
    /// computation over the UTF-8 concatenation.
    pub fn ownership_hash(&self, token: &OwnerToken) -> OwnershipHash {
        let mut hasher = Sha256::new();
        hasher.update(token.as_str().as_bytes());
        hasher.update(self.0.as_bytes());
        let mut hex = hex::encode(hasher.finalize());
        hex.truncate(HASH_LEN);
        OwnershipHash(hex)
    }

    pub fn verify(&self, token: &OwnerToken, stored: &str) -> bool {
        self.ownership_hash(token).as_str() == stored.trim()
    }
}

impl fmt::Debug for SiteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SiteSecret(..)")
    }
}
