//! Secondary identity system: administrative surface.
//!
//! The bridge needs exactly three admin operations from the secondary
//! system: mint a custom token for a uid, set a user's custom claims, and
//! read a user back. [`IdentityDirectory`] is the seam; implementations are
//! the self-hosted [`LocalDirectory`](crate::local_directory::LocalDirectory)
//! and, with the `identity-toolkit` feature, the remote
//! [`IdentityToolkitDirectory`](crate::identity_toolkit::IdentityToolkitDirectory).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;
use crate::subject::SubjectId;

/// Custom claims as stored on a user record: a flat JSON object.
pub type CustomClaims = serde_json::Map<String, serde_json::Value>;

/// Claim names that collide with token-format claims and may not be set.
pub const RESERVED_CLAIMS: &[&str] = &[
    "acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase",
    "iat", "iss", "jti", "nbf", "nonce", "sub",
];

/// Upper bound on the serialized size of a user's custom claims.
pub const MAX_CLAIMS_PAYLOAD_BYTES: usize = 1000;

/// Check custom claims against the reserved-name list and size limit.
///
/// # Errors
///
/// Returns [`DirectoryError::ReservedClaim`] or
/// [`DirectoryError::ClaimsTooLarge`].
pub fn validate_custom_claims(claims: &CustomClaims) -> Result<(), DirectoryError> {
    if let Some(name) = claims.keys().find(|k| RESERVED_CLAIMS.contains(&k.as_str())) {
        return Err(DirectoryError::ReservedClaim { name: name.clone() });
    }
    let size = serde_json::to_vec(claims)?.len();
    if size > MAX_CLAIMS_PAYLOAD_BYTES {
        return Err(DirectoryError::ClaimsTooLarge {
            size,
            max: MAX_CLAIMS_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

/// A user record in the secondary identity system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: SubjectId,
    #[serde(default)]
    pub custom_claims: CustomClaims,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// A fresh record with no claims.
    #[must_use]
    pub fn new(uid: SubjectId) -> Self {
        Self {
            uid,
            custom_claims: CustomClaims::new(),
            created_at: Utc::now(),
            last_sign_in_at: None,
        }
    }
}

/// Administrative operations on the secondary identity system.
#[async_trait]
pub trait IdentityDirectory: Send + Sync + 'static {
    /// Mint a short-lived custom token for `uid`.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if signing fails.
    async fn create_custom_token(&self, uid: &SubjectId) -> Result<String, DirectoryError>;

    /// Replace `uid`'s custom claims, creating the user record if needed.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the claims are invalid or the write
    /// fails. A failed write leaves the previous claims in place.
    async fn set_custom_user_claims(
        &self,
        uid: &SubjectId,
        claims: CustomClaims,
    ) -> Result<(), DirectoryError>;

    /// Look up a user record.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the lookup itself fails.
    async fn get_user(&self, uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn claims(value: serde_json::Value) -> CustomClaims {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn accepts_bridge_claim() {
        assert!(validate_custom_claims(&claims(json!({ "clerkId": "user_123" }))).is_ok());
    }

    #[test]
    fn rejects_reserved_names() {
        let err = validate_custom_claims(&claims(json!({ "sub": "x", "role": "admin" })));
        assert!(matches!(err, Err(DirectoryError::ReservedClaim { name }) if name == "sub"));
    }

    #[test]
    fn rejects_oversized_payload() {
        let big = "x".repeat(MAX_CLAIMS_PAYLOAD_BYTES);
        let err = validate_custom_claims(&claims(json!({ "blob": big })));
        assert!(matches!(err, Err(DirectoryError::ClaimsTooLarge { .. })));
    }
}
