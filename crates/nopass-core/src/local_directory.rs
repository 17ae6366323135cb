//! Self-hosted secondary identity system.
//!
//! [`LocalDirectory`] keeps user records in a [`StorageBackend`] and signs
//! everything with the service-account key, so the whole bridge can run
//! without a managed identity service. Besides the admin surface it provides
//! the client surface the bridge signs in through:
//!
//! - `sign_in_with_custom_token` verifies a custom token, upserts the user,
//!   and returns an ID token plus a refresh token.
//! - `refresh` exchanges a refresh token for a new ID token built from the
//!   user's *current* claims. Forcing a refresh right after a claims write
//!   is how a client observes new claims before the old ID token expires.
//!
//! Storage layout (values are JSON):
//!
//! ```text
//! users/<uid>             → UserRecord
//! refresh/<sha256(token)> → RefreshBinding
//! refresh-index/<uid>     → [sha256(token), ...] oldest first
//! ```
//!
//! Refresh tokens are stored only as SHA-256 hashes. Each user keeps at most
//! [`MAX_REFRESH_TOKENS_PER_USER`] live refresh tokens; issuing another
//! revokes the oldest. A refresh token also lapses after
//! [`REFRESH_TOKEN_TTL_DAYS`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation};
use nopass_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::directory::{CustomClaims, IdentityDirectory, UserRecord, validate_custom_claims};
use crate::error::{DirectoryError, SignerError};
use crate::signer::{TokenSigner, VERIFY_LEEWAY_SECS, unix_now};
use crate::subject::SubjectId;

/// Lifetime of an issued ID token, in seconds.
pub const ID_TOKEN_TTL_SECS: i64 = 3600;

/// Live refresh tokens kept per user.
pub const MAX_REFRESH_TOKENS_PER_USER: usize = 5;

/// Lifetime of a refresh token, in days.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

/// Top-level ID-token fields a custom claim must not shadow.
const ID_TOKEN_FIELDS: &[&str] = &[
    "iss", "aud", "sub", "user_id", "auth_time", "iat", "exp", "firebase",
];

const USERS_PREFIX: &str = "users/";
const REFRESH_PREFIX: &str = "refresh/";
const REFRESH_INDEX_PREFIX: &str = "refresh-index/";

/// Result of a successful sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInResponse {
    pub id_token: String,
    pub refresh_token: String,
    /// ID-token lifetime in seconds, as a decimal string.
    pub expires_in: String,
    /// uid of the signed-in user.
    pub local_id: String,
}

/// Provider details embedded in every ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseClaim {
    pub sign_in_provider: String,
}

/// Payload of an ID token. Custom claims are flattened to the top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub user_id: String,
    pub auth_time: i64,
    pub iat: i64,
    pub exp: i64,
    pub firebase: FirebaseClaim,
    #[serde(flatten)]
    pub custom: CustomClaims,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshBinding {
    uid: SubjectId,
    auth_time: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Hash a refresh token with SHA-256 for storage and lookup.
#[must_use]
pub fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Generate a refresh token: `nprt_` followed by 256 bits from two UUID v4s.
fn generate_refresh_token() -> String {
    format!(
        "nprt_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

fn user_key(uid: &SubjectId) -> String {
    format!("{USERS_PREFIX}{uid}")
}

fn refresh_key(hash: &str) -> String {
    format!("{REFRESH_PREFIX}{hash}")
}

fn refresh_index_key(uid: &SubjectId) -> String {
    format!("{REFRESH_INDEX_PREFIX}{uid}")
}

/// Reject claims that would collide with the fields every ID token carries.
fn check_id_token_fields(claims: &CustomClaims) -> Result<(), DirectoryError> {
    match claims.keys().find(|k| ID_TOKEN_FIELDS.contains(&k.as_str())) {
        Some(name) => Err(DirectoryError::ReservedClaim { name: name.clone() }),
        None => Ok(()),
    }
}

fn rejected(err: SignerError) -> DirectoryError {
    match err {
        SignerError::Expired | SignerError::Invalid { .. } => DirectoryError::InvalidCredential {
            reason: err.to_string(),
        },
        other => DirectoryError::Signer(other),
    }
}

/// Storage-backed secondary identity system.
pub struct LocalDirectory {
    storage: Arc<dyn StorageBackend>,
    signer: Arc<TokenSigner>,
    // Serializes read-modify-write of user records so a sign-in never
    // writes back a record read before a concurrent claims update.
    records: Mutex<()>,
}

impl std::fmt::Debug for LocalDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDirectory")
            .field("project_id", &self.signer.account().project_id)
            .finish_non_exhaustive()
    }
}

impl LocalDirectory {
    /// Create a directory over `storage`, signing with `signer`.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::MissingVerificationKey`] (wrapped) if the
    /// signer has no public key, since sign-in must verify custom tokens.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        signer: Arc<TokenSigner>,
    ) -> Result<Self, DirectoryError> {
        if !signer.can_verify() {
            return Err(SignerError::MissingVerificationKey.into());
        }
        Ok(Self {
            storage,
            signer,
            records: Mutex::new(()),
        })
    }

    /// Project the directory issues tokens for.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.signer.account().project_id
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id())
    }

    async fn load_user(&self, uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        match self.storage.get(&user_key(uid)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_user(&self, user: &UserRecord) -> Result<(), DirectoryError> {
        let bytes = serde_json::to_vec(user)?;
        self.storage.put(&user_key(&user.uid), &bytes).await?;
        Ok(())
    }

    /// Record a new refresh token for `uid`, revoking the oldest ones past
    /// the per-user limit. Callers hold `records`.
    async fn bind_refresh_token(
        &self,
        uid: &SubjectId,
        auth_time: i64,
    ) -> Result<String, DirectoryError> {
        let index_key = refresh_index_key(uid);
        let mut hashes: Vec<String> = match self.storage.get(&index_key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => Vec::new(),
        };

        let refresh_token = generate_refresh_token();
        let hash = hash_refresh_token(&refresh_token);
        let now = Utc::now();
        let binding = RefreshBinding {
            uid: uid.clone(),
            auth_time,
            issued_at: now,
            expires_at: now + chrono::Duration::days(REFRESH_TOKEN_TTL_DAYS),
        };
        self.storage
            .put(&refresh_key(&hash), &serde_json::to_vec(&binding)?)
            .await?;
        hashes.push(hash);

        let excess = hashes.len().saturating_sub(MAX_REFRESH_TOKENS_PER_USER);
        for revoked in hashes.drain(..excess) {
            self.storage.delete(&refresh_key(&revoked)).await?;
        }
        if excess > 0 {
            debug!(uid = %uid, revoked = excess, "oldest refresh tokens revoked");
        }
        self.storage
            .put(&index_key, &serde_json::to_vec(&hashes)?)
            .await?;
        Ok(refresh_token)
    }

    fn issue_id_token(&self, user: &UserRecord, auth_time: i64) -> Result<String, DirectoryError> {
        let iat = unix_now();
        let claims = IdTokenClaims {
            iss: self.issuer(),
            aud: self.project_id().to_owned(),
            sub: user.uid.to_string(),
            user_id: user.uid.to_string(),
            auth_time,
            iat,
            exp: iat.saturating_add(ID_TOKEN_TTL_SECS),
            firebase: FirebaseClaim {
                sign_in_provider: "custom".to_owned(),
            },
            custom: user.custom_claims.clone(),
        };
        Ok(self.signer.sign(&claims)?)
    }

    fn session_response(
        &self,
        user: &UserRecord,
        auth_time: i64,
        refresh_token: String,
    ) -> Result<SignInResponse, DirectoryError> {
        Ok(SignInResponse {
            id_token: self.issue_id_token(user, auth_time)?,
            refresh_token,
            expires_in: ID_TOKEN_TTL_SECS.to_string(),
            local_id: user.uid.to_string(),
        })
    }

    /// Exchange a custom token for an ID token and refresh token.
    ///
    /// Creates the user record on first sign-in.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::InvalidCredential`] if the custom token is expired,
    ///   forged, or addressed to another audience.
    /// - [`DirectoryError::Subject`] if its `uid` is not a valid subject.
    /// - Storage or serialization errors.
    pub async fn sign_in_with_custom_token(
        &self,
        custom_token: &str,
    ) -> Result<SignInResponse, DirectoryError> {
        let claims = self
            .signer
            .verify_custom_token(custom_token)
            .map_err(rejected)?;
        let uid = SubjectId::new(claims.uid)?;

        let auth_time = unix_now();
        let (user, refresh_token) = {
            let _guard = self.records.lock().await;
            let mut user = match self.load_user(&uid).await? {
                Some(user) => user,
                None => {
                    info!(uid = %uid, "creating user on first sign-in");
                    UserRecord::new(uid.clone())
                }
            };
            user.last_sign_in_at = Some(Utc::now());
            self.save_user(&user).await?;
            let refresh_token = self.bind_refresh_token(&uid, auth_time).await?;
            (user, refresh_token)
        };

        debug!(uid = %uid, "custom token sign-in complete");
        self.session_response(&user, auth_time, refresh_token)
    }

    /// Issue a new ID token for the holder of `refresh_token`, reflecting
    /// the user's current custom claims.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::InvalidCredential`] for an unknown, revoked or
    ///   expired refresh token. An expired binding is deleted.
    /// - [`DirectoryError::UserNotFound`] if the user record has vanished.
    /// - Storage or serialization errors.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SignInResponse, DirectoryError> {
        let key = refresh_key(&hash_refresh_token(refresh_token));
        let binding: RefreshBinding = match self.storage.get(&key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => {
                return Err(DirectoryError::InvalidCredential {
                    reason: "unknown refresh token".to_owned(),
                });
            }
        };
        if binding.expires_at <= Utc::now() {
            self.storage.delete(&key).await?;
            return Err(DirectoryError::InvalidCredential {
                reason: "refresh token expired".to_owned(),
            });
        }

        let user = self
            .load_user(&binding.uid)
            .await?
            .ok_or_else(|| DirectoryError::UserNotFound {
                uid: binding.uid.to_string(),
            })?;

        debug!(uid = %user.uid, "id token refreshed");
        self.session_response(&user, binding.auth_time, refresh_token.to_owned())
    }

    /// Verify an ID token issued by this directory.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidCredential`] for expired or foreign
    /// tokens.
    pub fn verify_id_token(&self, id_token: &str) -> Result<IdTokenClaims, DirectoryError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = VERIFY_LEEWAY_SECS;
        validation.set_audience(&[self.project_id()]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        self.signer.verify(id_token, &validation).map_err(rejected)
    }
}

#[async_trait]
impl IdentityDirectory for LocalDirectory {
    async fn create_custom_token(&self, uid: &SubjectId) -> Result<String, DirectoryError> {
        Ok(self.signer.custom_token(uid, None)?)
    }

    async fn set_custom_user_claims(
        &self,
        uid: &SubjectId,
        claims: CustomClaims,
    ) -> Result<(), DirectoryError> {
        validate_custom_claims(&claims)?;
        check_id_token_fields(&claims)?;

        let _guard = self.records.lock().await;
        let mut user = self
            .load_user(uid)
            .await?
            .unwrap_or_else(|| UserRecord::new(uid.clone()));
        user.custom_claims = claims;
        self.save_user(&user).await
    }

    async fn get_user(&self, uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        self.load_user(uid).await
    }
}
