//! Error types for `nopass-core`.
//!
//! Each variant carries enough context to diagnose the problem from a log
//! line. Token and key material is never included, only uids, claim names,
//! and operation descriptions.

use nopass_storage::StorageError;

/// A subject identifier failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubjectError {
    /// The identifier was empty.
    #[error("subject identifier must not be empty")]
    Empty,

    /// The identifier exceeds the secondary system's uid limit.
    #[error("subject identifier is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Errors from primary-provider session verification.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session token was presented.
    #[error("no session token presented")]
    Missing,

    /// The session token failed signature or structural validation.
    #[error("invalid session token: {reason}")]
    Invalid { reason: String },

    /// The session token is past its `exp`.
    #[error("session token expired")]
    Expired,

    /// The token was issued for a party outside the allow-list.
    #[error("session token issued for unauthorized party '{azp}'")]
    UnauthorizedParty { azp: String },

    /// The token's `sub` is not a usable subject identifier.
    #[error("session subject rejected: {0}")]
    Subject(#[from] SubjectError),

    /// The configured verification key could not be parsed.
    #[error("invalid session verification key: {reason}")]
    KeyConfig { reason: String },
}

/// Errors from signing or verifying tokens with the service-account key.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The PEM key could not be parsed.
    #[error("invalid {kind} key: {reason}")]
    InvalidKey { kind: &'static str, reason: String },

    /// JWT encoding failed.
    #[error("token signing failed: {reason}")]
    Signing { reason: String },

    /// Verification was requested but no public key is configured.
    #[error("no verification key configured for this signer")]
    MissingVerificationKey,

    /// The token is past its `exp`.
    #[error("token expired")]
    Expired,

    /// The token failed signature, audience, or issuer validation.
    #[error("token rejected: {reason}")]
    Invalid { reason: String },
}

/// Errors from the secondary identity directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// A claim name is reserved by the token format.
    #[error("custom claim '{name}' is reserved")]
    ReservedClaim { name: String },

    /// The serialized claims exceed the payload limit.
    #[error("custom claims payload is {size} bytes, limit is {max}")]
    ClaimsTooLarge { size: usize, max: usize },

    /// The requested user does not exist.
    #[error("user not found: {uid}")]
    UserNotFound { uid: String },

    /// A custom token or refresh token was not accepted.
    #[error("credential rejected: {reason}")]
    InvalidCredential { reason: String },

    /// A uid embedded in a credential is invalid.
    #[error("invalid uid: {0}")]
    Subject(#[from] SubjectError),

    /// Token signing or verification failed.
    #[error("directory signer error: {0}")]
    Signer(#[from] SignerError),

    /// The storage backend failed.
    #[error("directory storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored or remote record could not be (de)serialized.
    #[error("directory serialization error: {reason}")]
    Serialization { reason: String },

    /// The remote identity service failed or answered with an error.
    #[error("identity service error: {reason}")]
    Remote { reason: String },
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

/// Errors from the server-side bridge operations, reduced to the two
/// outcomes a caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No verified primary session. Terminal; the user must re-authenticate.
    #[error("unauthorized")]
    Unauthorized,

    /// A remote call failed. Terminal for this request.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors seen by the client bridge while talking to the server or to the
/// secondary identity system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The request never produced a usable response.
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The token endpoint answered without a custom token.
    #[error("no custom token received: {detail}")]
    MissingToken { detail: String },

    /// The secondary identity system rejected the sign-in.
    #[error("secondary sign-in failed: {reason}")]
    SignIn { reason: String },

    /// Refreshing the secondary ID token failed.
    #[error("credential refresh failed: {reason}")]
    Refresh { reason: String },

    /// An operation needed a signed-in secondary user.
    #[error("no secondary user is signed in")]
    NotSignedIn,
}

/// Errors from the secondary app holder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppInitError {
    /// `initialize` was called on an app that already holds a client.
    #[error("app '{name}' is already initialized")]
    AlreadyInitialized { name: String },
}
