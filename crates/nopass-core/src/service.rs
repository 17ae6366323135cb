//! Server-side bridge operations.
//!
//! [`IdentityBridge`] composes the Session Verifier, Token Minter and Claims
//! Synchronizer into the two operations the HTTP routes expose. Every
//! failure is reduced to [`ServiceError`]: an absent or invalid session is
//! `Unauthorized` and nothing else runs; any admin failure is `Internal`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::claims::ClaimsSynchronizer;
use crate::directory::IdentityDirectory;
use crate::error::{ServiceError, SessionError, SubjectError};
use crate::minter::{MintedToken, TokenMinter};
use crate::session::SessionVerifier;
use crate::subject::SubjectId;

/// Acknowledgement returned by a successful claims sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsAck {
    pub success: bool,
}

/// The server half of the identity bridge.
#[derive(Clone)]
pub struct IdentityBridge {
    verifier: Arc<dyn SessionVerifier>,
    minter: TokenMinter,
    claims: ClaimsSynchronizer,
}

impl IdentityBridge {
    /// Wire the bridge over a session verifier and a secondary directory.
    #[must_use]
    pub fn new(verifier: Arc<dyn SessionVerifier>, directory: Arc<dyn IdentityDirectory>) -> Self {
        Self {
            verifier,
            minter: TokenMinter::new(directory.clone()),
            claims: ClaimsSynchronizer::new(directory),
        }
    }

    /// Resolve the presented session token, if any, into a subject.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unauthorized`] when no token is presented or
    /// the token does not verify. A verified session whose subject is too
    /// long to be a secondary uid is [`ServiceError::Internal`]: the caller
    /// is signed in, the secondary system just cannot represent them.
    pub async fn authenticate(&self, session_token: Option<&str>) -> Result<SubjectId, ServiceError> {
        let Some(token) = session_token.filter(|t| !t.is_empty()) else {
            return Err(ServiceError::Unauthorized);
        };
        self.verifier.verify(token).await.map_err(|e| match e {
            SessionError::Subject(SubjectError::TooLong { .. }) => {
                error!(reason = %e, "session subject is not a valid secondary uid");
                ServiceError::Internal(e.to_string())
            }
            _ => {
                info!(reason = %e, "session rejected");
                ServiceError::Unauthorized
            }
        })
    }

    /// Token Minter operation behind `/api/firebase-token`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthorized`] without a verified session,
    /// [`ServiceError::Internal`] if minting fails.
    pub async fn mint(&self, session_token: Option<&str>) -> Result<MintedToken, ServiceError> {
        info!("firebase-token endpoint invoked");
        let subject = self.authenticate(session_token).await.inspect_err(|e| {
            if matches!(e, ServiceError::Unauthorized) {
                warn!("session not detected in firebase-token request");
            }
        })?;

        match self.minter.mint(&subject).await {
            Ok(minted) => {
                info!(uid = %subject, "custom token created");
                Ok(minted)
            }
            Err(e) => {
                error!(uid = %subject, error = %e, "error generating custom token");
                Err(ServiceError::Internal(e.to_string()))
            }
        }
    }

    /// Claims Synchronizer operation behind `/api/setFirebaseCustomClaims`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Unauthorized`] without a verified session,
    /// [`ServiceError::Internal`] if the claims write fails.
    pub async fn sync_claims(&self, session_token: Option<&str>) -> Result<ClaimsAck, ServiceError> {
        info!("setFirebaseCustomClaims endpoint invoked");
        let subject = self.authenticate(session_token).await.inspect_err(|e| {
            if matches!(e, ServiceError::Unauthorized) {
                warn!("session not detected in setFirebaseCustomClaims request");
            }
        })?;

        match self.claims.sync(&subject).await {
            Ok(()) => {
                info!(uid = %subject, "custom claims set");
                Ok(ClaimsAck { success: true })
            }
            Err(e) => {
                error!(uid = %subject, error = %e, "error setting custom claims");
                Err(ServiceError::Internal(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use nopass_storage::MemoryBackend;
    use serde_json::json;

    use super::*;
    use crate::claims::SUBJECT_CLAIM;
    use crate::local_directory::LocalDirectory;
    use crate::session::ClerkSessionVerifier;
    use crate::signer::test_keys::{CLERK_PRIVATE, CLERK_PUBLIC, signer};
    use crate::signer::unix_now;
    use crate::testing::FailingDirectory;

    fn session(sub: &str) -> String {
        let now = unix_now();
        let key = EncodingKey::from_rsa_pem(CLERK_PRIVATE.as_bytes()).unwrap();
        encode(
            &Header::new(Algorithm::RS256),
            &json!({ "sub": sub, "iat": now, "exp": now + 60 }),
            &key,
        )
        .unwrap()
    }

    fn bridge_over(directory: Arc<dyn IdentityDirectory>) -> IdentityBridge {
        let verifier = Arc::new(ClerkSessionVerifier::from_pem(CLERK_PUBLIC).unwrap());
        IdentityBridge::new(verifier, directory)
    }

    fn local() -> Arc<LocalDirectory> {
        Arc::new(LocalDirectory::new(Arc::new(MemoryBackend::new()), Arc::new(signer())).unwrap())
    }

    #[tokio::test]
    async fn both_operations_reject_missing_or_bad_sessions() {
        let bridge = bridge_over(local());
        for token in [None, Some(""), Some("garbage")] {
            assert!(matches!(bridge.mint(token).await, Err(ServiceError::Unauthorized)));
            assert!(matches!(
                bridge.sync_claims(token).await,
                Err(ServiceError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn unauthorized_requests_touch_nothing() {
        let dir = local();
        let bridge = bridge_over(dir.clone());
        let _ = bridge.sync_claims(Some("garbage")).await;
        let subject = SubjectId::new("user_123").unwrap();
        assert!(dir.get_user(&subject).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn signed_in_subject_is_minted_and_stamped() {
        let dir = local();
        let bridge = bridge_over(dir.clone());
        let token = session("user_123");

        let minted = bridge.mint(Some(&token)).await.unwrap();
        assert_eq!(minted.firebase_uid, "user_123");

        let ack = bridge.sync_claims(Some(&token)).await.unwrap();
        assert!(ack.success);

        let subject = SubjectId::new("user_123").unwrap();
        let user = dir.get_user(&subject).await.unwrap().unwrap();
        assert_eq!(user.custom_claims[SUBJECT_CLAIM], json!("user_123"));
    }

    #[tokio::test]
    async fn overlong_subject_is_internal_not_unauthorized() {
        let bridge = bridge_over(local());
        let token = session(&"u".repeat(129));

        assert!(matches!(
            bridge.mint(Some(&token)).await,
            Err(ServiceError::Internal(_))
        ));
        assert!(matches!(
            bridge.sync_claims(Some(&token)).await,
            Err(ServiceError::Internal(_))
        ));

        let empty = session("");
        assert!(matches!(bridge.mint(Some(&empty)).await, Err(ServiceError::Unauthorized)));
    }

    #[tokio::test]
    async fn directory_failures_become_internal() {
        let bridge = bridge_over(Arc::new(FailingDirectory));
        let token = session("user_123");
        assert!(matches!(
            bridge.mint(Some(&token)).await,
            Err(ServiceError::Internal(_))
        ));
        assert!(matches!(
            bridge.sync_claims(Some(&token)).await,
            Err(ServiceError::Internal(_))
        ));
    }
}
