//! In-process bridge endpoints.
//!
//! [`InProcessApi`] calls an [`IdentityBridge`] directly and reshapes its
//! results into the bodies the HTTP routes return. [`LocalSecondaryAuth`] is
//! the client surface of a [`LocalDirectory`]. Together they run the whole
//! bridge inside one process.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{BridgeApi, ClaimsResponse, CredentialStore, SecondaryAuth, TokenResponse};
use crate::error::{BridgeError, ServiceError};
use crate::local_directory::LocalDirectory;
use crate::service::IdentityBridge;

/// Error body text for a [`ServiceError`], as the routes render it.
#[must_use]
pub fn error_body(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Unauthorized => "Unauthorized",
        ServiceError::Internal(_) => "Internal Server Error",
    }
}

/// [`BridgeApi`] over an in-process [`IdentityBridge`], presenting a fixed
/// primary session token.
pub struct InProcessApi {
    bridge: IdentityBridge,
    session_token: Option<String>,
}

impl InProcessApi {
    #[must_use]
    pub fn new(bridge: IdentityBridge, session_token: Option<String>) -> Self {
        Self {
            bridge,
            session_token,
        }
    }
}

#[async_trait]
impl BridgeApi for InProcessApi {
    async fn request_custom_token(&self) -> Result<TokenResponse, BridgeError> {
        Ok(match self.bridge.mint(self.session_token.as_deref()).await {
            Ok(minted) => TokenResponse {
                firebase_token: Some(minted.firebase_token),
                firebase_uid: Some(minted.firebase_uid),
                error: None,
            },
            Err(e) => TokenResponse {
                error: Some(error_body(&e).to_owned()),
                ..TokenResponse::default()
            },
        })
    }

    async fn sync_custom_claims(&self) -> Result<ClaimsResponse, BridgeError> {
        Ok(match self.bridge.sync_claims(self.session_token.as_deref()).await {
            Ok(ack) => ClaimsResponse {
                success: Some(ack.success),
                error: None,
            },
            Err(e) => ClaimsResponse {
                success: None,
                error: Some(error_body(&e).to_owned()),
            },
        })
    }
}

/// [`SecondaryAuth`] backed directly by a [`LocalDirectory`].
pub struct LocalSecondaryAuth {
    directory: Arc<LocalDirectory>,
    credentials: CredentialStore,
}

impl LocalSecondaryAuth {
    #[must_use]
    pub fn new(directory: Arc<LocalDirectory>) -> Self {
        Self {
            directory,
            credentials: CredentialStore::new(),
        }
    }

    /// Forget the signed-in user.
    pub fn sign_out(&self) {
        self.credentials.clear();
    }
}

#[async_trait]
impl SecondaryAuth for LocalSecondaryAuth {
    async fn sign_in_with_custom_token(&self, custom_token: &str) -> Result<String, BridgeError> {
        let response = self
            .directory
            .sign_in_with_custom_token(custom_token)
            .await
            .map_err(|e| BridgeError::SignIn {
                reason: e.to_string(),
            })?;
        Ok(self.credentials.store(response.into()))
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, BridgeError> {
        let current = self.credentials.current()?;
        if !force_refresh {
            return Ok(current.id_token);
        }
        let response = self
            .directory
            .refresh(&current.refresh_token)
            .await
            .map_err(|e| BridgeError::Refresh {
                reason: e.to_string(),
            })?;
        let id_token = response.id_token.clone();
        self.credentials.store(response.into());
        Ok(id_token)
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.credentials.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nopass_storage::MemoryBackend;

    use super::*;
    use crate::directory::IdentityDirectory;
    use crate::signer::test_keys::signer;
    use crate::subject::SubjectId;

    fn local() -> Arc<LocalDirectory> {
        Arc::new(LocalDirectory::new(Arc::new(MemoryBackend::new()), Arc::new(signer())).unwrap())
    }

    #[tokio::test]
    async fn id_token_requires_sign_in() {
        let auth = LocalSecondaryAuth::new(local());
        assert_eq!(auth.id_token(false).await, Err(BridgeError::NotSignedIn));
    }

    #[tokio::test]
    async fn bad_custom_token_is_a_sign_in_error() {
        let auth = LocalSecondaryAuth::new(local());
        assert!(matches!(
            auth.sign_in_with_custom_token("not-a-token").await,
            Err(BridgeError::SignIn { .. })
        ));
        assert!(auth.subscribe().borrow().is_none());
    }

    #[tokio::test]
    async fn sign_in_then_sign_out() {
        let dir = local();
        let token = dir
            .create_custom_token(&SubjectId::new("user_123").unwrap())
            .await
            .unwrap();
        let auth = LocalSecondaryAuth::new(dir);

        assert_eq!(auth.sign_in_with_custom_token(&token).await.unwrap(), "user_123");
        assert!(auth.id_token(false).await.is_ok());

        auth.sign_out();
        assert!(auth.subscribe().borrow().is_none());
        assert_eq!(auth.id_token(true).await, Err(BridgeError::NotSignedIn));
    }
}
