//! Signed-in state shared by secondary client implementations.

use tokio::sync::watch;

use crate::error::BridgeError;
use crate::local_directory::SignInResponse;

/// Credentials of the signed-in secondary user.
#[derive(Clone, PartialEq, Eq)]
pub struct SecondarySession {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for SecondarySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecondarySession")
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

impl From<SignInResponse> for SecondarySession {
    fn from(response: SignInResponse) -> Self {
        Self {
            uid: response.local_id,
            id_token: response.id_token,
            refresh_token: response.refresh_token,
        }
    }
}

/// Holds the current [`SecondarySession`] and publishes the signed-in uid.
///
/// A later sign-in replaces an earlier one. Subscribers are only woken when
/// the uid changes, not on every token refresh.
#[derive(Debug)]
pub struct CredentialStore {
    session: watch::Sender<Option<SecondarySession>>,
    user: watch::Sender<Option<String>>,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: watch::Sender::new(None),
            user: watch::Sender::new(None),
        }
    }

    /// Replace the current session; returns its uid.
    pub fn store(&self, session: SecondarySession) -> String {
        let uid = session.uid.clone();
        self.session.send_replace(Some(session));
        self.user.send_if_modified(|current| {
            if current.as_deref() == Some(uid.as_str()) {
                return false;
            }
            *current = Some(uid.clone());
            true
        });
        uid
    }

    /// The current session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotSignedIn`] when nobody is signed in.
    pub fn current(&self) -> Result<SecondarySession, BridgeError> {
        self.session.borrow().clone().ok_or(BridgeError::NotSignedIn)
    }

    /// Drop the current session.
    pub fn clear(&self) {
        self.session.send_replace(None);
        self.user.send_if_modified(|current| current.take().is_some());
    }

    /// Watch the signed-in uid.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.user.subscribe()
    }
}
