//! Token Minter: verified subject → custom token.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::directory::IdentityDirectory;
use crate::error::DirectoryError;
use crate::subject::SubjectId;

/// Body of a successful mint: the custom token and the uid it signs in as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedToken {
    pub firebase_token: String,
    pub firebase_uid: String,
}

/// Exchanges a verified subject for a short-lived custom token.
///
/// Stateless: every call is one admin mint and nothing is retried.
#[derive(Clone)]
pub struct TokenMinter {
    directory: Arc<dyn IdentityDirectory>,
}

impl TokenMinter {
    #[must_use]
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    /// Mint a custom token for `subject`. The secondary uid is the subject
    /// itself.
    ///
    /// # Errors
    ///
    /// Propagates the directory's [`DirectoryError`].
    pub async fn mint(&self, subject: &SubjectId) -> Result<MintedToken, DirectoryError> {
        let firebase_token = self.directory.create_custom_token(subject).await?;
        Ok(MintedToken {
            firebase_token,
            firebase_uid: subject.to_string(),
        })
    }
}
