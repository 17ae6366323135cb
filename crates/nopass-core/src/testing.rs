//! Test doubles shared by unit tests.

use async_trait::async_trait;

use crate::directory::{CustomClaims, IdentityDirectory, UserRecord};
use crate::error::DirectoryError;
use crate::subject::SubjectId;

/// A directory whose every admin call fails, as an unreachable remote would.
pub struct FailingDirectory;

fn unavailable() -> DirectoryError {
    DirectoryError::Remote {
        reason: "identity service unavailable".to_owned(),
    }
}

#[async_trait]
impl IdentityDirectory for FailingDirectory {
    async fn create_custom_token(&self, _uid: &SubjectId) -> Result<String, DirectoryError> {
        Err(unavailable())
    }

    async fn set_custom_user_claims(
        &self,
        _uid: &SubjectId,
        _claims: CustomClaims,
    ) -> Result<(), DirectoryError> {
        Err(unavailable())
    }

    async fn get_user(&self, _uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        Err(unavailable())
    }
}
