//! Claims Synchronizer: stamps the subject onto the secondary user record.

use std::sync::Arc;

use serde_json::Value;

use crate::directory::{CustomClaims, IdentityDirectory};
use crate::error::DirectoryError;
use crate::subject::SubjectId;

/// Name of the custom claim carrying the primary-provider subject.
pub const SUBJECT_CLAIM: &str = "clerkId";

/// The claims written for `subject`. Always the same value for the same
/// subject, so repeated writes converge.
#[must_use]
pub fn subject_claims(subject: &SubjectId) -> CustomClaims {
    let mut claims = CustomClaims::new();
    claims.insert(SUBJECT_CLAIM.to_owned(), Value::String(subject.to_string()));
    claims
}

/// Upserts `{clerkId: <subject>}` on the subject's secondary user record.
#[derive(Clone)]
pub struct ClaimsSynchronizer {
    directory: Arc<dyn IdentityDirectory>,
}

impl ClaimsSynchronizer {
    #[must_use]
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    /// Write the subject claim. One admin call; a failure leaves the record
    /// as it was.
    ///
    /// # Errors
    ///
    /// Propagates the directory's [`DirectoryError`].
    pub async fn sync(&self, subject: &SubjectId) -> Result<(), DirectoryError> {
        self.directory
            .set_custom_user_claims(subject, subject_claims(subject))
            .await
    }
}
