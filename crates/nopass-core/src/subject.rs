//! Subject identity: the primary provider's stable user id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SubjectError;

/// Longest uid the secondary identity system accepts.
pub const MAX_SUBJECT_LEN: usize = 128;

/// A validated, non-empty subject identifier (e.g. `user_2abc...`).
///
/// This is the only value carried across the bridge; it becomes the uid of
/// the secondary user record and the value of its `clerkId` claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap a subject identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SubjectError::Empty`] for an empty string and
    /// [`SubjectError::TooLong`] past [`MAX_SUBJECT_LEN`] characters.
    pub fn new(id: impl Into<String>) -> Result<Self, SubjectError> {
        let id = id.into();
        if id.is_empty() {
            return Err(SubjectError::Empty);
        }
        let len = id.chars().count();
        if len > MAX_SUBJECT_LEN {
            return Err(SubjectError::TooLong {
                len,
                max: MAX_SUBJECT_LEN,
            });
        }
        Ok(Self(id))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = SubjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

impl AsRef<str> for SubjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
