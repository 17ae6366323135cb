//! Primary-provider session verification.
//!
//! The primary identity provider (Clerk) issues short-lived RS256 session
//! JWTs, delivered as the `__session` cookie on same-origin requests or as a
//! bearer token. Verification is networkless: the token signature is checked
//! against the instance's PEM public key, `exp`/`nbf` are enforced, and when
//! an allow-list is configured the `azp` (authorized party) claim must be on
//! it. The `sub` claim is the subject identity.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::SessionError;
use crate::signer::VERIFY_LEEWAY_SECS;
use crate::subject::SubjectId;

/// Resolves a presented session token into a verified subject.
#[async_trait]
pub trait SessionVerifier: Send + Sync + 'static {
    /// Verify `session_token` and return its subject.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionError`] for any token that does not represent a
    /// live, correctly signed session.
    async fn verify(&self, session_token: &str) -> Result<SubjectId, SessionError>;
}

/// Claims read from a primary-provider session token.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    /// Primary-provider user id (e.g. `user_2abc...`).
    pub sub: String,
    /// Session id.
    #[serde(default)]
    pub sid: Option<String>,
    /// Origin the token was issued for.
    #[serde(default)]
    pub azp: Option<String>,
    /// Expiry, Unix seconds.
    pub exp: u64,
    /// Issued-at, Unix seconds.
    #[serde(default)]
    pub iat: Option<u64>,
}

/// Verifies Clerk session JWTs with the instance's PEM public key.
pub struct ClerkSessionVerifier {
    key: DecodingKey,
    authorized_parties: Vec<String>,
    validation: Validation,
}

impl std::fmt::Debug for ClerkSessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClerkSessionVerifier")
            .field("authorized_parties", &self.authorized_parties)
            .finish_non_exhaustive()
    }
}

impl ClerkSessionVerifier {
    /// Build a verifier from the PEM public key (`CLERK_JWT_KEY`).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::KeyConfig`] if the PEM cannot be parsed.
    pub fn from_pem(public_key_pem: &str) -> Result<Self, SessionError> {
        let pem = public_key_pem.replace("\\n", "\n");
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            SessionError::KeyConfig {
                reason: e.to_string(),
            }
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = VERIFY_LEEWAY_SECS;
        validation.validate_nbf = true;
        // Session tokens carry no audience.
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            key,
            authorized_parties: Vec::new(),
            validation,
        })
    }

    /// Restrict accepted tokens to those whose `azp` is in `parties`.
    /// An empty list disables the check.
    #[must_use]
    pub fn with_authorized_parties(mut self, parties: Vec<String>) -> Self {
        self.authorized_parties = parties;
        self
    }

    /// Decode and validate a session token without converting the subject.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Missing`] for an empty token.
    /// - [`SessionError::Expired`] past `exp`.
    /// - [`SessionError::UnauthorizedParty`] when `azp` is not allowed.
    /// - [`SessionError::Invalid`] for any other failure.
    pub fn decode(&self, session_token: &str) -> Result<SessionClaims, SessionError> {
        if session_token.is_empty() {
            return Err(SessionError::Missing);
        }

        let claims = jsonwebtoken::decode::<SessionClaims>(session_token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid {
                    reason: e.to_string(),
                },
            })?;

        if !self.authorized_parties.is_empty() {
            let azp = claims.azp.clone().unwrap_or_default();
            if !self.authorized_parties.iter().any(|p| *p == azp) {
                return Err(SessionError::UnauthorizedParty { azp });
            }
        }

        Ok(claims)
    }
}

#[async_trait]
impl SessionVerifier for ClerkSessionVerifier {
    async fn verify(&self, session_token: &str) -> Result<SubjectId, SessionError> {
        let claims = self.decode(session_token)?;
        Ok(SubjectId::new(claims.sub)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    use super::*;
    use crate::signer::test_keys::{CLERK_PRIVATE, CLERK_PUBLIC, OTHER_PRIVATE};
    use crate::signer::unix_now;

    fn session_token(key_pem: &str, payload: &serde_json::Value) -> String {
        let key = EncodingKey::from_rsa_pem(key_pem.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), payload, &key).unwrap()
    }

    fn live_payload(sub: &str) -> serde_json::Value {
        let now = unix_now();
        json!({
            "sub": sub,
            "sid": "sess_1",
            "azp": "http://localhost:3000",
            "iat": now,
            "nbf": now - 10,
            "exp": now + 60,
        })
    }

    fn verifier() -> ClerkSessionVerifier {
        ClerkSessionVerifier::from_pem(CLERK_PUBLIC).unwrap()
    }

    #[tokio::test]
    async fn live_session_yields_subject() {
        let token = session_token(CLERK_PRIVATE, &live_payload("user_123"));
        let subject = verifier().verify(&token).await.unwrap();
        assert_eq!(subject.as_str(), "user_123");
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let mut payload = live_payload("user_123");
        payload["exp"] = json!(unix_now() - 600);
        let token = session_token(CLERK_PRIVATE, &payload);
        assert!(matches!(
            verifier().verify(&token).await,
            Err(SessionError::Expired)
        ));
    }

    #[tokio::test]
    async fn token_signed_by_other_key_is_rejected() {
        let token = session_token(OTHER_PRIVATE, &live_payload("user_123"));
        assert!(matches!(
            verifier().verify(&token).await,
            Err(SessionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn empty_and_garbage_tokens_are_rejected() {
        assert!(matches!(
            verifier().verify("").await,
            Err(SessionError::Missing)
        ));
        assert!(matches!(
            verifier().verify("not.a.jwt").await,
            Err(SessionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let token = session_token(CLERK_PRIVATE, &live_payload(""));
        assert!(matches!(
            verifier().verify(&token).await,
            Err(SessionError::Subject(_))
        ));
    }

    #[tokio::test]
    async fn authorized_parties_are_enforced() {
        let token = session_token(CLERK_PRIVATE, &live_payload("user_123"));

        let allowed = verifier().with_authorized_parties(vec!["http://localhost:3000".to_owned()]);
        assert!(allowed.verify(&token).await.is_ok());

        let denied = verifier().with_authorized_parties(vec!["https://nopass.app".to_owned()]);
        assert!(matches!(
            denied.verify(&token).await,
            Err(SessionError::UnauthorizedParty { azp }) if azp == "http://localhost:3000"
        ));
    }

    #[test]
    fn bad_key_is_a_config_error() {
        assert!(matches!(
            ClerkSessionVerifier::from_pem("nope"),
            Err(SessionError::KeyConfig { .. })
        ));
    }
}
