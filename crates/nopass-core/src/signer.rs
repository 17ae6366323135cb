//! Service-account token signing.
//!
//! The secondary identity system authenticates custom tokens by their RS256
//! signature from a service-account private key. Minting happens entirely
//! locally; no network call is involved. The same signer also issues and
//! verifies the self-hosted directory's ID tokens when a public key is
//! configured.
//!
//! Custom token layout:
//!
//! ```text
//! header  { alg: RS256, typ: JWT }
//! payload { iss: <client_email>, sub: <client_email>,
//!           aud: <IDENTITY_TOOLKIT_AUDIENCE>, iat, exp: iat + 3600,
//!           uid: <subject>, jti: <random>, claims?: {...} }
//! ```

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::directory::CustomClaims;
use crate::error::SignerError;
use crate::subject::SubjectId;

/// Audience every custom token must carry.
pub const IDENTITY_TOOLKIT_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Lifetime of a minted custom token, in seconds. The secondary system
/// rejects custom tokens with a longer lifetime.
pub const CUSTOM_TOKEN_TTL_SECS: i64 = 3600;

/// Clock skew tolerated when verifying tokens, in seconds.
pub const VERIFY_LEEWAY_SECS: u64 = 5;

/// Service-account credentials for the secondary identity system.
#[derive(Clone)]
pub struct ServiceAccount {
    /// Project the account belongs to.
    pub project_id: String,
    /// Service-account email; issuer and subject of custom tokens.
    pub client_email: String,
    private_key_pem: Zeroizing<String>,
}

impl ServiceAccount {
    /// Build a service account from its three credential fields.
    ///
    /// Environment files usually carry the PEM on one line with literal `\n`
    /// escapes; those are turned back into newlines here.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        client_email: impl Into<String>,
        private_key_pem: &str,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            client_email: client_email.into(),
            private_key_pem: Zeroizing::new(private_key_pem.replace("\\n", "\n")),
        }
    }

    /// The PEM-encoded private key.
    #[must_use]
    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_pem", &"[redacted]")
            .finish()
    }
}

/// Payload of a custom token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub uid: String,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<CustomClaims>,
}

/// Signs (and optionally verifies) RS256 tokens with a service-account key.
pub struct TokenSigner {
    account: ServiceAccount,
    encoding_key: EncodingKey,
    decoding_key: Option<DecodingKey>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("account", &self.account)
            .field("can_verify", &self.decoding_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn map_verify_error(err: &jsonwebtoken::errors::Error) -> SignerError {
    match err.kind() {
        ErrorKind::ExpiredSignature => SignerError::Expired,
        _ => SignerError::Invalid {
            reason: err.to_string(),
        },
    }
}

impl TokenSigner {
    /// Create a signer from service-account credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the private key is not a valid
    /// RSA PEM.
    pub fn new(account: ServiceAccount) -> Result<Self, SignerError> {
        let encoding_key =
            EncodingKey::from_rsa_pem(account.private_key_pem().as_bytes()).map_err(|e| {
                SignerError::InvalidKey {
                    kind: "private",
                    reason: e.to_string(),
                }
            })?;
        Ok(Self {
            account,
            encoding_key,
            decoding_key: None,
        })
    }

    /// Attach the public half of the key so this signer can verify its own
    /// tokens.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the PEM is not an RSA public key.
    pub fn with_public_key(mut self, public_key_pem: &str) -> Result<Self, SignerError> {
        let pem = public_key_pem.replace("\\n", "\n");
        let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            SignerError::InvalidKey {
                kind: "public",
                reason: e.to_string(),
            }
        })?;
        self.decoding_key = Some(key);
        Ok(self)
    }

    /// The service account this signer acts for.
    #[must_use]
    pub fn account(&self) -> &ServiceAccount {
        &self.account
    }

    /// Whether [`verify`](Self::verify) can be used.
    #[must_use]
    pub fn can_verify(&self) -> bool {
        self.decoding_key.is_some()
    }

    /// Sign arbitrary claims as an RS256 JWT.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signing`] if encoding fails.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, SignerError> {
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), claims, &self.encoding_key).map_err(
            |e| SignerError::Signing {
                reason: e.to_string(),
            },
        )
    }

    /// Verify an RS256 JWT signed by this account's key.
    ///
    /// # Errors
    ///
    /// - [`SignerError::MissingVerificationKey`] if no public key is attached.
    /// - [`SignerError::Expired`] if the token is past `exp`.
    /// - [`SignerError::Invalid`] for any other validation failure.
    pub fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<T, SignerError> {
        let key = self
            .decoding_key
            .as_ref()
            .ok_or(SignerError::MissingVerificationKey)?;
        jsonwebtoken::decode::<T>(token, key, validation)
            .map(|data| data.claims)
            .map_err(|e| map_verify_error(&e))
    }

    /// Mint a custom token for `uid`, optionally embedding developer claims.
    ///
    /// Every call produces a distinct token (fresh `jti`), all mapping to the
    /// same uid.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Signing`] if encoding fails.
    pub fn custom_token(
        &self,
        uid: &SubjectId,
        developer_claims: Option<CustomClaims>,
    ) -> Result<String, SignerError> {
        let iat = unix_now();
        let claims = CustomTokenClaims {
            iss: self.account.client_email.clone(),
            sub: self.account.client_email.clone(),
            aud: IDENTITY_TOOLKIT_AUDIENCE.to_owned(),
            iat,
            exp: iat.saturating_add(CUSTOM_TOKEN_TTL_SECS),
            uid: uid.as_str().to_owned(),
            jti: uuid::Uuid::new_v4().simple().to_string(),
            claims: developer_claims,
        };
        self.sign(&claims)
    }

    /// Verify a custom token minted by this account.
    ///
    /// # Errors
    ///
    /// See [`verify`](Self::verify).
    pub fn verify_custom_token(&self, token: &str) -> Result<CustomTokenClaims, SignerError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = VERIFY_LEEWAY_SECS;
        validation.set_audience(&[IDENTITY_TOOLKIT_AUDIENCE]);
        validation.set_issuer(&[self.account.client_email.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        self.verify(token, &validation)
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_keys::*;
    use super::*;

    fn uid(s: &str) -> SubjectId {
        SubjectId::new(s).unwrap()
    }

    #[test]
    fn custom_token_carries_expected_claims() {
        let signer = signer();
        let token = signer.custom_token(&uid("user_123"), None).unwrap();
        let claims = signer.verify_custom_token(&token).unwrap();

        assert_eq!(claims.uid, "user_123");
        assert_eq!(claims.aud, IDENTITY_TOOLKIT_AUDIENCE);
        assert_eq!(claims.iss, signer.account().client_email);
        assert_eq!(claims.sub, signer.account().client_email);
        assert_eq!(claims.exp - claims.iat, CUSTOM_TOKEN_TTL_SECS);
        assert!(claims.claims.is_none());
    }

    #[test]
    fn successive_mints_differ_but_share_uid() {
        let signer = signer();
        let first = signer.custom_token(&uid("user_123"), None).unwrap();
        let second = signer.custom_token(&uid("user_123"), None).unwrap();
        assert_ne!(first, second);

        let a = signer.verify_custom_token(&first).unwrap();
        let b = signer.verify_custom_token(&second).unwrap();
        assert_eq!(a.uid, b.uid);
    }

    #[test]
    fn token_from_another_key_is_rejected() {
        let forged = TokenSigner::new(ServiceAccount::new(
            "nopass-test",
            "firebase-adminsdk@nopass-test.iam.gserviceaccount.com",
            OTHER_PRIVATE,
        ))
        .unwrap()
        .custom_token(&uid("user_123"), None)
        .unwrap();

        let result = signer().verify_custom_token(&forged);
        assert!(matches!(result, Err(SignerError::Invalid { .. })));
    }

    #[test]
    fn expired_custom_token_is_rejected() {
        let signer = signer();
        let now = unix_now();
        let stale = CustomTokenClaims {
            iss: signer.account().client_email.clone(),
            sub: signer.account().client_email.clone(),
            aud: IDENTITY_TOOLKIT_AUDIENCE.to_owned(),
            iat: now - 7200,
            exp: now - 3600,
            uid: "user_123".to_owned(),
            jti: "stale".to_owned(),
            claims: None,
        };
        let token = signer.sign(&stale).unwrap();
        assert!(matches!(
            signer.verify_custom_token(&token),
            Err(SignerError::Expired)
        ));
    }

    #[test]
    fn verification_requires_public_key() {
        let signer = TokenSigner::new(service_account()).unwrap();
        assert!(!signer.can_verify());
        let token = signer.custom_token(&uid("user_123"), None).unwrap();
        assert!(matches!(
            signer.verify_custom_token(&token),
            Err(SignerError::MissingVerificationKey)
        ));
    }

    #[test]
    fn escaped_newlines_in_private_key_are_restored() {
        let escaped = SERVICE_PRIVATE.replace('\n', "\\n");
        let account = ServiceAccount::new("p", "e@p.iam.gserviceaccount.com", &escaped);
        assert_eq!(account.private_key_pem(), SERVICE_PRIVATE);
        assert!(TokenSigner::new(account).is_ok());
    }

    #[test]
    fn debug_output_redacts_key() {
        let rendered = format!("{:?}", service_account());
        assert!(rendered.contains("[redacted]"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[test]
    fn garbage_key_is_rejected() {
        let account = ServiceAccount::new("p", "e", "not a pem");
        assert!(matches!(
            TokenSigner::new(account),
            Err(SignerError::InvalidKey { kind: "private", .. })
        ));
    }
}
