//! Remote secondary identity system over the Identity Toolkit REST API.
//!
//! Custom tokens are still minted locally with the service-account key. Claim
//! writes and user lookups go to `accounts:update` / `accounts:lookup`,
//! authorized with an OAuth2 access token obtained through a JWT-bearer
//! assertion signed by the same key. The access token is cached until a
//! minute before it expires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use crate::directory::{CustomClaims, IdentityDirectory, UserRecord, validate_custom_claims};
use crate::error::DirectoryError;
use crate::signer::{TokenSigner, unix_now};
use crate::subject::SubjectId;

/// OAuth2 token endpoint for service-account assertions.
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Identity Toolkit v1 base URL.
pub const IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

const SCOPES: &str =
    "https://www.googleapis.com/auth/identitytoolkit https://www.googleapis.com/auth/cloud-platform";
const ASSERTION_TTL_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Claims of the OAuth2 JWT-bearer assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<RemoteUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteUser {
    local_id: String,
    #[serde(default)]
    custom_attributes: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    last_login_at: Option<String>,
}

fn remote(reason: impl Into<String>) -> DirectoryError {
    DirectoryError::Remote {
        reason: reason.into(),
    }
}

fn millis_to_datetime(millis: Option<&str>) -> Option<DateTime<Utc>> {
    let millis = millis?.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

impl TryFrom<RemoteUser> for UserRecord {
    type Error = DirectoryError;

    fn try_from(user: RemoteUser) -> Result<Self, Self::Error> {
        let custom_claims = match user.custom_attributes.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str::<CustomClaims>(raw)?,
            _ => CustomClaims::new(),
        };
        Ok(Self {
            uid: SubjectId::new(user.local_id)?,
            custom_claims,
            created_at: millis_to_datetime(user.created_at.as_deref()).unwrap_or_else(Utc::now),
            last_sign_in_at: millis_to_datetime(user.last_login_at.as_deref()),
        })
    }
}

async fn check_response(response: Response) -> Result<Response, DirectoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(remote(format!("HTTP {status}: {body}")))
}

/// Identity Toolkit-backed [`IdentityDirectory`].
pub struct IdentityToolkitDirectory {
    http: Client,
    signer: Arc<TokenSigner>,
    token_url: String,
    base_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for IdentityToolkitDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToolkitDirectory")
            .field("project_id", &self.signer.account().project_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl IdentityToolkitDirectory {
    /// Create a directory for the signer's project against the public
    /// Google endpoints.
    #[must_use]
    pub fn new(signer: Arc<TokenSigner>) -> Self {
        Self::with_endpoints(signer, OAUTH_TOKEN_URL, IDENTITY_TOOLKIT_BASE_URL)
    }

    /// Create a directory against custom endpoints (emulators, proxies).
    #[must_use]
    pub fn with_endpoints(
        signer: Arc<TokenSigner>,
        token_url: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            signer,
            token_url: token_url.into(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            cached: Mutex::new(None),
        }
    }

    fn assertion_claims(&self, now: i64) -> AssertionClaims {
        AssertionClaims {
            iss: self.signer.account().client_email.clone(),
            scope: SCOPES.to_owned(),
            aud: self.token_url.clone(),
            iat: now,
            exp: now.saturating_add(ASSERTION_TTL_SECS),
        }
    }

    fn accounts_url(&self, method: &str) -> String {
        format!(
            "{}/projects/{}/accounts:{method}",
            self.base_url,
            self.signer.account().project_id
        )
    }

    async fn access_token(&self) -> Result<String, DirectoryError> {
        let now = unix_now();
        let mut cache = self.cached.lock().await;
        if let Some(token) = cache
            .as_ref()
            .filter(|t| t.expires_at.saturating_sub(TOKEN_REFRESH_MARGIN_SECS) > now)
        {
            return Ok(token.access_token.clone());
        }

        let assertion = self.signer.sign(&self.assertion_claims(now))?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| remote(format!("token request failed: {e}")))?;
        let token: OAuthTokenResponse = check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| remote(format!("malformed token response: {e}")))?;

        debug!(expires_in = token.expires_in, "obtained identity toolkit access token");
        *cache = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: unix_now().saturating_add(token.expires_in),
        });
        Ok(token.access_token)
    }

    async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<Response, DirectoryError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.accounts_url(method))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| remote(format!("accounts:{method} failed: {e}")))?;
        check_response(response).await
    }
}

#[async_trait]
impl IdentityDirectory for IdentityToolkitDirectory {
    async fn create_custom_token(&self, uid: &SubjectId) -> Result<String, DirectoryError> {
        Ok(self.signer.custom_token(uid, None)?)
    }

    async fn set_custom_user_claims(
        &self,
        uid: &SubjectId,
        claims: CustomClaims,
    ) -> Result<(), DirectoryError> {
        validate_custom_claims(&claims)?;
        let attributes = serde_json::to_string(&claims)?;
        self.call(
            "update",
            &json!({ "localId": uid.as_str(), "customAttributes": attributes }),
        )
        .await?;
        Ok(())
    }

    async fn get_user(&self, uid: &SubjectId) -> Result<Option<UserRecord>, DirectoryError> {
        let response = self
            .call("lookup", &json!({ "localId": [uid.as_str()] }))
            .await?;
        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|e| remote(format!("malformed lookup response: {e}")))?;
        lookup
            .users
            .into_iter()
            .next()
            .map(UserRecord::try_from)
            .transpose()
    }
}
