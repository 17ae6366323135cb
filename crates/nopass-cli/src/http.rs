//! HTTP implementations of the bridge's two client-side seams.
//!
//! [`HttpBridgeApi`] calls the server's `/api/*` routes presenting the
//! primary session as the `__session` cookie, the way a same-origin browser
//! does. [`HttpSecondaryAuth`] signs in through the server's
//! `/identity/v1/*` routes and keeps the resulting credentials in memory.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::debug;

use nopass_core::bridge::{
    BridgeApi, ClaimsResponse, CredentialStore, SecondaryAuth, TokenResponse,
};
use nopass_core::error::BridgeError;
use nopass_core::local_directory::SignInResponse;

/// Plain JSON client for the informational commands.
pub struct Client {
    http: reqwest::Client,
    addr: String,
    session: Option<String>,
}

impl Client {
    pub fn new(addr: &str, session: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            addr: addr.trim_end_matches('/').to_owned(),
            session,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    fn session_post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.http.post(self.url(path));
        match &self.session {
            Some(session) => request.header(reqwest::header::COOKIE, format!("__session={session}")),
            None => request,
        }
    }

    /// POST with the session cookie and no body.
    pub async fn post_with_session(&self, path: &str) -> Result<Value> {
        let resp = self
            .session_post(path)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    if status == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("server returned {status}: {body}");
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

fn transport(err: &reqwest::Error) -> BridgeError {
    BridgeError::Transport {
        reason: err.to_string(),
    }
}

/// Read a route's JSON body whatever the status. Error statuses carry
/// `{"error": ...}`; a body that is not JSON becomes an error string.
async fn read_body<T: DeserializeOwned>(
    resp: reqwest::Response,
    wrap_error: impl FnOnce(String) -> T,
) -> Result<T, BridgeError> {
    let status = resp.status();
    debug!(url = %resp.url(), %status, "bridge route answered");
    let text = resp.text().await.map_err(|e| transport(&e))?;
    match serde_json::from_str::<T>(&text) {
        Ok(body) => Ok(body),
        Err(_) if status.is_success() => Err(BridgeError::Transport {
            reason: format!("malformed response body ({status})"),
        }),
        Err(_) => Ok(wrap_error(format!("HTTP {status}"))),
    }
}

/// [`BridgeApi`] over the server's HTTP routes.
pub struct HttpBridgeApi {
    client: Client,
}

impl HttpBridgeApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn post(&self, path: &str) -> Result<reqwest::Response, BridgeError> {
        self.client
            .session_post(path)
            .send()
            .await
            .map_err(|e| transport(&e))
    }
}

#[async_trait]
impl BridgeApi for HttpBridgeApi {
    async fn request_custom_token(&self) -> Result<TokenResponse, BridgeError> {
        let resp = self.post("/api/firebase-token").await?;
        read_body(resp, |error| TokenResponse {
            error: Some(error),
            ..TokenResponse::default()
        })
        .await
    }

    async fn sync_custom_claims(&self) -> Result<ClaimsResponse, BridgeError> {
        let resp = self.post("/api/setFirebaseCustomClaims").await?;
        read_body(resp, |error| ClaimsResponse {
            success: None,
            error: Some(error),
        })
        .await
    }
}

/// [`SecondaryAuth`] against the server's `/identity/v1` routes.
pub struct HttpSecondaryAuth {
    http: reqwest::Client,
    base: String,
    credentials: CredentialStore,
}

impl HttpSecondaryAuth {
    pub fn new(addr: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("{}/identity/v1", addr.trim_end_matches('/')),
            credentials: CredentialStore::new(),
        }
    }

    async fn exchange(&self, path: &str, body: Value) -> Result<SignInResponse, String> {
        let resp = self
            .http
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        debug!(path, %status, "identity route answered");
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {text}"));
        }
        resp.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SecondaryAuth for HttpSecondaryAuth {
    async fn sign_in_with_custom_token(&self, custom_token: &str) -> Result<String, BridgeError> {
        let response = self
            .exchange(
                "/accounts:signInWithCustomToken",
                json!({ "token": custom_token }),
            )
            .await
            .map_err(|reason| BridgeError::SignIn { reason })?;
        Ok(self.credentials.store(response.into()))
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, BridgeError> {
        let current = self.credentials.current()?;
        if !force_refresh {
            return Ok(current.id_token);
        }
        let response = self
            .exchange("/token", json!({ "refreshToken": current.refresh_token }))
            .await
            .map_err(|reason| BridgeError::Refresh { reason })?;
        let id_token = response.id_token.clone();
        self.credentials.store(response.into());
        Ok(id_token)
    }

    fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.credentials.subscribe()
    }
}
