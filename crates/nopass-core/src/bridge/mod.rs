//! Client Bridge: primary session → secondary sign-in → claims sync.
//!
//! The bridge walks one attempt through
//!
//! ```text
//! Idle → AwaitingPrimarySession → MintRequested → SignedIntoSecondary
//!      → ClaimsSyncRequested → Complete
//! ```
//!
//! and absorbs any transport or API failure into `Failed`. Failures are
//! logged and recorded in the [`BridgeOutcome`]; nothing is retried. The
//! current state and outcome are published on watch channels so a host can
//! observe them.
//!
//! Attempts are not de-duplicated. [`ClientBridge::spawn`] starts a fresh
//! attempt for every primary-session value it sees, and concurrent attempts
//! for the same subject converge because every attempt writes the same
//! claims.

mod credentials;
pub mod local;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use credentials::{CredentialStore, SecondarySession};

use crate::error::BridgeError;

/// What the primary provider currently reports about the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimarySession {
    /// The provider has finished resolving the session.
    pub is_loaded: bool,
    /// Subject of the signed-in user, if any.
    pub user_id: Option<String>,
}

impl PrimarySession {
    /// Session still resolving.
    #[must_use]
    pub fn loading() -> Self {
        Self::default()
    }

    /// Resolved, nobody signed in.
    #[must_use]
    pub fn signed_out() -> Self {
        Self {
            is_loaded: true,
            user_id: None,
        }
    }

    /// Resolved with a signed-in user.
    #[must_use]
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            is_loaded: true,
            user_id: Some(user_id.into()),
        }
    }

    fn ready_subject(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .filter(|uid| self.is_loaded && !uid.is_empty())
    }
}

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Idle,
    AwaitingPrimarySession,
    MintRequested,
    SignedIntoSecondary,
    ClaimsSyncRequested,
    Complete,
    Failed,
}

/// Result of the most recent attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// No attempt has finished.
    Pending,
    /// Signed into the secondary system. `claims_synced` reports whether the
    /// claims endpoint acknowledged the write; the flow completes either way.
    Succeeded { uid: String, claims_synced: bool },
    /// The attempt stopped at `stage`.
    Failed { stage: BridgeState, reason: BridgeError },
}

/// Body of the token endpoint, success or error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    #[serde(default)]
    pub firebase_token: Option<String>,
    #[serde(default)]
    pub firebase_uid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of the claims endpoint, success or error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// The server routes as seen from the client, authenticated by whatever
/// primary session the implementation carries.
///
/// Error statuses are not errors here: they come back as response bodies
/// with `error` set. Only a request that produced no response is an `Err`.
#[async_trait]
pub trait BridgeApi: Send + Sync {
    /// Call the Token Minter route.
    async fn request_custom_token(&self) -> Result<TokenResponse, BridgeError>;

    /// Call the Claims Synchronizer route.
    async fn sync_custom_claims(&self) -> Result<ClaimsResponse, BridgeError>;
}

/// Client surface of the secondary identity system.
#[async_trait]
pub trait SecondaryAuth: Send + Sync {
    /// Sign in with a custom token; returns the signed-in uid.
    async fn sign_in_with_custom_token(&self, custom_token: &str) -> Result<String, BridgeError>;

    /// Current ID token. With `force_refresh` a new one is fetched so claims
    /// written since sign-in become visible.
    async fn id_token(&self, force_refresh: bool) -> Result<String, BridgeError>;

    /// Watch the signed-in uid.
    fn subscribe(&self) -> watch::Receiver<Option<String>>;
}

/// Orchestrates bridge attempts against a [`BridgeApi`] and a
/// [`SecondaryAuth`] client.
pub struct ClientBridge {
    api: Arc<dyn BridgeApi>,
    auth: Arc<dyn SecondaryAuth>,
    state: watch::Sender<BridgeState>,
    outcome: watch::Sender<BridgeOutcome>,
}

impl std::fmt::Debug for ClientBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBridge")
            .field("state", &*self.state.borrow())
            .field("outcome", &*self.outcome.borrow())
            .finish_non_exhaustive()
    }
}

impl ClientBridge {
    #[must_use]
    pub fn new(api: Arc<dyn BridgeApi>, auth: Arc<dyn SecondaryAuth>) -> Self {
        Self {
            api,
            auth,
            state: watch::Sender::new(BridgeState::Idle),
            outcome: watch::Sender::new(BridgeOutcome::Pending),
        }
    }

    /// Observe state transitions.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Observe attempt outcomes.
    #[must_use]
    pub fn outcome(&self) -> watch::Receiver<BridgeOutcome> {
        self.outcome.subscribe()
    }

    fn enter(&self, state: BridgeState) {
        debug!(?state, "bridge state");
        self.state.send_replace(state);
    }

    fn fail(&self, stage: BridgeState, reason: BridgeError) -> BridgeOutcome {
        error!(?stage, error = %reason, "error during secondary sign-in");
        self.enter(BridgeState::Failed);
        let outcome = BridgeOutcome::Failed { stage, reason };
        self.outcome.send_replace(outcome.clone());
        outcome
    }

    /// Run one attempt for `session`.
    ///
    /// Returns [`BridgeOutcome::Pending`] without any network call if the
    /// session is still loading or signed out.
    pub async fn run(&self, session: &PrimarySession) -> BridgeOutcome {
        self.enter(BridgeState::AwaitingPrimarySession);
        self.outcome.send_replace(BridgeOutcome::Pending);

        info!(
            is_loaded = session.is_loaded,
            user_id = session.user_id.as_deref().unwrap_or_default(),
            "primary session state"
        );
        if session.ready_subject().is_none() {
            info!("primary session not ready; skipping secondary sign-in");
            return BridgeOutcome::Pending;
        }

        self.enter(BridgeState::MintRequested);
        let minted = match self.api.request_custom_token().await {
            Ok(response) => response,
            Err(e) => return self.fail(BridgeState::MintRequested, e),
        };
        info!(
            firebase_uid = minted.firebase_uid.as_deref().unwrap_or_default(),
            has_token = minted.firebase_token.is_some(),
            error = minted.error.as_deref().unwrap_or_default(),
            "response from token endpoint"
        );
        let Some(custom_token) = minted.firebase_token.filter(|t| !t.is_empty()) else {
            let detail = minted
                .error
                .unwrap_or_else(|| "response carried no token".to_owned());
            warn!(%detail, "no custom token received");
            return self.fail(
                BridgeState::MintRequested,
                BridgeError::MissingToken { detail },
            );
        };

        let uid = match self.auth.sign_in_with_custom_token(&custom_token).await {
            Ok(uid) => uid,
            Err(e) => return self.fail(BridgeState::MintRequested, e),
        };
        if let Err(e) = self.auth.id_token(true).await {
            return self.fail(BridgeState::MintRequested, e);
        }
        self.enter(BridgeState::SignedIntoSecondary);
        info!(uid = %uid, "secondary sign-in successful");

        self.enter(BridgeState::ClaimsSyncRequested);
        let ack = match self.api.sync_custom_claims().await {
            Ok(response) => response,
            Err(e) => return self.fail(BridgeState::ClaimsSyncRequested, e),
        };
        info!(
            success = ack.success.unwrap_or(false),
            error = ack.error.as_deref().unwrap_or_default(),
            "response from claims endpoint"
        );

        self.enter(BridgeState::Complete);
        let outcome = BridgeOutcome::Succeeded {
            uid,
            claims_synced: ack.success == Some(true),
        };
        self.outcome.send_replace(outcome.clone());
        outcome
    }

    /// Run an attempt for the current session and for every later change,
    /// each in its own task. Ends when the session sender is dropped.
    pub fn spawn(self: Arc<Self>, mut sessions: watch::Receiver<PrimarySession>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                let bridge = Arc::clone(&self);
                tokio::spawn(async move {
                    bridge.run(&session).await;
                });
                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

/// Log every change of the secondary client's signed-in user until the
/// client is dropped.
pub fn spawn_auth_state_logger(auth: &dyn SecondaryAuth) -> JoinHandle<()> {
    let mut users = auth.subscribe();
    tokio::spawn(async move {
        loop {
            match users.borrow_and_update().as_deref() {
                Some(uid) => info!(uid, "secondary user signed in"),
                None => info!("no secondary user signed in"),
            }
            if users.changed().await.is_err() {
                break;
            }
        }
    })
}
