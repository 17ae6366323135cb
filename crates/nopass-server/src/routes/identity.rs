//! Client surface of the self-hosted directory: `/identity/v1/*`.
//!
//! - `POST /accounts:signInWithCustomToken` with `{token}`
//! - `POST /token` with `{refreshToken}`
//!
//! Both answer `{idToken, refreshToken, expiresIn, localId}`. A rejected
//! credential is a 401, an unreadable body keeps axum's 4xx status but gets
//! the usual `{"error": ...}` body. With a remote directory these routes are
//! 404.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use nopass_core::LocalDirectory;
use nopass_core::local_directory::SignInResponse;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/identity/v1` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts:signInWithCustomToken", post(sign_in_with_custom_token))
        .route("/token", post(refresh))
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

fn local(state: &AppState) -> Result<&LocalDirectory, AppError> {
    state.local_directory.as_deref().ok_or(AppError::NotFound)
}

/// Exchange a custom token for an ID token.
async fn sign_in_with_custom_token(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, AppError> {
    let Json(body) = body?;
    let response = local(&state)?
        .sign_in_with_custom_token(&body.token)
        .await
        .inspect_err(|e| info!(reason = %e, "custom token sign-in rejected"))?;
    Ok(Json(response))
}

/// Exchange a refresh token for a fresh ID token.
async fn refresh(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<SignInResponse>, AppError> {
    let Json(body) = body?;
    let response = local(&state)?
        .refresh(&body.refresh_token)
        .await
        .inspect_err(|e| info!(reason = %e, "refresh rejected"))?;
    Ok(Json(response))
}
