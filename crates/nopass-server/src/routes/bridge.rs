//! Bridge routes: `/api/firebase-token` and `/api/setFirebaseCustomClaims`.
//!
//! Neither route reads the request body; authorization comes from the
//! session alone.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use nopass_core::minter::MintedToken;
use nopass_core::service::ClaimsAck;

use super::session::SessionToken;
use crate::error::AppError;
use crate::state::AppState;

/// Build the `/api` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/firebase-token", post(firebase_token))
        .route("/setFirebaseCustomClaims", post(set_custom_claims))
}

/// Mint a custom token for the session's subject.
async fn firebase_token(
    State(state): State<Arc<AppState>>,
    session: SessionToken,
) -> Result<Json<MintedToken>, AppError> {
    Ok(Json(state.bridge.mint(session.as_deref()).await?))
}

/// Write `{clerkId}` onto the session subject's user record.
async fn set_custom_claims(
    State(state): State<Arc<AppState>>,
    session: SessionToken,
) -> Result<Json<ClaimsAck>, AppError> {
    Ok(Json(state.bridge.sync_claims(session.as_deref()).await?))
}
