//! Primary-session extraction.
//!
//! Same-origin browser requests carry the session in the `__session` cookie;
//! other clients send it as `Authorization: Bearer <token>`. The header wins
//! when both are present. Extraction never fails: a request without either
//! yields `SessionToken(None)` and the handler answers 401.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;

/// Name of the primary provider's session cookie.
pub const SESSION_COOKIE: &str = "__session";

/// The raw session token presented with a request, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken(pub Option<String>);

impl SessionToken {
    #[must_use]
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

fn bearer(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

fn cookie(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_owned())
        .filter(|t| !t.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for SessionToken {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(bearer(parts).or_else(|| cookie(parts))))
    }
}
