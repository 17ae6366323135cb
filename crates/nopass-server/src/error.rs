//! HTTP error types for the No Pass server.
//!
//! Every failure collapses into one of a few fixed JSON bodies of the form
//! `{"error": "..."}`. Internal detail is logged, never returned.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{debug, error};

use nopass_core::error::{DirectoryError, ServiceError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// No verified session, or a rejected credential.
    Unauthorized,
    /// The route is not served in this configuration.
    NotFound,
    /// The request body could not be read; `status` is the 4xx to answer.
    Rejected { status: StatusCode, reason: String },
    /// A remote or storage call failed. The message is only logged.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Self::NotFound => (StatusCode::NOT_FOUND, "Not Found"),
            Self::Rejected { status, reason } => {
                debug!(%status, %reason, "request body rejected");
                (status, status.canonical_reason().unwrap_or("Bad Request"))
            }
            Self::Internal(msg) => {
                error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        (status, axum::Json(ErrorBody { error })).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unauthorized => Self::Unauthorized,
            ServiceError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected {
            status: rejection.status(),
            reason: rejection.body_text(),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidCredential { .. }
            | DirectoryError::Subject(_)
            | DirectoryError::UserNotFound { .. } => Self::Unauthorized,

            DirectoryError::ReservedClaim { .. }
            | DirectoryError::ClaimsTooLarge { .. }
            | DirectoryError::Signer(_)
            | DirectoryError::Storage(_)
            | DirectoryError::Serialization { .. }
            | DirectoryError::Remote { .. } => Self::Internal(err.to_string()),
        }
    }
}
