//! Error types for the identity provider.
//!
//! [`IdpError`] implements [`axum::response::IntoResponse`] so handlers can
//! return `Result<…, IdpError>` directly.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use grantauth_models::ModelError;
use serde_json::json;

/// Errors that can occur while issuing challenges or credentials.
#[derive(Debug, thiserror::Error)]
pub enum IdpError {
    /// The identity in the request is not usable.
    #[error("invalid identity: {0}")]
    InvalidIdentity(#[from] ModelError),

    /// No outstanding challenge for this identity (never issued, already
    /// used, or expired).
    #[error("no outstanding challenge for {0}")]
    NoChallenge(String),

    /// The signature does not verify against the identity's key.
    #[error("signature does not match identity {0}")]
    InvalidSignature(String),

    /// Signing the session token failed.
    #[error("token signing failed: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),
}

impl IntoResponse for IdpError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidIdentity(_) => StatusCode::BAD_REQUEST,
            Self::NoChallenge(_) | Self::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            Self::TokenSigning(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.to_string();

        tracing::warn!(%status, error = %message, "request failed");
        (status, Json(json!({ "error": message }))).into_response()
    }
}
