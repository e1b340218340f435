//! Application-wide error types.
//!
//! Handlers return `Result<_, AppError>`; the [`IntoResponse`] impl renders
//! every variant in the XRPC error shape `{ "error": ..., "message": ... }`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::lexicon::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    /// An upstream XRPC / HTTP call failed.
    #[error("upstream error: {0}")]
    Xrpc(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("oauth error: {0}")]
    OAuth(String),

    /// Stored tokens could not be refreshed; the user has to log in again.
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid record: {0}")]
    Validation(ValidationErrors),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// XRPC error code and HTTP status for this error.
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) | AppError::Logger(_) | AppError::Store(_) | AppError::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError")
            }
            AppError::Xrpc(_) => (StatusCode::BAD_GATEWAY, "UpstreamFailure"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            AppError::OAuth(_) => (StatusCode::BAD_REQUEST, "OAuthError"),
            AppError::TokenRefresh(_) => (StatusCode::UNAUTHORIZED, "ExpiredToken"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "AuthenticationRequired"),
            AppError::InvalidRequest(_) | AppError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest")
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = match &self {
            AppError::Validation(errors) => json!({
                "error": code,
                "message": self.to_string(),
                "errors": errors.as_slice(),
            }),
            _ => json!({ "error": code, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Xrpc(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Store(e.to_string())
    }
}
