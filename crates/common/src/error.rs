use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Config(String),

    #[error("Datastore error: {0}")]
    Datastore(String),

    /// Service-account key material could not be imported. Never retriable.
    #[error("Crypto key import error: {0}")]
    CryptoKeyImport(String),

    #[error("Token exchange error: {0}")]
    TokenExchange(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Datastore(_)
            | AppError::CryptoKeyImport(_)
            | AppError::TokenExchange(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Invocation failed");
        }

        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
