// src/error.rs
// Error taxonomy for the relay

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

/// Main error type for the Pentad library
#[derive(Error, Debug)]
pub enum PentadError {
    /// Network or provider failure opening or reading an upstream stream
    #[error("upstream connection error: {0}")]
    UpstreamConnection(String),

    /// Malformed or unexpected response framing from the provider
    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("document extraction failed: {0}")]
    Extraction(String),

    #[error("upload error: {0}")]
    Upload(String),

    #[error("token budget exhausted")]
    BudgetExhausted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenience type alias for Result using PentadError
pub type Result<T> = std::result::Result<T, PentadError>;

impl PentadError {
    /// Whether this error is scoped to a single persona's upstream call
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PentadError::UpstreamConnection(_)
                | PentadError::UpstreamProtocol(_)
                | PentadError::Http(_)
        )
    }

    /// HTTP status used when this error is reported synchronously to a caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            PentadError::InvalidInput(_) | PentadError::Upload(_) | PentadError::Extraction(_) => {
                StatusCode::BAD_REQUEST
            }
            PentadError::BudgetExhausted => StatusCode::TOO_MANY_REQUESTS,
            PentadError::UpstreamConnection(_)
            | PentadError::UpstreamProtocol(_)
            | PentadError::Http(_) => StatusCode::BAD_GATEWAY,
            PentadError::Config(_) | PentadError::Io(_) | PentadError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PentadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
