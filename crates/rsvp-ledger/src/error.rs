//! Error types for the RSVP ledger.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised while validating credentials or updating a workshop ledger.
#[derive(Debug, Error)]
pub enum RsvpError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Credential not found in roster")]
    InvalidCredential,

    #[error("Concurrent write detected for workshop {workshop_id}")]
    StorageConflict { workshop_id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Roster unavailable: {0}")]
    RosterUnavailable(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RsvpError {
    /// Whether re-running the dedup-check-and-append unit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RsvpError::StorageConflict { .. })
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for RsvpError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RsvpError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "MALFORMED_REQUEST"),
            RsvpError::InvalidCredential => (StatusCode::FORBIDDEN, "INVALID_CREDENTIAL"),
            RsvpError::StorageConflict { .. } => (StatusCode::CONFLICT, "STORAGE_CONFLICT"),
            RsvpError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            RsvpError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCRYPTION_ERROR"),
            RsvpError::RosterUnavailable(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ROSTER_UNAVAILABLE")
            }
            RsvpError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            RsvpError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for RsvpError {
    fn from(e: std::io::Error) -> Self {
        RsvpError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RsvpError {
    fn from(e: serde_json::Error) -> Self {
        RsvpError::Storage(format!("JSON serialization error: {}", e))
    }
}

impl From<aes_gcm::Error> for RsvpError {
    fn from(_: aes_gcm::Error) -> Self {
        RsvpError::Encryption("AES-GCM encryption/decryption failed".to_string())
    }
}
