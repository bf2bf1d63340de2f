use crate::services::{blob_store::BlobStoreError, dispatcher::DispatchError, presign::PresignError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        // Retryable failures surface as 503 so clients know to try again.
        let status = match &err {
            _ if err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &err {
            DispatchError::NotFound(_) => "Image not found".to_string(),
            DispatchError::Forbidden(_) => "You can only delete your own images".to_string(),
            other => other.to_string(),
        };
        AppError::new(status, message)
    }
}

impl From<PresignError> for AppError {
    fn from(err: PresignError) -> Self {
        AppError::new(StatusCode::FORBIDDEN, err.to_string())
    }
}

impl From<BlobStoreError> for AppError {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::NotFound(_) => AppError::not_found("Blob not found"),
            BlobStoreError::InvalidKey(_) => AppError::bad_request(err.to_string()),
            other => AppError::new(StatusCode::SERVICE_UNAVAILABLE, other.to_string()),
        }
    }
}
