use crate::services::{blob_store::BlobStoreError, validator::Rejection};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Why a single upload did not produce a stored object.
///
/// Each variant stays scoped to its own item; none of them fails a batch.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Payload was not valid base64 or the item was malformed.
    #[error("decoding error: {0}")]
    Decoding(String),
    /// Payload decoded but violated size or type policy.
    #[error("validation error: {0}")]
    Validation(#[from] Rejection),
    /// The blob store refused or failed the write.
    #[error("storage error: {0}")]
    Storage(#[from] BlobStoreError),
    #[error("upload cancelled before completion")]
    Cancelled,
    #[error("upload task terminated unexpectedly")]
    Aborted,
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::Decoding(_) | UploadError::Validation(_) => StatusCode::BAD_REQUEST,
            UploadError::Storage(_) => StatusCode::BAD_GATEWAY,
            UploadError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            UploadError::Aborted => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for request-level errors that keeps the message local.
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

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
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
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        AppError::new(err.status(), err.to_string())
    }
}
