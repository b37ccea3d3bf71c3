//! Server error type and HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main error type for API handlers
#[derive(Error, Debug)]
pub enum ServerError {
    /// The merger has not finished initializing
    #[error("Merger not initialized")]
    NotInitialized,

    /// Caller error: invalid input
    #[error("{0}")]
    BadRequest(String),

    /// Unknown resource
    #[error("{0}")]
    NotFound(String),

    /// Anything else
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for API handlers
pub type ServerResult<T> = Result<T, ServerError>;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<subfuse_jobs::JobError> for ServerError {
    fn from(err: subfuse_jobs::JobError) -> Self {
        match err {
            subfuse_jobs::JobError::NotFound(id) => {
                ServerError::NotFound(format!("Job not found: {}", id))
            }
            other => ServerError::Internal(other.to_string()),
        }
    }
}
