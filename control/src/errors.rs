//! Error types for the Shipyard control plane

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openapi_server::models::ErrorBody;
use thiserror::Error;

/// Main error type for the control plane
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Deployment error: {0}")]
    DeployError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControlError {
    pub fn not_found(kind: &str, id: impl std::fmt::Display) -> Self {
        ControlError::NotFound(format!("{} {} not found", kind, id))
    }

    /// Error for an external call that exceeded its time bound
    pub fn timeout(operation: &str, after: std::time::Duration) -> Self {
        ControlError::Internal(format!("{} timed out after {:?}", operation, after))
    }

    /// HTTP status this error maps to
    pub fn status(&self) -> StatusCode {
        match self {
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Conflict(_) => StatusCode::CONFLICT,
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::Gone(_) => StatusCode::GONE,
            ControlError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ControlError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ControlError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ControlError::JsonError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::NotFound(_) => "NOT_FOUND",
            ControlError::Conflict(_) => "CONFLICT",
            ControlError::BadRequest(_) | ControlError::JsonError(_) => "BAD_REQUEST",
            ControlError::Gone(_) => "GONE",
            ControlError::Unauthorized(_) => "UNAUTHORIZED",
            ControlError::TooManyRequests(_) => "TOO_MANY_REQUESTS",
            ControlError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            _ => "INTERNAL",
        }
    }
}

impl From<anyhow::Error> for ControlError {
    fn from(err: anyhow::Error) -> Self {
        ControlError::Internal(err.to_string())
    }
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
