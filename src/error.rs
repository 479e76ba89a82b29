//! Error taxonomy for the catalog and its HTTP mapping.
//!
//! Every failure is terminal for the request that caused it. Internal errors
//! are logged with a correlation id and only the id reaches the client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Missing, expired or tampered credential.
    #[error("{0}")]
    Unauthenticated(String),

    /// Authenticated, but not allowed to touch this resource.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate rating, duplicate email, or a lost compare-and-swap race.
    #[error("{0}")]
    Conflict(String),

    /// Persistence or other unexpected failure.
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Result type for catalog operations.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code sent alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl From<surrealdb::Error> for AppError {
    fn from(err: surrealdb::Error) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Internal(err) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(%correlation_id, error = ?err, "request failed with internal error");
                json!({
                    "message": "internal server error",
                    "code": self.code(),
                    "correlationId": correlation_id.to_string(),
                })
            }
            other => {
                tracing::debug!(status = %status, error = %other, "request rejected");
                json!({
                    "message": other.to_string(),
                    "code": other.code(),
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
