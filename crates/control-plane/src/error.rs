//! Error types for the termination control plane.
//!
//! This module provides custom error types that implement `IntoResponse`
//! for seamless integration with Axum handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use termination_saga::SagaError;
use thiserror::Error;

/// Application-level errors for the control plane.
#[derive(Error, Debug)]
pub enum AppError {
    /// Not found error
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Metadata store error
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// The service cannot take the request right now
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Store(msg) => {
                tracing::warn!(error = %msg, "Store error");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<SagaError> for AppError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::Validation(msg) => AppError::Validation(msg),
            SagaError::NotFound(msg) => AppError::NotFound(msg),
            SagaError::Store(e) => AppError::Store(e.to_string()),
            e @ SagaError::ShuttingDown => AppError::Unavailable(e.to_string()),
            SagaError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termination_saga::StoreError;

    #[test]
    fn test_not_found_error() {
        let err = AppError::NotFound("Execution abc".to_string());
        assert_eq!(err.to_string(), "Resource not found: Execution abc");
    }

    #[test]
    fn test_saga_error_status_codes() {
        let cases = [
            (SagaError::Validation("bad id".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (SagaError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (
                SagaError::Store(StoreError::Unavailable("down".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (SagaError::Internal("broken".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (SagaError::ShuttingDown, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (err, status) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), status);
        }
    }
}
