//! Error types for the termination saga.
//!
//! Stage-level failures are carried as values (`StageError` inside a
//! `StageOutcome`) so the orchestrator can record them; the enums here cover
//! everything that crosses a component boundary.

use thiserror::Error;

/// Errors surfaced to callers of the saga.
#[derive(Error, Debug)]
pub enum SagaError {
    /// Malformed input; no stage was entered.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown execution or account.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persistence failure after the store client's own retries.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The service is draining and no longer starts sagas.
    #[error("Service is shutting down")]
    ShuttingDown,

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using SagaError.
pub type SagaResult<T> = Result<T, SagaError>;

/// Errors reported by a metadata store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Backend asked us to slow down.
    #[error("Store throttled: {0}")]
    Throttled(String),

    /// Backend refused the write (authorization, schema, ...).
    #[error("Store rejected write: {0}")]
    Rejected(String),

    /// No record for the requested key.
    #[error("Account metadata not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Throttled(_))
    }
}

/// Errors raised by a notification channel. Never escalated.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel not connected")]
    NotConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error() {
        let err = SagaError::Validation("Invalid account ID".to_string());
        assert_eq!(err.to_string(), "Validation error: Invalid account ID");
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::Unavailable("timeout".into()).is_transient());
        assert!(StoreError::Throttled("slow down".into()).is_transient());
        assert!(!StoreError::Rejected("access denied".into()).is_transient());
        assert!(!StoreError::NotFound("123".into()).is_transient());
    }

    #[test]
    fn test_store_error_into_saga_error() {
        let err: SagaError = StoreError::Rejected("denied".into()).into();
        assert!(matches!(err, SagaError::Store(StoreError::Rejected(_))));
    }
}
