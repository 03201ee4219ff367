//! Stage outcomes and stage errors.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a stage error, decided by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable (network blip, throttling, timeout).
    Transient,
    /// Not retryable (authorization denied, malformed upstream response).
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error reported by a stage executor.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct StageError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl StageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
            detail: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
            detail: None,
        }
    }

    /// A stage that produced no definitive outcome within its timeout.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::transient(format!(
            "Stage timed out after {} ms",
            timeout.as_millis()
        ))
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Value returned by every stage executor invocation.
///
/// Exactly one of `payload` / `error` is populated; use [`StageOutcome::success`]
/// and [`StageOutcome::failure`] to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StageError>,
}

impl StageOutcome {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failure(error: StageError) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&StageError> {
        self.error.as_ref()
    }

    /// Convert into a `Result`, treating an outcome that claims failure
    /// without an error as a permanent error.
    pub fn into_result(self) -> Result<serde_json::Value, StageError> {
        match (self.success, self.payload, self.error) {
            (true, Some(payload), _) => Ok(payload),
            (true, None, _) => Ok(serde_json::Value::Null),
            (false, _, Some(error)) => Err(error),
            (false, _, None) => Err(StageError::permanent(
                "Stage reported failure without an error",
            )),
        }
    }
}

impl From<Result<serde_json::Value, StageError>> for StageOutcome {
    fn from(result: Result<serde_json::Value, StageError>) -> Self {
        match result {
            Ok(payload) => Self::success(payload),
            Err(error) => Self::failure(error),
        }
    }
}
