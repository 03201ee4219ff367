//! Account metadata handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use termination_saga::model::{AccountMetadata, WorkflowExecution};

use crate::error::AppError;
use crate::state::AppState;

/// Stored metadata for an account.
///
/// GET /api/accounts/{account_id}
pub async fn get(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountMetadata>, AppError> {
    Ok(Json(state.service.account(&account_id).await?))
}

/// Executions started for an account, oldest first.
///
/// GET /api/accounts/{account_id}/executions
pub async fn executions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<Vec<WorkflowExecution>>, AppError> {
    Ok(Json(state.service.executions_for(&account_id).await?))
}
