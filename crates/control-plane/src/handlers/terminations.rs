//! Termination trigger and query handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use termination_saga::model::{ExecutionId, ExecutionSummary, WorkflowExecution};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTerminationRequest {
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTerminationResponse {
    pub execution_id: ExecutionId,
    pub account_id: String,
}

/// Start a termination saga.
///
/// POST /api/terminations
///
/// Returns `202 Accepted` as soon as the request is validated; the saga runs
/// in the background.
pub async fn start(
    State(state): State<AppState>,
    Json(request): Json<StartTerminationRequest>,
) -> Result<(StatusCode, Json<StartTerminationResponse>), AppError> {
    let execution_id = state.service.start(&request.account_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StartTerminationResponse {
            execution_id,
            account_id: request.account_id,
        }),
    ))
}

/// Describe an execution.
///
/// GET /api/terminations/{execution_id}
pub async fn get(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<WorkflowExecution>, AppError> {
    let execution_id = ExecutionId::parse(&execution_id)?;
    Ok(Json(state.service.describe(execution_id).await?))
}

/// Aggregated per-stage summary of an execution.
///
/// GET /api/terminations/{execution_id}/summary
pub async fn summary(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionSummary>, AppError> {
    let execution_id = ExecutionId::parse(&execution_id)?;
    Ok(Json(state.service.summary(execution_id).await?))
}
