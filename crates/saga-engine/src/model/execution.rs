//! Workflow executions and their stage records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SagaError, SagaResult};
use crate::safety::SafetyVerdict;

use super::account::AccountId;
use super::outcome::{StageError, StageOutcome};

/// One unit of work in the fixed four-stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    PreCheck,
    AccountManagement,
    MetadataUpdate,
    VendorDecommission,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 4] = [
        Stage::PreCheck,
        Stage::AccountManagement,
        Stage::MetadataUpdate,
        Stage::VendorDecommission,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCheck => "pre_check",
            Self::AccountManagement => "account_management",
            Self::MetadataUpdate => "metadata_update",
            Self::VendorDecommission => "vendor_decommission",
        }
    }

    /// Whether a failure of this stage is recorded but does not stop the saga.
    pub fn is_fault_tolerant(&self) -> bool {
        matches!(self, Self::VendorDecommission)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the saga state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaState {
    PreCheck,
    AccountManagement,
    MetadataUpdate,
    VendorDecommission,
    Succeeded,
    Failed,
    SafetyViolation,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::SafetyViolation)
    }

    /// The stage this state executes, if it is not terminal.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::PreCheck => Some(Stage::PreCheck),
            Self::AccountManagement => Some(Stage::AccountManagement),
            Self::MetadataUpdate => Some(Stage::MetadataUpdate),
            Self::VendorDecommission => Some(Stage::VendorDecommission),
            Self::Succeeded | Self::Failed | Self::SafetyViolation => None,
        }
    }
}

impl From<Stage> for SagaState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::PreCheck => Self::PreCheck,
            Stage::AccountManagement => Self::AccountManagement,
            Stage::MetadataUpdate => Self::MetadataUpdate,
            Stage::VendorDecommission => Self::VendorDecommission,
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stage() {
            Some(stage) => write!(f, "{}", stage),
            None => match self {
                Self::Succeeded => write!(f, "succeeded"),
                Self::Failed => write!(f, "failed"),
                _ => write!(f, "safety_violation"),
            },
        }
    }
}

/// Unique identifier of one termination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> SagaResult<Self> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|e| SagaError::Validation(format!("Invalid execution ID {:?}: {}", raw, e)))
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one stage, enriched with retry and audit context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub attempts: u32,
    /// Set when the last error was transient and the attempt budget ran out.
    pub retry_exhausted: bool,
    /// Set when the stage failed but the saga continued anyway.
    pub tolerated: bool,
    /// Set once the stage's metadata patch was durably written.
    pub persisted: bool,
    pub correlation_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StageRecord {
    pub fn new(
        stage: Stage,
        outcome: StageOutcome,
        attempts: u32,
        retry_exhausted: bool,
        correlation_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            outcome,
            attempts,
            retry_exhausted,
            tolerated: false,
            persisted: false,
            correlation_id,
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Where a fatal failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The stage executor failed (permanent error or retries exhausted).
    Stage,
    /// The stage succeeded but its outcome could not be persisted.
    Store,
    /// The engine itself broke an invariant.
    Internal,
    /// The process stopped before the saga reached a terminal state.
    Interrupted,
}

/// Fatal failure, enriched with stage, attempt count and correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub stage: Stage,
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StageError>,
    pub attempts: u32,
    pub retry_exhausted: bool,
    pub correlation_id: Uuid,
}

impl FailureReport {
    /// Build a report from a failed stage record.
    pub fn from_record(record: &StageRecord) -> Option<Self> {
        let error = record.outcome.error()?;
        Some(Self {
            stage: record.stage,
            kind: FailureKind::Stage,
            message: error.message.clone(),
            error: Some(error.clone()),
            attempts: record.attempts,
            retry_exhausted: record.retry_exhausted,
            correlation_id: record.correlation_id,
        })
    }
}

/// One triggered termination attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    pub execution_id: ExecutionId,
    pub account_id: AccountId,
    pub current_stage: SagaState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Append-only, ordered by stage.
    pub stage_results: BTreeMap<Stage, StageRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl WorkflowExecution {
    /// Create a new execution positioned at the pre-check stage.
    pub fn new(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            execution_id: ExecutionId::new(),
            account_id,
            current_stage: SagaState::PreCheck,
            started_at: now,
            updated_at: now,
            completed_at: None,
            stage_results: BTreeMap::new(),
            safety: None,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage.is_terminal()
    }

    /// Move to `stage`. Stages only move forward and never after a terminal state.
    pub fn enter(&mut self, stage: Stage) -> SagaResult<()> {
        let current = self.current_stage.stage().ok_or_else(|| {
            SagaError::Internal(format!(
                "Execution {} is terminal ({}), cannot enter {}",
                self.execution_id, self.current_stage, stage
            ))
        })?;
        if stage < current || self.stage_results.keys().any(|done| *done >= stage) {
            return Err(SagaError::Internal(format!(
                "Execution {} cannot move from {} back to {}",
                self.execution_id, current, stage
            )));
        }
        self.current_stage = stage.into();
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append the record for the current stage.
    pub fn record(&mut self, record: StageRecord) -> SagaResult<()> {
        if self.current_stage.stage() != Some(record.stage) {
            return Err(SagaError::Internal(format!(
                "Execution {} is at {}, refusing record for {}",
                self.execution_id, self.current_stage, record.stage
            )));
        }
        if self.stage_results.contains_key(&record.stage) {
            return Err(SagaError::Internal(format!(
                "Execution {} already recorded {}",
                self.execution_id, record.stage
            )));
        }
        self.stage_results.insert(record.stage, record);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_mut(&mut self, stage: Stage) -> Option<&mut StageRecord> {
        self.stage_results.get_mut(&stage)
    }

    /// Move to a terminal state. No-op if already terminal.
    pub fn finish(&mut self, state: SagaState) {
        if self.is_terminal() || !state.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.current_stage = state;
        self.updated_at = now;
        self.completed_at = Some(now);
    }

    /// Payloads of every successful stage so far, handed to the next executor.
    pub fn prior_payloads(&self) -> BTreeMap<Stage, serde_json::Value> {
        self.stage_results
            .iter()
            .filter_map(|(stage, record)| record.outcome.payload().map(|p| (*stage, p.clone())))
            .collect()
    }

    /// Aggregate per-stage breakdown for notifications and audit.
    pub fn summary(&self) -> ExecutionSummary {
        let stages = self
            .stage_results
            .iter()
            .map(|(stage, record)| {
                (
                    *stage,
                    StageSummary {
                        success: record.outcome.is_success(),
                        attempts: record.attempts,
                        retry_exhausted: record.retry_exhausted,
                        tolerated: record.tolerated,
                        error: record.outcome.error().map(|e| e.to_string()),
                    },
                )
            })
            .collect();

        let failed_vendors = self
            .stage_results
            .get(&Stage::VendorDecommission)
            .and_then(|record| record.outcome.payload())
            .map(failed_vendors)
            .unwrap_or_default();

        ExecutionSummary {
            execution_id: self.execution_id,
            account_id: self.account_id.clone(),
            state: self.current_stage,
            stages,
            failed_vendors,
            safety: self.safety.clone(),
            failure: self.failure.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// Vendors whose entry in a decommission payload reports `success: false`.
fn failed_vendors(payload: &serde_json::Value) -> Vec<String> {
    payload
        .get("results")
        .and_then(|r| r.as_object())
        .map(|results| {
            results
                .iter()
                .filter(|(_, result)| {
                    !result
                        .get("success")
                        .and_then(|s| s.as_bool())
                        .unwrap_or(false)
                })
                .map(|(vendor, _)| vendor.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Per-stage line of an [`ExecutionSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    pub success: bool,
    pub attempts: u32,
    pub retry_exhausted: bool,
    pub tolerated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub account_id: AccountId,
    pub state: SagaState,
    pub stages: BTreeMap<Stage, StageSummary>,
    pub failed_vendors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new(AccountId::parse("999999999999", 12).unwrap())
    }

    fn record(stage: Stage, outcome: StageOutcome) -> StageRecord {
        StageRecord::new(stage, outcome, 1, false, Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::PreCheck < Stage::AccountManagement);
        assert!(Stage::MetadataUpdate < Stage::VendorDecommission);
        assert_eq!(Stage::ALL.len(), 4);
        assert!(Stage::VendorDecommission.is_fault_tolerant());
        assert!(!Stage::MetadataUpdate.is_fault_tolerant());
    }

    #[test]
    fn test_terminal_states() {
        assert!(SagaState::Succeeded.is_terminal());
        assert!(SagaState::Failed.is_terminal());
        assert!(SagaState::SafetyViolation.is_terminal());
        assert!(!SagaState::PreCheck.is_terminal());
        assert_eq!(SagaState::SafetyViolation.to_string(), "safety_violation");
        assert_eq!(SagaState::MetadataUpdate.to_string(), "metadata_update");
    }

    #[test]
    fn test_record_rejects_stage_other_than_current() {
        let mut exec = execution();
        exec.enter(Stage::PreCheck).unwrap();
        let result = exec.record(record(Stage::AccountManagement, StageOutcome::success(json!({}))));
        assert!(matches!(result, Err(SagaError::Internal(_))));
        assert!(exec.stage_results.is_empty());
    }

    #[test]
    fn test_record_is_append_only() {
        let mut exec = execution();
        exec.enter(Stage::PreCheck).unwrap();
        exec.record(record(Stage::PreCheck, StageOutcome::success(json!({})))).unwrap();
        let again = exec.record(record(Stage::PreCheck, StageOutcome::success(json!({}))));
        assert!(again.is_err());
        assert!(exec.enter(Stage::PreCheck).is_err());
    }

    #[test]
    fn test_no_stage_after_terminal() {
        let mut exec = execution();
        exec.finish(SagaState::SafetyViolation);
        assert!(exec.is_terminal());
        assert!(exec.completed_at.is_some());
        assert!(exec.enter(Stage::AccountManagement).is_err());

        exec.finish(SagaState::Succeeded);
        assert_eq!(exec.current_stage, SagaState::SafetyViolation);
    }

    #[test]
    fn test_prior_payloads_skip_failures() {
        let mut exec = execution();
        exec.enter(Stage::PreCheck).unwrap();
        exec.record(record(Stage::PreCheck, StageOutcome::success(json!({"ok": 1}))))
            .unwrap();
        exec.enter(Stage::AccountManagement).unwrap();
        exec.record(record(
            Stage::AccountManagement,
            StageOutcome::failure(StageError::permanent("denied")),
        ))
        .unwrap();

        let prior = exec.prior_payloads();
        assert_eq!(prior.len(), 1);
        assert_eq!(prior[&Stage::PreCheck], json!({"ok": 1}));
    }

    #[test]
    fn test_summary_lists_failed_vendors() {
        let mut exec = execution();
        for stage in Stage::ALL {
            exec.enter(stage).unwrap();
            let payload = if stage == Stage::VendorDecommission {
                json!({
                    "vendorsProcessed": ["Prisma", "Splunk"],
                    "results": {
                        "Prisma": {"success": false, "message": "401"},
                        "Splunk": {"success": true}
                    }
                })
            } else {
                json!({})
            };
            exec.record(record(stage, StageOutcome::success(payload))).unwrap();
        }
        exec.finish(SagaState::Succeeded);

        let summary = exec.summary();
        assert_eq!(summary.state, SagaState::Succeeded);
        assert_eq!(summary.stages.len(), 4);
        assert_eq!(summary.failed_vendors, vec!["Prisma".to_string()]);
    }

    #[test]
    fn test_execution_serialization() {
        let exec = execution();
        let value = serde_json::to_value(&exec).unwrap();
        assert_eq!(value["currentStage"], json!("PreCheck"));
        assert_eq!(value["accountId"], json!("999999999999"));
        assert!(value["stageResults"].as_object().unwrap().is_empty());
    }
}
