//! Saga orchestrator.
//!
//! Drives one [`WorkflowExecution`] through the four stages in order:
//!
//! ```text
//! PreCheck --gate--> AccountManagement --> MetadataUpdate --> VendorDecommission --> Succeeded
//!    |                      |                    |
//!    +--> SafetyViolation   +------> Failed <----+
//! ```
//!
//! Every stage call is wrapped in the stage's retry policy and a per-attempt
//! timeout, and every stage outcome is persisted before the next stage starts.
//! Vendor decommission failures are recorded as tolerated and never stop the
//! saga. A terminal state always triggers exactly one notification.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SagaConfig;
use crate::error::SagaResult;
use crate::model::{
    AccountId, FailureKind, FailureReport, MetadataPatch, SagaState, Stage, StageError,
    StageOutcome, StageRecord, WorkflowExecution,
};
use crate::notify::{Channel, NotificationDispatcher};
use crate::registry::ExecutionRegistry;
use crate::result_ext::{OptionResultExt, ResultExt};
use crate::safety::SafetyGate;
use crate::stage::{StageContext, StageExecutors};
use crate::store::{MetadataStore, MetadataStoreClient};
use crate::AUDIT_TARGET;

/// State machine running termination sagas.
#[derive(Clone)]
pub struct SagaOrchestrator {
    executors: StageExecutors,
    store: MetadataStoreClient,
    notifier: NotificationDispatcher,
    gate: SafetyGate,
    config: Arc<SagaConfig>,
    registry: ExecutionRegistry,
}

impl SagaOrchestrator {
    pub fn new(
        config: SagaConfig,
        executors: StageExecutors,
        store: Arc<dyn MetadataStore>,
        notifier: NotificationDispatcher,
    ) -> Self {
        let store = MetadataStoreClient::from_config(store, &config.store);
        let gate = SafetyGate::new(config.critical_resources.iter().cloned());
        let registry = ExecutionRegistry::new(config.registry_retention());
        Self {
            executors,
            store,
            notifier,
            gate,
            config: Arc::new(config),
            registry,
        }
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &MetadataStoreClient {
        &self.store
    }

    /// Validate a raw account identifier. Rejections are audit-logged.
    pub fn validate(&self, raw: &str) -> SagaResult<AccountId> {
        AccountId::parse(raw, self.config.account_id_digits).inspect_err(|e| {
            warn!(
                target: AUDIT_TARGET,
                account_id = raw,
                error = %e,
                "Termination request rejected"
            );
        })
    }

    /// Validate `raw` and run a new saga for it to completion.
    pub async fn run(&self, raw: &str) -> SagaResult<WorkflowExecution> {
        let account_id = self.validate(raw)?;
        Ok(self.execute(WorkflowExecution::new(account_id)).await)
    }

    /// Run a fresh execution to a terminal state.
    ///
    /// Never fails: a broken internal invariant ends the execution in
    /// `Failed` with [`FailureKind::Internal`].
    pub async fn execute(&self, mut execution: WorkflowExecution) -> WorkflowExecution {
        info!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %execution.account_id,
            "Termination saga started"
        );
        self.registry.save(&execution).await;

        if let Err(e) = self.drive(&mut execution).await {
            error!(
                execution_id = %execution.execution_id,
                error = %e,
                "Termination saga aborted"
            );
            if !execution.is_terminal() {
                let stage = execution.current_stage.stage().unwrap_or(Stage::PreCheck);
                let report = FailureReport {
                    stage,
                    kind: FailureKind::Internal,
                    message: e.to_string(),
                    error: None,
                    attempts: 0,
                    retry_exhausted: false,
                    correlation_id: Uuid::nil(),
                };
                self.fail(&mut execution, report).await;
            }
        }

        self.conclude(&execution).await;
        execution
    }

    /// Fail an execution whose driver was stopped before reaching a terminal state.
    ///
    /// Takes the last saved snapshot. Already terminal executions are returned
    /// unchanged and are not notified again.
    pub async fn interrupt(&self, mut execution: WorkflowExecution) -> WorkflowExecution {
        if execution.is_terminal() {
            return execution;
        }
        let stage = execution.current_stage.stage().unwrap_or(Stage::PreCheck);
        let record = execution.stage_results.get(&stage);
        let report = FailureReport {
            stage,
            kind: FailureKind::Interrupted,
            message: format!("Interrupted by shutdown during {}", stage),
            error: None,
            attempts: record.map(|r| r.attempts).unwrap_or(0),
            retry_exhausted: false,
            correlation_id: record.map(|r| r.correlation_id).unwrap_or_else(Uuid::nil),
        };
        self.fail(&mut execution, report).await;
        self.conclude(&execution).await;
        execution
    }

    /// Save the terminal snapshot and send its notification.
    async fn conclude(&self, execution: &WorkflowExecution) {
        self.registry.save(execution).await;
        info!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %execution.account_id,
            state = %execution.current_stage,
            stages = execution.stage_results.len(),
            "Termination saga finished"
        );
        self.dispatch_terminal(execution).await;
    }

    async fn drive(&self, execution: &mut WorkflowExecution) -> SagaResult<()> {
        for stage in Stage::ALL {
            execution.enter(stage)?;
            self.registry.save(execution).await;

            let record = self.attempt_stage(execution, stage).await;
            let payload = record.outcome.payload().cloned();
            let report = FailureReport::from_record(&record);
            execution.record(record)?;
            self.registry.save(execution).await;

            if let Some(report) = report {
                if stage.is_fault_tolerant() {
                    if !self.tolerate(execution, stage, report).await {
                        return Ok(());
                    }
                    continue;
                }
                self.fail(execution, report).await;
                return Ok(());
            }

            let payload = payload
                .log_none(format!("{} succeeded without a payload", stage))
                .unwrap_or(Value::Null);
            let patch = MetadataPatch::for_stage(stage, execution.execution_id, &payload);
            if !self.persist(execution, stage, patch).await {
                return Ok(());
            }

            if stage == Stage::PreCheck {
                let verdict = self.gate.evaluate(&payload);
                let safe = verdict.safe;
                if !safe {
                    warn!(
                        target: AUDIT_TARGET,
                        execution_id = %execution.execution_id,
                        account_id = %execution.account_id,
                        reason = verdict.reason.as_deref().unwrap_or_default(),
                        "Safety gate halted termination"
                    );
                }
                execution.safety = Some(verdict);
                if !safe {
                    execution.finish(SagaState::SafetyViolation);
                    return Ok(());
                }
            }
        }

        execution.finish(SagaState::Succeeded);
        Ok(())
    }

    /// Invoke the stage executor under the stage's retry policy and timeout.
    async fn attempt_stage(&self, execution: &WorkflowExecution, stage: Stage) -> StageRecord {
        let stage_config = self.config.stage(stage);
        let policy = stage_config.retry_policy();
        let timeout = stage_config.timeout();
        let context = StageContext::new(
            execution.execution_id,
            stage,
            timeout,
            execution.prior_payloads(),
        );
        let correlation_id = context.correlation_id;
        let executor = self.executors.get(stage);
        let account_id = &execution.account_id;
        let started_at = Utc::now();

        info!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %account_id,
            stage = %stage,
            correlation_id = %correlation_id,
            executor = executor.name(),
            "Stage started"
        );

        let result = policy
            .run(move |attempt| {
                let ctx = context.for_attempt(attempt);
                async move {
                    debug!(stage = %stage, attempt, correlation_id = %ctx.correlation_id, "Invoking stage executor");
                    match tokio::time::timeout(timeout, executor.execute(account_id, &ctx)).await {
                        Ok(outcome) => outcome.into_result(),
                        Err(_) => Err(StageError::timed_out(timeout)),
                    }
                }
            })
            .await;

        let (outcome, attempts, exhausted) = match result {
            Ok(done) => (StageOutcome::success(done.value), done.attempts, false),
            Err(failure) => (
                StageOutcome::failure(failure.error),
                failure.attempts,
                failure.exhausted,
            ),
        };

        let record = StageRecord::new(stage, outcome, attempts, exhausted, correlation_id, started_at);
        info!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %account_id,
            stage = %stage,
            correlation_id = %correlation_id,
            success = record.outcome.is_success(),
            attempts,
            retry_exhausted = exhausted,
            "Stage finished"
        );
        record
    }

    /// Record a failure of a fault-tolerant stage and keep going.
    async fn tolerate(&self, execution: &mut WorkflowExecution, stage: Stage, report: FailureReport) -> bool {
        warn!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %execution.account_id,
            stage = %stage,
            attempts = report.attempts,
            error = %report.message,
            "Stage failed, continuing"
        );
        if let Some(record) = execution.record_mut(stage) {
            record.tolerated = true;
        }
        let payload = json!({
            "stageFailed": true,
            "error": report.error,
            "attempts": report.attempts,
            "retryExhausted": report.retry_exhausted,
        });
        let patch = MetadataPatch::for_stage(stage, execution.execution_id, &payload);
        self.persist(execution, stage, patch).await
    }

    /// Write a stage's patch. A write that fails after retries fails the saga.
    async fn persist(&self, execution: &mut WorkflowExecution, stage: Stage, patch: MetadataPatch) -> bool {
        match self.store.upsert(&execution.account_id, &patch).await {
            Ok(_) => {
                if let Some(record) = execution.record_mut(stage) {
                    record.persisted = true;
                }
                true
            }
            Err(failure) => {
                let correlation_id = execution
                    .stage_results
                    .get(&stage)
                    .map(|r| r.correlation_id)
                    .unwrap_or_else(Uuid::nil);
                let report = FailureReport {
                    stage,
                    kind: FailureKind::Store,
                    message: format!("Failed to persist {} outcome: {}", stage, failure.error),
                    error: None,
                    attempts: failure.attempts,
                    retry_exhausted: failure.exhausted,
                    correlation_id,
                };
                self.fail(execution, report).await;
                false
            }
        }
    }

    /// Move to `Failed` and record the failure against the account, best effort.
    async fn fail(&self, execution: &mut WorkflowExecution, report: FailureReport) {
        error!(
            target: AUDIT_TARGET,
            execution_id = %execution.execution_id,
            account_id = %execution.account_id,
            stage = %report.stage,
            kind = ?report.kind,
            attempts = report.attempts,
            retry_exhausted = report.retry_exhausted,
            correlation_id = %report.correlation_id,
            error = %report.message,
            "Termination saga failed"
        );
        let patch = MetadataPatch::for_failure(report.stage, execution.execution_id, &report.message);
        execution.failure = Some(report);
        execution.finish(SagaState::Failed);

        let _ = self
            .store
            .upsert(&execution.account_id, &patch)
            .await
            .map_err(|failure| failure.error)
            .log("recording failed status");
    }

    async fn dispatch_terminal(&self, execution: &WorkflowExecution) {
        let account_id = &execution.account_id;
        let (channel, subject) = match execution.current_stage {
            SagaState::Succeeded => (
                Channel::Success,
                format!("Account termination succeeded: {}", account_id),
            ),
            SagaState::Failed => (
                Channel::Failure,
                format!("Account termination failed: {}", account_id),
            ),
            SagaState::SafetyViolation => (
                Channel::SafetyViolation,
                format!("Account termination halted by safety check: {}", account_id),
            ),
            state => {
                warn!(execution_id = %execution.execution_id, state = %state, "Not terminal, skipping notification");
                return;
            }
        };

        let body = serde_json::to_value(execution.summary())
            .log("serializing execution summary")
            .unwrap_or_else(|_| {
                json!({
                    "executionId": execution.execution_id,
                    "accountId": account_id,
                    "state": execution.current_stage,
                })
            });
        self.notifier.notify(channel, &subject, &body).await;
    }
}

impl std::fmt::Debug for SagaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaOrchestrator")
            .field("executors", &self.executors)
            .field("notifier", &self.notifier)
            .field("gate", &self.gate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SagaError, StoreError};
    use crate::model::AccountStatus;
    use crate::testing::{pre_check_payload, FlakyStore, Harness, ScriptedExecutor};

    const ACCOUNT: &str = "999999999999";

    #[tokio::test]
    async fn test_invalid_account_never_reaches_an_executor() {
        let harness = Harness::builder().build();
        for raw in ["", "12345", "abcdefghijkl", "9999999999999", " 99999999999"] {
            let err = harness.orchestrator.run(raw).await.unwrap_err();
            assert!(matches!(err, SagaError::Validation(_)), "{raw:?} accepted");
        }
        for stage in Stage::ALL {
            assert_eq!(harness.executor(stage).calls(), 0);
        }
        assert!(harness.notifications.all().is_empty());
    }

    #[tokio::test]
    async fn test_stages_receive_prior_payloads() {
        let harness = Harness::builder().build();
        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();
        assert_eq!(execution.current_stage, SagaState::Succeeded);

        let contexts = harness.executor(Stage::MetadataUpdate).contexts();
        assert_eq!(contexts.len(), 1);
        let prior = &contexts[0].prior;
        assert!(prior.contains_key(&Stage::PreCheck));
        assert!(prior.contains_key(&Stage::AccountManagement));
        assert!(!prior.contains_key(&Stage::VendorDecommission));
        assert_eq!(contexts[0].execution_id, execution.execution_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_correlation_id_is_stable_across_attempts() {
        let harness = Harness::builder()
            .executor(
                Stage::AccountManagement,
                ScriptedExecutor::new(
                    "account",
                    vec![
                        StageOutcome::failure(StageError::transient("throttled")),
                        StageOutcome::success(json!({"suspended": true})),
                    ],
                ),
            )
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        let contexts = harness.executor(Stage::AccountManagement).contexts();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].attempt, 1);
        assert_eq!(contexts[1].attempt, 2);
        assert_eq!(contexts[0].correlation_id, contexts[1].correlation_id);

        let record = &execution.stage_results[&Stage::AccountManagement];
        assert_eq!(record.attempts, 2);
        assert_eq!(record.correlation_id, contexts[0].correlation_id);
        assert!(record.persisted);
    }

    #[tokio::test]
    async fn test_safety_violation_keeps_account_active() {
        let harness = Harness::builder()
            .executor(
                Stage::PreCheck,
                ScriptedExecutor::always_succeeding("pre", pre_check_payload(ACCOUNT, 0, 4)),
            )
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        assert_eq!(execution.current_stage, SagaState::SafetyViolation);
        let verdict = execution.safety.as_ref().unwrap();
        assert!(!verdict.safe);
        assert_eq!(verdict.violations[0].category, "rdsInstances");

        let metadata = harness.metadata(ACCOUNT).await;
        assert_eq!(metadata.status, AccountStatus::Active);
        assert!(metadata.pre_check_result.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pre_check_is_fatal() {
        let harness = Harness::builder()
            .executor(
                Stage::PreCheck,
                ScriptedExecutor::always_failing("pre", StageError::transient("scanner unavailable")),
            )
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        assert_eq!(execution.current_stage, SagaState::Failed);
        assert!(execution.safety.is_none());
        let failure = execution.failure.unwrap();
        assert_eq!(failure.stage, Stage::PreCheck);
        assert_eq!(failure.kind, FailureKind::Stage);
        assert!(failure.retry_exhausted);
        assert_eq!(harness.executor(Stage::AccountManagement).calls(), 0);
        assert_eq!(harness.notifications.count(Channel::Failure), 1);
    }

    #[tokio::test]
    async fn test_malformed_pre_check_payload_is_unsafe() {
        let harness = Harness::builder()
            .executor(
                Stage::PreCheck,
                ScriptedExecutor::always_succeeding("pre", json!({"accountId": ACCOUNT})),
            )
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();
        assert_eq!(execution.current_stage, SagaState::SafetyViolation);
        assert_eq!(harness.executor(Stage::AccountManagement).calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_after_success_is_fatal() {
        // Pre-check and account management writes land, the metadata update write never does.
        let harness = Harness::builder()
            .store(FlakyStore::failing_after(2, StoreError::Unavailable("table offline".into())))
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        assert_eq!(execution.current_stage, SagaState::Failed);
        let failure = execution.failure.as_ref().unwrap();
        assert_eq!(failure.stage, Stage::MetadataUpdate);
        assert_eq!(failure.kind, FailureKind::Store);
        assert!(failure.retry_exhausted);

        let record = &execution.stage_results[&Stage::MetadataUpdate];
        assert!(record.outcome.is_success());
        assert!(!record.persisted);
        assert_eq!(harness.executor(Stage::VendorDecommission).calls(), 0);

        let metadata = harness.metadata(ACCOUNT).await;
        assert_eq!(metadata.status, AccountStatus::Terminating);
        assert!(metadata.pre_check_result.is_some());
        assert!(metadata.termination_record.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerated_vendor_failure_marks_account_terminated() {
        let harness = Harness::builder()
            .executor(
                Stage::VendorDecommission,
                ScriptedExecutor::always_failing("vendor", StageError::transient("vendor API down")),
            )
            .build();

        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        assert_eq!(execution.current_stage, SagaState::Succeeded);
        let record = &execution.stage_results[&Stage::VendorDecommission];
        assert!(record.tolerated);
        assert!(record.persisted);
        assert!(record.retry_exhausted);
        assert_eq!(record.attempts, 3);

        let metadata = harness.metadata(ACCOUNT).await;
        assert_eq!(metadata.status, AccountStatus::Terminated);
        assert_eq!(metadata.vendor_results.unwrap()["stageFailed"], json!(true));
    }

    #[tokio::test]
    async fn test_registry_tracks_terminal_snapshot() {
        let harness = Harness::builder().build();
        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();

        let stored = harness
            .orchestrator
            .registry()
            .describe(execution.execution_id)
            .await
            .unwrap();
        assert_eq!(stored, execution);
    }

    #[tokio::test]
    async fn test_interrupt_leaves_terminal_executions_alone() {
        let harness = Harness::builder().build();
        let execution = harness.orchestrator.run(ACCOUNT).await.unwrap();
        assert_eq!(harness.notifications.all().len(), 1);

        let again = harness.orchestrator.interrupt(execution.clone()).await;

        assert_eq!(again, execution);
        assert_eq!(harness.notifications.all().len(), 1);
        assert_eq!(harness.metadata(ACCOUNT).await.status, AccountStatus::Terminated);
    }
}
