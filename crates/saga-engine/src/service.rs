//! Trigger and query surface.
//!
//! `start` validates synchronously and returns the execution id immediately;
//! the saga itself runs on a task tracked by the service. `describe` reads
//! back the latest snapshot of an execution, whether in flight or terminal.
//! `shutdown` stops accepting work and drains the tracked sagas.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};

use crate::error::{SagaError, SagaResult, StoreError};
use crate::model::{AccountMetadata, ExecutionId, ExecutionSummary, WorkflowExecution};
use crate::orchestrator::SagaOrchestrator;
use crate::AUDIT_TARGET;

/// Sagas started by the service that have not been reaped yet.
#[derive(Debug, Default)]
struct InFlight {
    tasks: JoinSet<ExecutionId>,
    executions: HashSet<ExecutionId>,
    closed: bool,
}

impl InFlight {
    fn reap(&mut self, joined: Result<ExecutionId, JoinError>) {
        match joined {
            Ok(execution_id) => {
                self.executions.remove(&execution_id);
            }
            Err(e) if e.is_panic() => {
                tracing::error!(error = %e, "Termination saga task panicked");
            }
            Err(_) => {}
        }
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            self.reap(joined);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TerminationService {
    orchestrator: Arc<SagaOrchestrator>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl TerminationService {
    pub fn new(orchestrator: SagaOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            in_flight: Arc::default(),
        }
    }

    /// Validate `account_id`, register a new execution and run it in the background.
    pub async fn start(&self, account_id: &str) -> SagaResult<ExecutionId> {
        let account_id = self.orchestrator.validate(account_id)?;
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.closed {
            return Err(SagaError::ShuttingDown);
        }
        in_flight.reap_finished();

        let execution = WorkflowExecution::new(account_id);
        let execution_id = execution.execution_id;
        self.orchestrator.registry().save(&execution).await;

        tracing::info!(
            target: AUDIT_TARGET,
            execution_id = %execution_id,
            account_id = %execution.account_id,
            "Termination requested"
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        in_flight.tasks.spawn(async move {
            orchestrator.execute(execution).await.execution_id
        });
        in_flight.executions.insert(execution_id);

        Ok(execution_id)
    }

    /// Stop accepting sagas and wait up to `grace` for the running ones.
    ///
    /// Sagas still running after `grace` are aborted and moved to `Failed`
    /// from their last snapshot, which records the account as FAILED and
    /// sends the failure notification. Returns how many were interrupted.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let mut guard = self.in_flight.lock().await;
        let in_flight = &mut *guard;
        in_flight.closed = true;
        in_flight.reap_finished();

        if !in_flight.tasks.is_empty() {
            tracing::info!(
                running = in_flight.tasks.len(),
                grace_ms = grace.as_millis() as u64,
                "Waiting for running termination sagas"
            );
        }

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = in_flight.tasks.join_next().await {
                in_flight.reap(joined);
            }
        })
        .await
        .is_ok();

        if !drained {
            in_flight.tasks.abort_all();
            while let Some(joined) = in_flight.tasks.join_next().await {
                in_flight.reap(joined);
            }
        }

        let interrupted: Vec<ExecutionId> = in_flight.executions.drain().collect();
        for execution_id in &interrupted {
            match self.orchestrator.registry().describe(*execution_id).await {
                Ok(snapshot) => {
                    tracing::warn!(
                        target: AUDIT_TARGET,
                        execution_id = %execution_id,
                        account_id = %snapshot.account_id,
                        state = %snapshot.current_stage,
                        "Termination saga interrupted by shutdown"
                    );
                    self.orchestrator.interrupt(snapshot).await;
                }
                Err(e) => {
                    tracing::error!(execution_id = %execution_id, error = %e, "Interrupted saga has no snapshot");
                }
            }
        }
        interrupted.len()
    }

    /// Run a saga to completion and return the terminal execution.
    pub async fn run(&self, account_id: &str) -> SagaResult<WorkflowExecution> {
        self.orchestrator.run(account_id).await
    }

    pub async fn describe(&self, execution_id: ExecutionId) -> SagaResult<WorkflowExecution> {
        self.orchestrator.registry().describe(execution_id).await
    }

    pub async fn summary(&self, execution_id: ExecutionId) -> SagaResult<ExecutionSummary> {
        Ok(self.describe(execution_id).await?.summary())
    }

    /// Stored metadata for an account.
    pub async fn account(&self, account_id: &str) -> SagaResult<AccountMetadata> {
        let account_id = self.orchestrator.validate(account_id)?;
        match self.orchestrator.store().get(&account_id).await {
            Ok(metadata) => Ok(metadata),
            Err(StoreError::NotFound(_)) => Err(SagaError::NotFound(format!("Account {}", account_id))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn executions_for(&self, account_id: &str) -> SagaResult<Vec<WorkflowExecution>> {
        let account_id = self.orchestrator.validate(account_id)?;
        Ok(self.orchestrator.registry().list_for_account(&account_id).await)
    }
}
