//! Registry of execution snapshots.
//!
//! Holds the latest snapshot of every execution so in-flight and finished
//! sagas can be described by id. Finished executions are evicted once they
//! outlive [`Retention::max_age`] or the registry grows past
//! [`Retention::max_entries`]; in-flight executions are never evicted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{SagaError, SagaResult};
use crate::model::{AccountId, ExecutionId, WorkflowExecution};

/// Bounds on how many finished executions are kept, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_age: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionRegistry {
    executions: Arc<RwLock<HashMap<ExecutionId, WorkflowExecution>>>,
    retention: Retention,
}

impl ExecutionRegistry {
    pub fn new(retention: Retention) -> Self {
        Self {
            executions: Arc::default(),
            retention,
        }
    }

    /// Store the latest snapshot, replacing any earlier one for the same id.
    ///
    /// Saving a terminal snapshot also evicts expired executions.
    pub async fn save(&self, execution: &WorkflowExecution) {
        let mut executions = self.executions.write().await;
        executions.insert(execution.execution_id, execution.clone());
        if execution.is_terminal() {
            self.evict(&mut executions);
        }
    }

    fn evict(&self, executions: &mut HashMap<ExecutionId, WorkflowExecution>) {
        let before = executions.len();

        if let Ok(max_age) = chrono::Duration::from_std(self.retention.max_age) {
            let cutoff = Utc::now() - max_age;
            executions.retain(|_, e| !e.is_terminal() || e.updated_at >= cutoff);
        }

        if executions.len() > self.retention.max_entries {
            let mut finished: Vec<_> = executions
                .values()
                .filter(|e| e.is_terminal())
                .map(|e| (e.updated_at, e.execution_id))
                .collect();
            finished.sort_unstable_by_key(|(updated_at, _)| *updated_at);
            let excess = executions.len() - self.retention.max_entries;
            for (_, execution_id) in finished.into_iter().take(excess) {
                executions.remove(&execution_id);
            }
        }

        let evicted = before - executions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = executions.len(), "Evicted finished executions");
        }
    }

    pub async fn describe(&self, execution_id: ExecutionId) -> SagaResult<WorkflowExecution> {
        self.executions
            .read()
            .await
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| SagaError::NotFound(format!("Execution {}", execution_id)))
    }

    /// Executions for an account, oldest first.
    pub async fn list_for_account(&self, account_id: &AccountId) -> Vec<WorkflowExecution> {
        let mut executions: Vec<_> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| &e.account_id == account_id)
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.started_at);
        executions
    }

    pub async fn count(&self) -> usize {
        self.executions.read().await.len()
    }
}
