//! Stage executor interface.
//!
//! Each stage of the saga is delegated to an external collaborator behind the
//! [`StageExecutor`] trait. Executors classify their own errors as transient
//! or permanent; the orchestrator owns retries and timeouts.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::model::{AccountId, ExecutionId, Stage, StageOutcome};

/// Context passed to an executor for one attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageContext {
    pub execution_id: ExecutionId,
    pub stage: Stage,
    /// Stable across all attempts of the stage.
    pub correlation_id: Uuid,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Time allowed for this attempt.
    #[serde(skip)]
    pub timeout: Duration,
    /// Payloads of the stages that already succeeded.
    pub prior: BTreeMap<Stage, serde_json::Value>,
}

impl StageContext {
    pub fn new(
        execution_id: ExecutionId,
        stage: Stage,
        timeout: Duration,
        prior: BTreeMap<Stage, serde_json::Value>,
    ) -> Self {
        Self {
            execution_id,
            stage,
            correlation_id: Uuid::new_v4(),
            attempt: 1,
            timeout,
            prior,
        }
    }

    /// Copy of this context for the given attempt.
    pub fn for_attempt(&self, attempt: u32) -> Self {
        Self {
            attempt,
            ..self.clone()
        }
    }
}

/// A collaborator performing the work of one stage.
///
/// Implementations must not panic on upstream failures: every failure is
/// reported as a [`StageOutcome::failure`] with a classified error.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn execute(&self, account_id: &AccountId, context: &StageContext) -> StageOutcome;
}

/// One executor per stage.
#[derive(Clone)]
pub struct StageExecutors {
    pre_check: Arc<dyn StageExecutor>,
    account_management: Arc<dyn StageExecutor>,
    metadata_update: Arc<dyn StageExecutor>,
    vendor_decommission: Arc<dyn StageExecutor>,
}

impl StageExecutors {
    pub fn new(
        pre_check: Arc<dyn StageExecutor>,
        account_management: Arc<dyn StageExecutor>,
        metadata_update: Arc<dyn StageExecutor>,
        vendor_decommission: Arc<dyn StageExecutor>,
    ) -> Self {
        Self {
            pre_check,
            account_management,
            metadata_update,
            vendor_decommission,
        }
    }

    pub fn get(&self, stage: Stage) -> &Arc<dyn StageExecutor> {
        match stage {
            Stage::PreCheck => &self.pre_check,
            Stage::AccountManagement => &self.account_management,
            Stage::MetadataUpdate => &self.metadata_update,
            Stage::VendorDecommission => &self.vendor_decommission,
        }
    }
}

impl std::fmt::Debug for StageExecutors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutors")
            .field("pre_check", &self.pre_check.name())
            .field("account_management", &self.account_management.name())
            .field("metadata_update", &self.metadata_update.name())
            .field("vendor_decommission", &self.vendor_decommission.name())
            .finish()
    }
}
