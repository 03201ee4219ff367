//! Data model for the termination saga.
//!
//! - **Outcome**: what a stage executor returns
//! - **Execution**: one triggered termination attempt and its stage records
//! - **Account**: the persistent per-account metadata record

mod account;
mod execution;
mod outcome;

pub use account::{
    AccountId, AccountMetadata, AccountStatus, FailureNote, MetadataPatch,
    DEFAULT_ACCOUNT_ID_DIGITS,
};
pub use execution::{
    ExecutionId, ExecutionSummary, FailureKind, FailureReport, SagaState, Stage, StageRecord,
    StageSummary, WorkflowExecution,
};
pub use outcome::{ErrorKind, StageError, StageOutcome};
