//! Account Termination Saga
//!
//! This crate drives the irreversible termination of a tenant account through
//! a fixed, forward-only sequence of stages:
//!
//! - **Pre-check**: scans the account for protected resources
//! - **Account management**: suspends the account and initiates closure
//! - **Metadata update**: records the termination in the account registry
//! - **Vendor decommission**: best-effort cleanup at third-party vendors
//!
//! ## Architecture
//!
//! The [`orchestrator::SagaOrchestrator`] is an in-process state machine. Each
//! stage is invoked through the [`stage::StageExecutor`] trait, wrapped in a
//! [`retry::RetryPolicy`] and a per-stage timeout. The pre-check payload is
//! inspected by the [`safety::SafetyGate`] before anything irreversible runs.
//! After every stage the outcome is persisted through the
//! [`store::MetadataStoreClient`], and terminal outcomes fan out through the
//! [`notify::NotificationDispatcher`].
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`error`]: Error taxonomy shared by all components
//! - [`model`]: Executions, stage outcomes and account metadata
//! - [`service`]: Trigger and query surface
//! - [`testing`]: Fake collaborators for exercising the saga in isolation
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use termination_saga::{
//!     config::SagaConfig, notify::{LogChannel, NotificationDispatcher},
//!     orchestrator::SagaOrchestrator, store::InMemoryMetadataStore,
//! };
//!
//! let config = SagaConfig::from_env()?;
//! let notifier = NotificationDispatcher::new(config.notification_timeout())
//!     .with_channel(Arc::new(LogChannel::new()));
//! let orchestrator = SagaOrchestrator::new(
//!     config,
//!     executors,
//!     Arc::new(InMemoryMetadataStore::new()),
//!     notifier,
//! );
//! let execution = orchestrator.run("999999999999").await?;
//! ```

pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod registry;
pub mod result_ext;
pub mod retry;
pub mod safety;
pub mod service;
pub mod stage;
pub mod store;
pub mod testing;

pub use error::{SagaError, SagaResult, StoreError};
pub use model::{
    AccountId, AccountMetadata, AccountStatus, ExecutionId, SagaState, Stage, StageOutcome,
    WorkflowExecution,
};
pub use orchestrator::SagaOrchestrator;
pub use result_ext::ResultExt;
pub use service::TerminationService;

/// Tracing target for audit records (validation rejections, stage
/// transitions, terminal outcomes).
pub const AUDIT_TARGET: &str = "termination.audit";
