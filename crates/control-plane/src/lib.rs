//! Account Termination Control Plane
//!
//! This crate hosts the termination saga behind an HTTP API:
//!
//! - **Trigger**: `POST /api/terminations` validates the account and starts a saga
//! - **Query**: execution snapshots, per-stage summaries and account metadata
//! - **Stage endpoints**: each saga stage calls a remote service over HTTP
//! - **Notifications**: terminal outcomes go to the log and, when configured, NATS JetStream
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`error`]: Custom error types with Axum integration
//! - [`executor`]: HTTP-backed stage executors
//! - [`handlers`]: HTTP route handlers
//! - [`nats`]: JetStream notification channel
//! - [`router`]: Route table
//! - [`state`]: Shared application state
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use termination_control_plane::{config::*, executor::http_executors, router::build_router, state::AppState};
//! use termination_saga::{config::SagaConfig, notify::*, store::InMemoryMetadataStore, *};
//!
//! let saga_config = SagaConfig::from_env()?;
//! let executors = http_executors(reqwest::Client::new(), &EndpointConfig::from_env()?);
//! let notifier = NotificationDispatcher::new(saga_config.notification_timeout())
//!     .with_channel(Arc::new(LogChannel::new()));
//! let orchestrator = SagaOrchestrator::new(saga_config, executors, Arc::new(InMemoryMetadataStore::new()), notifier);
//! let state = AppState::new(TerminationService::new(orchestrator), AppConfig::from_env()?, None);
//! let app = build_router(state);
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod nats;
pub mod router;
pub mod state;

pub use error::{AppError, AppResult};
