//! Configuration for the termination saga.
//!
//! Configuration is loaded once at process start from environment variables
//! using the `envy` crate and passed explicitly into the orchestrator and its
//! collaborators.

mod saga;

pub use saga::{RetryConfig, SagaConfig, StageConfig};
