//! HTTP route handlers for the termination control plane API.

pub mod accounts;
pub mod health;
pub mod terminations;

pub use health::{api_health, health_check};
