//! Configuration module for the termination control plane.
//!
//! This module provides configuration loading from environment variables
//! using the `envy` crate for type-safe environment variable parsing.
//! Saga-level settings (retry profiles, timeouts, safety gate) live in
//! [`termination_saga::config`].

mod app;
mod endpoints;

pub use app::{AppConfig, LogFormat};
pub use endpoints::EndpointConfig;
