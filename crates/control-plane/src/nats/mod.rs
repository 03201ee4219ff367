//! NATS JetStream integration for the termination control plane.
//!
//! Publishes terminal saga notifications to JetStream.

pub mod publisher;

pub use publisher::NatsChannel;
