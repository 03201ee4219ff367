//! Notification channel writing to the tracing log.

use async_trait::async_trait;

use super::{Channel, NotificationChannel};
use crate::error::NotificationError;
use crate::AUDIT_TARGET;

/// Emits every notification as an audit log record.
#[derive(Debug, Clone, Default)]
pub struct LogChannel;

impl LogChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(
        &self,
        channel: Channel,
        subject: &str,
        body: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let body = serde_json::to_string(body)?;
        match channel {
            Channel::Success => {
                tracing::info!(target: AUDIT_TARGET, channel = %channel, subject, body = %body, "Notification")
            }
            Channel::Failure | Channel::SafetyViolation => {
                tracing::warn!(target: AUDIT_TARGET, channel = %channel, subject, body = %body, "Notification")
            }
        }
        Ok(())
    }
}
