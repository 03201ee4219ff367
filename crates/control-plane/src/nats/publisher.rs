//! NATS notification channel.
//!
//! Terminal saga outcomes are published as JSON to
//! `<subject>.<channel>`, e.g. `termination.notifications.safety_violation`,
//! on a JetStream stream covering `<subject>.>`.

use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use termination_saga::error::NotificationError;
use termination_saga::notify::{Channel, NotificationChannel};
use thiserror::Error;

/// Default NATS subject prefix for notifications.
pub const DEFAULT_SUBJECT: &str = "termination.notifications";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "termination_notifications";

/// Errors that can occur while setting up the channel.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("JetStream error: {0}")]
    JetStream(String),
}

/// Notification message published to NATS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMessage {
    pub channel: Channel,
    pub subject: String,
    pub body: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// JetStream-backed notification channel.
#[derive(Clone)]
pub struct NatsChannel {
    /// JetStream context.
    js: Context,

    /// Subject prefix.
    subject: String,
}

impl NatsChannel {
    /// Create a channel from a connected client, creating the stream if needed.
    pub async fn new(
        client: async_nats::Client,
        subject: Option<&str>,
        stream_name: Option<&str>,
    ) -> Result<Self, NatsError> {
        let subject = subject.unwrap_or(DEFAULT_SUBJECT).to_string();
        let stream = stream_name.unwrap_or(DEFAULT_STREAM);

        let js = jetstream::new(client);
        Self::ensure_stream(&js, stream, &subject).await?;

        Ok(Self { js, subject })
    }

    /// Ensure the JetStream stream exists.
    async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<(), NatsError> {
        match js.get_stream(stream).await {
            Ok(_) => {
                tracing::debug!(stream = %stream, "Using existing NATS stream");
                Ok(())
            }
            Err(_) => {
                let config = jetstream::stream::Config {
                    name: stream.to_string(),
                    subjects: vec![format!("{}.>", subject)],
                    max_age: std::time::Duration::from_secs(7 * 24 * 3600),
                    storage: jetstream::stream::StorageType::File,
                    ..Default::default()
                };

                js.create_stream(config)
                    .await
                    .map_err(|e| NatsError::JetStream(e.to_string()))?;

                tracing::info!(stream = %stream, subject = %subject, "Created NATS stream");
                Ok(())
            }
        }
    }

    /// Subject a notification on `channel` is published to.
    pub fn subject_for(&self, channel: Channel) -> String {
        subject_for(&self.subject, channel)
    }
}

fn subject_for(prefix: &str, channel: Channel) -> String {
    format!("{}.{}", prefix, channel)
}

#[async_trait]
impl NotificationChannel for NatsChannel {
    fn name(&self) -> &str {
        "nats"
    }

    async fn publish(
        &self,
        channel: Channel,
        subject: &str,
        body: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let message = NotificationMessage {
            channel,
            subject: subject.to_string(),
            body: body.clone(),
            published_at: Utc::now(),
        };
        let payload = serde_json::to_vec(&message)?;
        let nats_subject = self.subject_for(channel);

        self.js
            .publish(nats_subject.clone(), payload.into())
            .await
            .map_err(|e| NotificationError::Publish(e.to_string()))?
            .await
            .map_err(|e| NotificationError::Publish(e.to_string()))?;

        tracing::debug!(subject = %nats_subject, channel = %channel, "Published notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subject_per_channel() {
        assert_eq!(
            subject_for(DEFAULT_SUBJECT, Channel::SafetyViolation),
            "termination.notifications.safety_violation"
        );
        assert_eq!(subject_for("acme", Channel::Success), "acme.success");
    }

    #[test]
    fn test_notification_message_serialization() {
        let message = NotificationMessage {
            channel: Channel::Failure,
            subject: "Account termination failed: 999999999999".to_string(),
            body: json!({"state": "Failed"}),
            published_at: Utc::now(),
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["channel"], json!("failure"));
        assert_eq!(value["body"]["state"], json!("Failed"));
        assert!(value.get("publishedAt").is_some());
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_SUBJECT, "termination.notifications");
        assert_eq!(DEFAULT_STREAM, "termination_notifications");
    }
}
