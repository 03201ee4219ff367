//! Notification dispatcher.
//!
//! Terminal outcomes fan out to every configured [`NotificationChannel`].
//! Delivery is best effort: each channel is bounded by a timeout, and a
//! failing channel is logged and dropped without affecting the saga.

mod log;

pub use self::log::LogChannel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::NotificationError;
use crate::result_ext::ResultExt;

/// Logical notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Success,
    Failure,
    SafetyViolation,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::SafetyViolation => "safety_violation",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery mechanism (event topic, webhook, log sink, ...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(
        &self,
        channel: Channel,
        subject: &str,
        body: &serde_json::Value,
    ) -> Result<(), NotificationError>;
}

/// Fans a notification out to every configured channel.
#[derive(Clone)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn NotificationChannel>>,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sinks: Vec::new(),
            timeout,
        }
    }

    pub fn with_channel(mut self, sink: Arc<dyn NotificationChannel>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    /// Publish to every channel. Never fails; returns how many channels
    /// accepted the notification.
    pub async fn notify(&self, channel: Channel, subject: &str, body: &serde_json::Value) -> usize {
        if self.sinks.is_empty() {
            tracing::warn!(channel = %channel, subject, "No notification channels configured");
            return 0;
        }

        let deliveries = self.sinks.iter().map(|sink| async move {
            let result = match tokio::time::timeout(self.timeout, sink.publish(channel, subject, body)).await {
                Ok(result) => result,
                Err(_) => Err(NotificationError::Publish(format!(
                    "timed out after {} ms",
                    self.timeout.as_millis()
                ))),
            };
            result
                .log(format!("notifying {} via {}", channel, sink.name()))
                .is_ok()
        });

        let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();
        tracing::debug!(
            channel = %channel,
            subject,
            delivered,
            configured = self.sinks.len(),
            "Notification dispatched"
        );
        delivered
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("sinks", &self.channel_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingChannel, RecordingChannel};
    use serde_json::json;

    #[tokio::test]
    async fn test_fan_out_to_every_channel() {
        let first = Arc::new(RecordingChannel::new());
        let second = Arc::new(RecordingChannel::new());
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(1))
            .with_channel(first.clone())
            .with_channel(second.clone());

        let delivered = dispatcher
            .notify(Channel::Success, "Account termination succeeded: 999999999999", &json!({}))
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(first.count(Channel::Success), 1);
        assert_eq!(second.count(Channel::Success), 1);
    }

    #[tokio::test]
    async fn test_failing_channel_is_dropped() {
        let recorder = Arc::new(RecordingChannel::new());
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(1))
            .with_channel(Arc::new(FailingChannel::new()))
            .with_channel(recorder.clone());

        let delivered = dispatcher.notify(Channel::Failure, "failed", &json!({})).await;

        assert_eq!(delivered, 1);
        assert_eq!(recorder.count(Channel::Failure), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_channel_times_out() {
        let dispatcher = NotificationDispatcher::new(Duration::from_millis(50))
            .with_channel(Arc::new(FailingChannel::hanging()));

        let delivered = dispatcher
            .notify(Channel::SafetyViolation, "halted", &json!({}))
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let dispatcher = NotificationDispatcher::new(Duration::from_secs(1));
        assert_eq!(dispatcher.notify(Channel::Success, "s", &json!({})).await, 0);
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(Channel::SafetyViolation.to_string(), "safety_violation");
        assert_eq!(serde_json::to_value(Channel::Failure).unwrap(), json!("failure"));
    }
}
