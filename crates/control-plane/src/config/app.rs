//! Application configuration for the termination control plane.

use serde::Deserialize;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `TERMINATION_`:
/// - `TERMINATION_HOST`: Server bind address (default: "0.0.0.0")
/// - `TERMINATION_PORT`: Server port (default: 8090)
/// - `TERMINATION_SERVER_NAME`: Server name for identification
/// - `TERMINATION_NATS_URL`: NATS URL for notifications (optional)
/// - `TERMINATION_NOTIFICATION_SUBJECT`: Subject prefix for notifications
///   (default: "termination.notifications")
/// - `TERMINATION_NOTIFICATION_STREAM`: JetStream stream name
///   (default: "termination_notifications")
/// - `TERMINATION_LOG_FORMAT`: "text" or "json" (default: "text")
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// NATS URL (optional)
    #[serde(default)]
    pub nats_url: Option<String>,

    #[serde(default = "default_notification_subject")]
    pub notification_subject: String,

    #[serde(default = "default_notification_stream")]
    pub notification_stream: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_server_name() -> String {
    "termination-control-plane".to_string()
}

fn default_notification_subject() -> String {
    "termination.notifications".to_string()
}

fn default_notification_stream() -> String {
    "termination_notifications".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `TERMINATION_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TERMINATION_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            server_name: default_server_name(),
            nats_url: None,
            notification_subject: default_notification_subject(),
            notification_stream: default_notification_stream(),
            log_format: LogFormat::default(),
        }
    }
}
