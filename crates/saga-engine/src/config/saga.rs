//! Saga, per-stage and store retry configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::model::{Stage, DEFAULT_ACCOUNT_ID_DIGITS};
use crate::registry::Retention;
use crate::retry::RetryPolicy;
use crate::safety::DEFAULT_CRITICAL_RESOURCES;

/// Exponential backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after every retry.
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay in milliseconds.
    pub max_delay_ms: u64,
    /// Add 10-30% random jitter to every delay.
    pub jitter: bool,
}

impl RetryConfig {
    /// Build the retry policy described by this configuration.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.initial_delay_ms))
            .with_multiplier(self.backoff_multiplier)
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
    }
}

/// Timeout and retry profile of one stage (or of the metadata store).
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// Time allowed for a single attempt, in seconds.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

/// Environment overrides for a [`StageConfig`]; unset fields keep the default.
#[derive(Debug, Default, Deserialize)]
struct StageOverrides {
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    initial_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    max_delay_ms: Option<u64>,
    jitter: Option<bool>,
}

impl StageConfig {
    /// Default profile for a stage: 3 attempts, 2 s initial delay, x2.0, 30 s cap.
    pub fn stage_default() -> Self {
        Self {
            timeout_secs: 300,
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 2_000,
                backoff_multiplier: 2.0,
                max_delay_ms: 30_000,
                jitter: true,
            },
        }
    }

    /// Default profile for the vendor stage: shorter timeout per attempt.
    pub fn vendor_default() -> Self {
        Self {
            timeout_secs: 120,
            ..Self::stage_default()
        }
    }

    /// Default profile for metadata store writes: 3 attempts, 1 s, x2.0, 16 s cap.
    pub fn store_default() -> Self {
        Self {
            timeout_secs: 30,
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1_000,
                backoff_multiplier: 2.0,
                max_delay_ms: 16_000,
                jitter: true,
            },
        }
    }

    /// Load a profile from variables sharing `prefix`, falling back to `defaults`.
    ///
    /// With prefix `TERMINATION_VENDOR_DECOMMISSION_` the recognised variables
    /// are `..._TIMEOUT_SECS`, `..._MAX_ATTEMPTS`, `..._INITIAL_DELAY_MS`,
    /// `..._BACKOFF_MULTIPLIER`, `..._MAX_DELAY_MS` and `..._JITTER`.
    pub fn from_env(prefix: &str, defaults: StageConfig) -> Result<Self, envy::Error> {
        let overrides = envy::prefixed(prefix).from_env::<StageOverrides>()?;
        Ok(defaults.with_overrides(overrides))
    }

    fn with_overrides(self, o: StageOverrides) -> Self {
        Self {
            timeout_secs: o.timeout_secs.unwrap_or(self.timeout_secs),
            retry: RetryConfig {
                max_attempts: o.max_attempts.unwrap_or(self.retry.max_attempts),
                initial_delay_ms: o.initial_delay_ms.unwrap_or(self.retry.initial_delay_ms),
                backoff_multiplier: o.backoff_multiplier.unwrap_or(self.retry.backoff_multiplier),
                max_delay_ms: o.max_delay_ms.unwrap_or(self.retry.max_delay_ms),
                jitter: o.jitter.unwrap_or(self.retry.jitter),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }
}

/// Saga-wide settings loaded from `TERMINATION_` variables.
#[derive(Debug, Deserialize)]
struct GeneralSettings {
    #[serde(default = "default_account_id_digits")]
    account_id_digits: usize,
    #[serde(default = "default_critical_resources")]
    critical_resources: Vec<String>,
    #[serde(default = "default_notification_timeout_ms")]
    notification_timeout_ms: u64,
    #[serde(default = "default_registry_max_entries")]
    registry_max_entries: usize,
    #[serde(default = "default_registry_max_age_secs")]
    registry_max_age_secs: u64,
    #[serde(default = "default_shutdown_grace_secs")]
    shutdown_grace_secs: u64,
}

fn default_account_id_digits() -> usize {
    DEFAULT_ACCOUNT_ID_DIGITS
}

fn default_critical_resources() -> Vec<String> {
    DEFAULT_CRITICAL_RESOURCES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_notification_timeout_ms() -> u64 {
    5_000
}

fn default_registry_max_entries() -> usize {
    10_000
}

fn default_registry_max_age_secs() -> u64 {
    86_400
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Complete saga configuration.
///
/// Environment variables:
/// - `TERMINATION_ACCOUNT_ID_DIGITS`: account identifier length (default: 12)
/// - `TERMINATION_CRITICAL_RESOURCES`: comma-separated resource categories
///   checked by the safety gate (default: "ebsVolumes,rdsInstances")
/// - `TERMINATION_NOTIFICATION_TIMEOUT_MS`: per-channel publish bound (default: 5000)
/// - `TERMINATION_REGISTRY_MAX_ENTRIES`: execution snapshots kept in memory (default: 10000)
/// - `TERMINATION_REGISTRY_MAX_AGE_SECS`: how long finished executions stay
///   describable (default: 86400)
/// - `TERMINATION_SHUTDOWN_GRACE_SECS`: time in-flight sagas get to finish on
///   shutdown before they are interrupted (default: 30)
/// - `TERMINATION_PRE_CHECK_*`, `TERMINATION_ACCOUNT_MANAGEMENT_*`,
///   `TERMINATION_METADATA_UPDATE_*`, `TERMINATION_VENDOR_DECOMMISSION_*`:
///   per-stage profiles (see [`StageConfig::from_env`])
/// - `TERMINATION_STORE_RETRY_*`: metadata store write profile
#[derive(Debug, Clone, PartialEq)]
pub struct SagaConfig {
    pub account_id_digits: usize,
    pub critical_resources: Vec<String>,
    pub notification_timeout_ms: u64,
    pub registry_max_entries: usize,
    pub registry_max_age_secs: u64,
    pub shutdown_grace_secs: u64,
    pub pre_check: StageConfig,
    pub account_management: StageConfig,
    pub metadata_update: StageConfig,
    pub vendor_decommission: StageConfig,
    pub store: StageConfig,
}

impl SagaConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        let general = envy::prefixed("TERMINATION_").from_env::<GeneralSettings>()?;

        Ok(Self {
            account_id_digits: general.account_id_digits,
            critical_resources: general.critical_resources,
            notification_timeout_ms: general.notification_timeout_ms,
            registry_max_entries: general.registry_max_entries,
            registry_max_age_secs: general.registry_max_age_secs,
            shutdown_grace_secs: general.shutdown_grace_secs,
            pre_check: StageConfig::from_env("TERMINATION_PRE_CHECK_", StageConfig::stage_default())?,
            account_management: StageConfig::from_env(
                "TERMINATION_ACCOUNT_MANAGEMENT_",
                StageConfig::stage_default(),
            )?,
            metadata_update: StageConfig::from_env(
                "TERMINATION_METADATA_UPDATE_",
                StageConfig::stage_default(),
            )?,
            vendor_decommission: StageConfig::from_env(
                "TERMINATION_VENDOR_DECOMMISSION_",
                StageConfig::vendor_default(),
            )?,
            store: StageConfig::from_env("TERMINATION_STORE_RETRY_", StageConfig::store_default())?,
        })
    }

    /// Profile of the given stage.
    pub fn stage(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::PreCheck => &self.pre_check,
            Stage::AccountManagement => &self.account_management,
            Stage::MetadataUpdate => &self.metadata_update,
            Stage::VendorDecommission => &self.vendor_decommission,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageConfig {
        match stage {
            Stage::PreCheck => &mut self.pre_check,
            Stage::AccountManagement => &mut self.account_management,
            Stage::MetadataUpdate => &mut self.metadata_update,
            Stage::VendorDecommission => &mut self.vendor_decommission,
        }
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn registry_retention(&self) -> Retention {
        Retention {
            max_entries: self.registry_max_entries,
            max_age: Duration::from_secs(self.registry_max_age_secs),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            account_id_digits: default_account_id_digits(),
            critical_resources: default_critical_resources(),
            notification_timeout_ms: default_notification_timeout_ms(),
            registry_max_entries: default_registry_max_entries(),
            registry_max_age_secs: default_registry_max_age_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            pre_check: StageConfig::stage_default(),
            account_management: StageConfig::stage_default(),
            metadata_update: StageConfig::stage_default(),
            vendor_decommission: StageConfig::vendor_default(),
            store: StageConfig::store_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SagaConfig::default();
        assert_eq!(config.account_id_digits, 12);
        assert_eq!(config.critical_resources, vec!["ebsVolumes", "rdsInstances"]);
        assert_eq!(config.pre_check.retry.max_attempts, 3);
        assert_eq!(config.pre_check.retry.initial_delay_ms, 2_000);
        assert_eq!(config.pre_check.retry.backoff_multiplier, 2.0);
        assert_eq!(config.store.retry.initial_delay_ms, 1_000);
        assert_eq!(config.store.retry.max_delay_ms, 16_000);
        assert_eq!(config.vendor_decommission.timeout(), Duration::from_secs(120));
        assert_eq!(config.registry_retention().max_entries, 10_000);
        assert_eq!(config.registry_retention().max_age, Duration::from_secs(86_400));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(30));
    }

    #[test]
    fn test_stage_lookup() {
        let mut config = SagaConfig::default();
        config.stage_mut(Stage::MetadataUpdate).retry.max_attempts = 7;
        assert_eq!(config.stage(Stage::MetadataUpdate).retry.max_attempts, 7);
        assert_eq!(config.stage(Stage::AccountManagement).retry.max_attempts, 3);
    }

    #[test]
    fn test_overrides_keep_unset_defaults() {
        let overrides = StageOverrides {
            max_attempts: Some(5),
            jitter: Some(false),
            ..StageOverrides::default()
        };
        let config = StageConfig::store_default().with_overrides(overrides);
        assert_eq!(config.retry.max_attempts, 5);
        assert!(!config.retry.jitter);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = StageConfig::stage_default().retry_policy();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
    }
}
