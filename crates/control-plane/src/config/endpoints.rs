//! Stage endpoint configuration.

use serde::Deserialize;
use termination_saga::model::Stage;

/// Base URL of the service implementing each stage.
///
/// Environment variables are prefixed with `TERMINATION_ENDPOINT_`:
/// - `TERMINATION_ENDPOINT_PRE_CHECK`
/// - `TERMINATION_ENDPOINT_ACCOUNT_MANAGEMENT`
/// - `TERMINATION_ENDPOINT_METADATA_UPDATE`
/// - `TERMINATION_ENDPOINT_VENDOR_DECOMMISSION`
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_pre_check")]
    pub pre_check: String,

    #[serde(default = "default_account_management")]
    pub account_management: String,

    #[serde(default = "default_metadata_update")]
    pub metadata_update: String,

    #[serde(default = "default_vendor_decommission")]
    pub vendor_decommission: String,
}

fn default_pre_check() -> String {
    "http://localhost:8091/pre-check".to_string()
}

fn default_account_management() -> String {
    "http://localhost:8091/account-management".to_string()
}

fn default_metadata_update() -> String {
    "http://localhost:8091/metadata-update".to_string()
}

fn default_vendor_decommission() -> String {
    "http://localhost:8091/vendor-decommission".to_string()
}

impl EndpointConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("TERMINATION_ENDPOINT_").from_env::<EndpointConfig>()
    }

    pub fn url(&self, stage: Stage) -> &str {
        match stage {
            Stage::PreCheck => &self.pre_check,
            Stage::AccountManagement => &self.account_management,
            Stage::MetadataUpdate => &self.metadata_update,
            Stage::VendorDecommission => &self.vendor_decommission,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            pre_check: default_pre_check(),
            account_management: default_account_management(),
            metadata_update: default_metadata_update(),
            vendor_decommission: default_vendor_decommission(),
        }
    }
}
