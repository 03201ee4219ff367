//! Account identifiers and the persistent account metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SagaError, SagaResult};

use super::execution::{ExecutionId, Stage};

/// Length of a reference-domain account identifier.
pub const DEFAULT_ACCOUNT_ID_DIGITS: usize = 12;

/// Opaque tenant identifier: a fixed-length numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Parse an account identifier of exactly `digits` ASCII digits.
    pub fn parse(raw: &str, digits: usize) -> SagaResult<Self> {
        if raw.len() != digits || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SagaError::Validation(format!(
                "Invalid account ID format: {:?}. Must be {} digits",
                raw, digits
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of an account as recorded by this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Terminating,
    Terminated,
    Failed,
}

impl AccountStatus {
    /// Forward-only transitions. `Failed -> Terminating` is a new attempt;
    /// `Terminated` is absorbing and nothing returns to `Active`.
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        match (self, next) {
            (current, next) if current == next => true,
            (Active, Terminating | Terminated | Failed) => true,
            (Terminating, Terminated | Failed) => true,
            (Failed, Terminating | Terminated) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Terminating => write!(f, "TERMINATING"),
            Self::Terminated => write!(f, "TERMINATED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Last fatal failure recorded against an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureNote {
    pub stage: Stage,
    pub message: String,
}

/// Persistent record keyed by account, independent of any single execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMetadata {
    pub account_id: AccountId,
    pub status: AccountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_check_result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_record: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_execution_id: Option<ExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureNote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_initiated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountMetadata {
    /// Create a fresh `Active` record.
    pub fn new(account_id: AccountId, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            status: AccountStatus::Active,
            pre_check_result: None,
            organizational_unit: None,
            termination_record: None,
            vendor_results: None,
            last_execution_id: None,
            failure: None,
            termination_initiated_at: None,
            termination_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge a patch field by field.
    ///
    /// Only fields present in the patch are overwritten, so applying the same
    /// patch twice leaves the record unchanged apart from `updated_at`.
    /// Returns the requested status when it was refused as a regression; the
    /// failure note travels with its status and is dropped along with it.
    pub fn apply(&mut self, patch: &MetadataPatch, now: DateTime<Utc>) -> Option<AccountStatus> {
        let refused = patch
            .status
            .filter(|next| !self.status.can_transition_to(*next));

        if let Some(value) = &patch.pre_check_result {
            self.pre_check_result = Some(value.clone());
        }
        if let Some(ou) = &patch.organizational_unit {
            self.organizational_unit = Some(ou.clone());
        }
        if let Some(record) = &patch.termination_record {
            self.termination_record = Some(record.clone());
        }
        if let Some(results) = &patch.vendor_results {
            self.vendor_results = Some(results.clone());
        }
        if let Some(execution_id) = patch.execution_id {
            self.last_execution_id = Some(execution_id);
        }
        if refused.is_none() {
            if let Some(failure) = &patch.failure {
                self.failure = Some(failure.clone());
            }
        }

        if let Some(next) = patch.status.filter(|_| refused.is_none()) {
            self.status = next;
            match next {
                AccountStatus::Terminating if self.termination_initiated_at.is_none() => {
                    self.termination_initiated_at = Some(now);
                }
                AccountStatus::Terminated => {
                    if self.termination_completed_at.is_none() {
                        self.termination_completed_at = Some(now);
                    }
                    self.failure = None;
                }
                _ => {}
            }
        }

        self.updated_at = now;
        refused
    }
}

/// Partial update of an [`AccountMetadata`] record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_check_result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination_record: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureNote>,
}

impl MetadataPatch {
    /// Patch recording the outcome of a successful (or tolerated) stage.
    pub fn for_stage(stage: Stage, execution_id: ExecutionId, payload: &serde_json::Value) -> Self {
        let mut patch = Self {
            execution_id: Some(execution_id),
            ..Self::default()
        };
        match stage {
            Stage::PreCheck => {
                patch.pre_check_result = Some(payload.clone());
            }
            Stage::AccountManagement => {
                patch.status = Some(AccountStatus::Terminating);
                patch.organizational_unit = payload
                    .get("organizationalUnit")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
            }
            Stage::MetadataUpdate => {
                patch.termination_record = Some(payload.clone());
            }
            Stage::VendorDecommission => {
                patch.status = Some(AccountStatus::Terminated);
                patch.vendor_results = Some(payload.clone());
            }
        }
        patch
    }

    /// Patch recording a fatal failure.
    pub fn for_failure(stage: Stage, execution_id: ExecutionId, message: &str) -> Self {
        Self {
            status: Some(AccountStatus::Failed),
            execution_id: Some(execution_id),
            failure: Some(FailureNote {
                stage,
                message: message.to_string(),
            }),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn account() -> AccountId {
        AccountId::parse("123456789012", DEFAULT_ACCOUNT_ID_DIGITS).unwrap()
    }

    #[test]
    fn test_account_id_parse() {
        assert!(AccountId::parse("999999999999", 12).is_ok());
        assert!(AccountId::parse("12345678901", 12).is_err());
        assert!(AccountId::parse("1234567890123", 12).is_err());
        assert!(AccountId::parse("12345678901a", 12).is_err());
        assert!(AccountId::parse("", 12).is_err());
        assert!(AccountId::parse(" 23456789012", 12).is_err());
    }

    #[test]
    fn test_account_id_error_message() {
        let err = AccountId::parse("abc", 12).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Invalid account ID format: \"abc\". Must be 12 digits"
        );
    }

    #[test]
    fn test_status_transitions() {
        use AccountStatus::*;
        assert!(Active.can_transition_to(Terminating));
        assert!(Terminating.can_transition_to(Terminated));
        assert!(Terminating.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Terminating));
        assert!(Terminated.can_transition_to(Terminated));

        assert!(!Terminated.can_transition_to(Active));
        assert!(!Terminated.can_transition_to(Failed));
        assert!(!Terminated.can_transition_to(Terminating));
        assert!(!Failed.can_transition_to(Active));
        assert!(!Terminating.can_transition_to(Active));
    }

    #[test]
    fn test_apply_same_patch_twice_is_idempotent() {
        let now = Utc::now();
        let patch = MetadataPatch::for_stage(
            Stage::AccountManagement,
            ExecutionId::new(),
            &json!({"organizationalUnit": "ou-susp-1234"}),
        );

        let mut once = AccountMetadata::new(account(), now);
        once.apply(&patch, now);

        let mut twice = once.clone();
        twice.apply(&patch, now + Duration::seconds(5));

        assert_eq!(twice.updated_at, now + Duration::seconds(5));
        twice.updated_at = once.updated_at;
        assert_eq!(once, twice);
        assert_eq!(once.status, AccountStatus::Terminating);
        assert_eq!(once.organizational_unit.as_deref(), Some("ou-susp-1234"));
    }

    #[test]
    fn test_apply_merges_per_field() {
        let now = Utc::now();
        let execution_id = ExecutionId::new();
        let mut record = AccountMetadata::new(account(), now);
        record.apply(
            &MetadataPatch::for_stage(Stage::PreCheck, execution_id, &json!({"safe": true})),
            now,
        );
        record.apply(
            &MetadataPatch::for_stage(Stage::MetadataUpdate, execution_id, &json!({"recorded": true})),
            now,
        );

        assert_eq!(record.pre_check_result, Some(json!({"safe": true})));
        assert_eq!(record.termination_record, Some(json!({"recorded": true})));
        assert_eq!(record.status, AccountStatus::Active);
    }

    #[test]
    fn test_terminated_never_regresses() {
        let now = Utc::now();
        let mut record = AccountMetadata::new(account(), now);
        record.status = AccountStatus::Terminated;

        let refused = record.apply(
            &MetadataPatch::for_failure(Stage::PreCheck, ExecutionId::new(), "boom"),
            now,
        );

        assert_eq!(refused, Some(AccountStatus::Failed));
        assert_eq!(record.status, AccountStatus::Terminated);
        assert!(record.failure.is_none());
    }

    #[test]
    fn test_refused_status_still_merges_other_fields() {
        let now = Utc::now();
        let mut record = AccountMetadata::new(account(), now);
        record.status = AccountStatus::Terminated;
        let patch = MetadataPatch {
            status: Some(AccountStatus::Terminating),
            organizational_unit: Some("ou-late".to_string()),
            ..MetadataPatch::for_failure(Stage::AccountManagement, ExecutionId::new(), "late")
        };

        assert_eq!(record.apply(&patch, now), Some(AccountStatus::Terminating));
        assert_eq!(record.status, AccountStatus::Terminated);
        assert_eq!(record.organizational_unit.as_deref(), Some("ou-late"));
        assert!(record.failure.is_none());
    }

    #[test]
    fn test_termination_timestamps_are_fixed_at_first_transition() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(10);
        let mut record = AccountMetadata::new(account(), t0);
        let terminating = MetadataPatch {
            status: Some(AccountStatus::Terminating),
            ..MetadataPatch::default()
        };

        record.apply(&terminating, t0);
        record.apply(&terminating, t1);

        assert_eq!(record.termination_initiated_at, Some(t0));
        assert_eq!(record.created_at, t0);
        assert_eq!(record.updated_at, t1);
    }

    #[test]
    fn test_metadata_serialization() {
        let record = AccountMetadata::new(account(), Utc::now());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["accountId"], json!("123456789012"));
        assert_eq!(value["status"], json!("ACTIVE"));
        assert!(value.get("vendorResults").is_none());
    }
}
