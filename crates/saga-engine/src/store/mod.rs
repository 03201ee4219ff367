//! Metadata store client.
//!
//! The persistence backend sits behind [`MetadataStore`]. The orchestrator only
//! talks to [`MetadataStoreClient`], which bounds every call with a timeout and
//! retries transient backend failures with its own [`RetryPolicy`].

mod memory;

pub use memory::InMemoryMetadataStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::StageConfig;
use crate::error::StoreError;
use crate::model::{AccountId, AccountMetadata, MetadataPatch};
use crate::retry::{RetryFailure, RetryPolicy};

/// Persistence backend for [`AccountMetadata`] records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Merge `patch` into the record for `account_id`, creating it if needed.
    ///
    /// Must be idempotent: applying the same patch twice yields the same
    /// record apart from `updated_at`.
    async fn upsert(
        &self,
        account_id: &AccountId,
        patch: &MetadataPatch,
    ) -> Result<AccountMetadata, StoreError>;

    async fn get(&self, account_id: &AccountId) -> Result<AccountMetadata, StoreError>;
}

/// Retrying, timeout-bounded wrapper around a [`MetadataStore`].
#[derive(Clone)]
pub struct MetadataStoreClient {
    store: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl MetadataStoreClient {
    pub fn new(store: Arc<dyn MetadataStore>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            store,
            retry,
            timeout,
        }
    }

    pub fn from_config(store: Arc<dyn MetadataStore>, config: &StageConfig) -> Self {
        Self::new(store, config.retry_policy(), config.timeout())
    }

    /// Upsert with retries. Returns the last error once retries are exhausted
    /// or the backend refuses the write.
    pub async fn upsert(
        &self,
        account_id: &AccountId,
        patch: &MetadataPatch,
    ) -> Result<AccountMetadata, RetryFailure<StoreError>> {
        let result = self
            .retry
            .run(move |_| async move {
                self.bounded(self.store.upsert(account_id, patch)).await
            })
            .await;

        match result {
            Ok(done) => {
                tracing::debug!(
                    account_id = %account_id,
                    attempts = done.attempts,
                    status = %done.value.status,
                    "Metadata upserted"
                );
                Ok(done.value)
            }
            Err(failure) => {
                tracing::error!(
                    account_id = %account_id,
                    attempts = failure.attempts,
                    exhausted = failure.exhausted,
                    error = %failure.error,
                    "Metadata upsert failed"
                );
                Err(failure)
            }
        }
    }

    pub async fn get(&self, account_id: &AccountId) -> Result<AccountMetadata, StoreError> {
        self.retry
            .run(move |_| async move { self.bounded(self.store.get(account_id)).await })
            .await
            .map(|done| done.value)
            .map_err(|failure| failure.error)
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Unavailable(format!(
                "Store call timed out after {} ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountStatus, ExecutionId, Stage};
    use crate::testing::FlakyStore;
    use serde_json::json;

    fn account() -> AccountId {
        AccountId::parse("999999999999", 12).unwrap()
    }

    fn client(store: Arc<dyn MetadataStore>) -> MetadataStoreClient {
        MetadataStoreClient::new(
            store,
            RetryPolicy::new(3, Duration::from_secs(1)),
            Duration::from_secs(5),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_retries_transient_failures() {
        let store = Arc::new(FlakyStore::failing_first(2, StoreError::Throttled("slow".into())));
        let client = client(store.clone());

        let patch = MetadataPatch::for_stage(Stage::PreCheck, ExecutionId::new(), &json!({"ok": true}));
        let record = client.upsert(&account(), &patch).await.unwrap();

        assert_eq!(record.pre_check_result, Some(json!({"ok": true})));
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_exhaustion_is_reported() {
        let store = Arc::new(FlakyStore::failing_first(10, StoreError::Unavailable("down".into())));
        let client = client(store.clone());

        let patch = MetadataPatch::for_failure(Stage::AccountManagement, ExecutionId::new(), "denied");
        let failure = client.upsert(&account(), &patch).await.unwrap_err();

        assert!(failure.exhausted);
        assert_eq!(failure.attempts, 3);
        assert_eq!(store.upsert_calls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_write_is_not_retried() {
        let store = Arc::new(FlakyStore::failing_first(10, StoreError::Rejected("denied".into())));
        let client = client(store.clone());

        let patch = MetadataPatch::for_stage(Stage::MetadataUpdate, ExecutionId::new(), &json!({}));
        let failure = client.upsert(&account(), &patch).await.unwrap_err();

        assert!(!failure.exhausted);
        assert_eq!(store.upsert_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_account() {
        let client = client(Arc::new(InMemoryMetadataStore::new()));
        let err = client.get(&account()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_after_upsert() {
        let client = client(Arc::new(InMemoryMetadataStore::new()));
        let patch = MetadataPatch::for_stage(
            Stage::AccountManagement,
            ExecutionId::new(),
            &json!({"organizationalUnit": "ou-suspended"}),
        );
        client.upsert(&account(), &patch).await.unwrap();

        let record = client.get(&account()).await.unwrap();
        assert_eq!(record.status, AccountStatus::Terminating);
        assert_eq!(record.organizational_unit.as_deref(), Some("ou-suspended"));
    }
}
