//! In-memory metadata store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::MetadataStore;
use crate::error::StoreError;
use crate::model::{AccountId, AccountMetadata, MetadataPatch};

/// Process-local store, used for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    records: Arc<RwLock<HashMap<AccountId, AccountMetadata>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn upsert(
        &self,
        account_id: &AccountId,
        patch: &MetadataPatch,
    ) -> Result<AccountMetadata, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let record = records
            .entry(account_id.clone())
            .or_insert_with(|| AccountMetadata::new(account_id.clone(), now));

        if let Some(refused) = record.apply(patch, now) {
            tracing::warn!(
                account_id = %account_id,
                current = %record.status,
                requested = %refused,
                "Refused status regression, other fields merged"
            );
        }
        Ok(record.clone())
    }

    async fn get(&self, account_id: &AccountId) -> Result<AccountMetadata, StoreError> {
        self.records
            .read()
            .await
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountStatus, ExecutionId, Stage};
    use serde_json::json;

    fn account() -> AccountId {
        AccountId::parse("123456789012", 12).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_creates_active_record() {
        let store = InMemoryMetadataStore::new();
        let record = store
            .upsert(&account(), &MetadataPatch::for_stage(Stage::PreCheck, ExecutionId::new(), &json!({})))
            .await
            .unwrap();
        assert_eq!(record.status, AccountStatus::Active);
        assert_eq!(store.len().await, 1);
        tokio_test::assert_ok!(store.get(&account()).await);
    }

    #[tokio::test]
    async fn test_same_patch_twice_is_idempotent() {
        let store = InMemoryMetadataStore::new();
        let patch = MetadataPatch::for_stage(
            Stage::AccountManagement,
            ExecutionId::new(),
            &json!({"suspended": true, "organizationalUnit": "ou-closed"}),
        );

        let first = store.upsert(&account(), &patch).await.unwrap();
        let mut second = store.upsert(&account(), &patch).await.unwrap();

        second.updated_at = first.updated_at;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_terminated_never_regresses() {
        let store = InMemoryMetadataStore::new();
        let execution_id = ExecutionId::new();
        store
            .upsert(&account(), &MetadataPatch::for_stage(Stage::VendorDecommission, execution_id, &json!({})))
            .await
            .unwrap();

        let record = store
            .upsert(&account(), &MetadataPatch::for_failure(Stage::MetadataUpdate, execution_id, "late"))
            .await
            .unwrap();

        assert_eq!(record.status, AccountStatus::Terminated);
        assert!(record.failure.is_none());
    }
}
