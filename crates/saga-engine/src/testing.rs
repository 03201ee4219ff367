//! Fake collaborators for exercising the saga without real endpoints.
//!
//! Everything here is deterministic: executors replay a scripted sequence of
//! outcomes, the flaky store fails on a fixed schedule, and the recording
//! channel keeps every notification for later assertions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::SagaConfig;
use crate::error::{NotificationError, StoreError};
use crate::model::{AccountId, AccountMetadata, MetadataPatch, Stage, StageError, StageOutcome};
use crate::notify::{Channel, NotificationChannel, NotificationDispatcher};
use crate::orchestrator::SagaOrchestrator;
use crate::stage::{StageContext, StageExecutor, StageExecutors};
use crate::store::{InMemoryMetadataStore, MetadataStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Pre-check payload with the given critical resource counts.
pub fn pre_check_payload(account_id: &str, ebs_volumes: u64, rds_instances: u64) -> Value {
    json!({
        "accountId": account_id,
        "safeToTerminate": ebs_volumes == 0 && rds_instances == 0,
        "resourcesFound": {
            "ebsVolumes": ebs_volumes,
            "rdsInstances": rds_instances,
        },
        "timestamp": "2024-01-01T00:00:00Z",
    })
}

/// Account management payload for a suspended account.
pub fn account_management_payload(account_id: &str) -> Value {
    json!({
        "accountId": account_id,
        "suspended": true,
        "closureInitiated": true,
        "organizationalUnit": "ou-suspended",
    })
}

/// Vendor decommission payload with one result per `(vendor, success)` pair.
pub fn vendor_payload(results: &[(&str, bool)]) -> Value {
    let vendors: Vec<&str> = results.iter().map(|(vendor, _)| *vendor).collect();
    let results: serde_json::Map<String, Value> = results
        .iter()
        .map(|(vendor, success)| {
            let message = if *success { "Decommissioned" } else { "Decommission failed" };
            (vendor.to_string(), json!({"success": success, "message": message}))
        })
        .collect();
    json!({"vendorsProcessed": vendors, "results": results})
}

/// Executor replaying a scripted sequence of outcomes.
///
/// Each call consumes the next outcome; the last one repeats forever.
#[derive(Debug)]
pub struct ScriptedExecutor {
    name: String,
    script: Mutex<Vec<StageOutcome>>,
    hang: bool,
    calls: AtomicU32,
    contexts: Mutex<Vec<StageContext>>,
}

impl ScriptedExecutor {
    pub fn new(name: impl Into<String>, script: Vec<StageOutcome>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script),
            hang: false,
            calls: AtomicU32::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_succeeding(name: impl Into<String>, payload: Value) -> Self {
        Self::new(name, vec![StageOutcome::success(payload)])
    }

    pub fn always_failing(name: impl Into<String>, error: StageError) -> Self {
        Self::new(name, vec![StageOutcome::failure(error)])
    }

    /// Never completes.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self {
            hang: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contexts received so far, in call order.
    pub fn contexts(&self) -> Vec<StageContext> {
        lock(&self.contexts).clone()
    }
}

#[async_trait]
impl StageExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _account_id: &AccountId, context: &StageContext) -> StageOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.contexts).push(context.clone());

        if self.hang {
            std::future::pending::<()>().await;
        }

        let mut script = lock(&self.script);
        match script.len() {
            0 => StageOutcome::success(Value::Null),
            1 => script[0].clone(),
            _ => script.remove(0),
        }
    }
}

/// Store that fails on a fixed schedule and otherwise delegates to memory.
#[derive(Debug)]
pub struct FlakyStore {
    inner: InMemoryMetadataStore,
    fail_first: u32,
    succeed_first: Option<u32>,
    error: StoreError,
    upserts: AtomicU32,
}

impl FlakyStore {
    /// Fail the first `n` upserts with `error`, then succeed.
    pub fn failing_first(n: u32, error: StoreError) -> Self {
        Self {
            inner: InMemoryMetadataStore::new(),
            fail_first: n,
            succeed_first: None,
            error,
            upserts: AtomicU32::new(0),
        }
    }

    /// Succeed for the first `k` upserts, then fail every one with `error`.
    pub fn failing_after(k: u32, error: StoreError) -> Self {
        Self {
            succeed_first: Some(k),
            ..Self::failing_first(0, error)
        }
    }

    pub fn upsert_calls(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }

    /// The backing store, sharing state with this one.
    pub fn inner(&self) -> InMemoryMetadataStore {
        self.inner.clone()
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    async fn upsert(
        &self,
        account_id: &AccountId,
        patch: &MetadataPatch,
    ) -> Result<AccountMetadata, StoreError> {
        let call = self.upserts.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = call <= self.fail_first || self.succeed_first.is_some_and(|k| call > k);
        if fails {
            return Err(self.error.clone());
        }
        self.inner.upsert(account_id, patch).await
    }

    async fn get(&self, account_id: &AccountId) -> Result<AccountMetadata, StoreError> {
        self.inner.get(account_id).await
    }
}

/// A notification captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: Channel,
    pub subject: String,
    pub body: Value,
}

/// Channel keeping every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingChannel {
    received: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    pub fn count(&self, channel: Channel) -> usize {
        lock(&self.received)
            .iter()
            .filter(|n| n.channel == channel)
            .count()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, channel: Channel, subject: &str, body: &Value) -> Result<(), NotificationError> {
        lock(&self.received).push(Notification {
            channel,
            subject: subject.to_string(),
            body: body.clone(),
        });
        Ok(())
    }
}

/// Channel that always errors, or never answers.
#[derive(Debug, Default)]
pub struct FailingChannel {
    hang: bool,
}

impl FailingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hanging() -> Self {
        Self { hang: true }
    }
}

#[async_trait]
impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn publish(&self, _channel: Channel, _subject: &str, _body: &Value) -> Result<(), NotificationError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        Err(NotificationError::NotConnected)
    }
}

/// Configuration with jitter disabled so retry delays are exact.
pub fn deterministic_config() -> SagaConfig {
    let mut config = SagaConfig::default();
    for stage in Stage::ALL {
        config.stage_mut(stage).retry.jitter = false;
    }
    config.store.retry.jitter = false;
    config
}

/// A fully wired orchestrator over scripted collaborators.
pub struct Harness {
    pub orchestrator: SagaOrchestrator,
    pub executors: BTreeMap<Stage, Arc<ScriptedExecutor>>,
    pub store: InMemoryMetadataStore,
    pub notifications: Arc<RecordingChannel>,
}

impl Harness {
    /// Builder defaulting to a clean happy path for account `999999999999`.
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn executor(&self, stage: Stage) -> &ScriptedExecutor {
        &self.executors[&stage]
    }

    /// Stored metadata for `account_id`; panics if absent.
    pub async fn metadata(&self, account_id: &str) -> AccountMetadata {
        let account_id = AccountId::parse(account_id, account_id.len()).unwrap();
        self.store.get(&account_id).await.unwrap()
    }
}

pub struct HarnessBuilder {
    config: SagaConfig,
    executors: BTreeMap<Stage, ScriptedExecutor>,
    store: Option<Arc<FlakyStore>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            config: deterministic_config(),
            executors: BTreeMap::new(),
            store: None,
            channels: Vec::new(),
        }
    }
}

impl HarnessBuilder {
    pub fn configure(mut self, f: impl FnOnce(&mut SagaConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn executor(mut self, stage: Stage, executor: ScriptedExecutor) -> Self {
        self.executors.insert(stage, executor);
        self
    }

    pub fn store(mut self, store: FlakyStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn build(mut self) -> Harness {
        const ACCOUNT: &str = "999999999999";
        let mut executors = BTreeMap::new();
        for stage in Stage::ALL {
            let executor = self.executors.remove(&stage).unwrap_or_else(|| {
                let payload = match stage {
                    Stage::PreCheck => pre_check_payload(ACCOUNT, 0, 0),
                    Stage::AccountManagement => account_management_payload(ACCOUNT),
                    Stage::MetadataUpdate => json!({"accountId": ACCOUNT, "recorded": true}),
                    Stage::VendorDecommission => vendor_payload(&[("Prisma", true)]),
                };
                ScriptedExecutor::always_succeeding(stage.as_str(), payload)
            });
            executors.insert(stage, Arc::new(executor));
        }

        let memory = match &self.store {
            Some(flaky) => flaky.inner(),
            None => InMemoryMetadataStore::new(),
        };
        let store: Arc<dyn MetadataStore> = match self.store {
            Some(flaky) => flaky,
            None => Arc::new(memory.clone()),
        };

        let notifications = Arc::new(RecordingChannel::new());
        let mut notifier = NotificationDispatcher::new(self.config.notification_timeout())
            .with_channel(notifications.clone());
        for channel in self.channels {
            notifier = notifier.with_channel(channel);
        }

        let stage_executors = StageExecutors::new(
            executors[&Stage::PreCheck].clone(),
            executors[&Stage::AccountManagement].clone(),
            executors[&Stage::MetadataUpdate].clone(),
            executors[&Stage::VendorDecommission].clone(),
        );
        let orchestrator = SagaOrchestrator::new(self.config, stage_executors, store, notifier);

        Harness {
            orchestrator,
            executors,
            store: memory,
            notifications,
        }
    }
}
