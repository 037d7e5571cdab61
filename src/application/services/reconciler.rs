use super::reconcile_report::{EntryOutcome, EntryReport, ReconcileReport};
use crate::application::ports::entity_store::{
    EntityStore, FailureOutcome, FailureReport, SuccessOutcome,
};
use crate::application::ports::image_store::ImageStore;
use crate::application::ports::remote_api::{RemoteAck, RemoteApi, RemoteError};
use crate::domain::entities::{OutboxEntry, StoredRecord};
use crate::domain::sync::RetryPolicy;
use crate::domain::value_objects::{EntityType, OutboxOperation};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilerOptions {
    pub retry_policy: RetryPolicy,
    pub request_timeout: Duration,
    /// Concurrent requests within one tier.
    pub concurrency: usize,
}

impl ReconcilerOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retry_policy: config.sync.retry_policy(),
            request_timeout: config.remote.timeout(),
            concurrency: config.sync.concurrency,
        }
    }
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            concurrency: 4,
        }
    }
}

/// Replays the outbox against the remote API. Passes are single-flight; a
/// pass started while another runs returns a skipped report.
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
    remote: Arc<dyn RemoteApi>,
    images: Option<Arc<dyn ImageStore>>,
    options: ReconcilerOptions,
    gate: Mutex<()>,
    /// Token of the pass holding `gate`. Only the gate holder writes it.
    active: Mutex<Option<CancellationToken>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn EntityStore>,
        remote: Arc<dyn RemoteApi>,
        options: ReconcilerOptions,
    ) -> Self {
        Self {
            store,
            remote,
            images: None,
            options,
            gate: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    pub fn is_running(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Cancels the pass in progress. Returns `false` when none is running.
    pub async fn cancel_running(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Replays every active entry whose backoff has elapsed.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> ReconcileReport {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("Reconcile pass already running");
            return ReconcileReport::skipped(now_millis());
        };

        *self.active.lock().await = Some(cancel.clone());
        let mut report = ReconcileReport::started(now_millis());
        if self.prepare(&mut report).await {
            match self.store.due_entries(report.started_at).await {
                Ok(entries) => self.drain(entries, cancel, &mut report).await,
                Err(err) => {
                    error!(error = %err, "Failed to load outbox");
                    report.storage_error = Some(err.to_string());
                }
            }
        }
        self.finish(report, cancel).await
    }

    /// Replays the given entries regardless of their backoff.
    pub async fn reconcile(
        &self,
        entries: Vec<OutboxEntry>,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("Reconcile pass already running");
            return ReconcileReport::skipped(now_millis());
        };

        *self.active.lock().await = Some(cancel.clone());
        let mut report = ReconcileReport::started(now_millis());
        if self.prepare(&mut report).await {
            self.drain(entries, cancel, &mut report).await;
        }
        self.finish(report, cancel).await
    }

    /// In-flight flags left by an interrupted pass would hide their entries.
    async fn prepare(&self, report: &mut ReconcileReport) -> bool {
        match self.store.release_in_flight().await {
            Ok(_) => true,
            Err(err) => {
                error!(error = %err, "Failed to release in-flight entries");
                report.storage_error = Some(err.to_string());
                false
            }
        }
    }

    async fn finish(
        &self,
        mut report: ReconcileReport,
        cancel: &CancellationToken,
    ) -> ReconcileReport {
        self.active.lock().await.take();
        report.cancelled = cancel.is_cancelled();
        report.finished_at = now_millis();
        info!(
            entries = report.outcomes.len(),
            synced = report.synced_count(),
            retrying = report.retry_scheduled_count(),
            failed = report.failed_count(),
            deferred = report.deferred_count(),
            aborted = report.aborted_count(),
            cancelled = report.cancelled,
            "Reconcile pass finished"
        );
        report
    }

    async fn drain(
        &self,
        mut entries: Vec<OutboxEntry>,
        cancel: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        entries.sort_by_key(|entry| (entry.created_at, entry.id));

        let mut tiers: BTreeMap<u8, Vec<OutboxEntry>> = BTreeMap::new();
        for entry in entries {
            tiers.entry(entry.entity_type.tier()).or_default().push(entry);
        }

        let concurrency = self.options.concurrency.max(1);
        for (tier, batch) in tiers {
            if cancel.is_cancelled() {
                report.outcomes.extend(
                    batch
                        .iter()
                        .map(|entry| EntryReport::new(entry, EntryOutcome::Cancelled)),
                );
                continue;
            }

            debug!(tier, count = batch.len(), "Reconciling tier");
            let outcomes: Vec<EntryReport> = stream::iter(batch)
                .map(|entry| self.process(entry, cancel))
                .buffer_unordered(concurrency)
                .collect()
                .await;
            report.outcomes.extend(outcomes);
        }
    }

    async fn process(&self, entry: OutboxEntry, cancel: &CancellationToken) -> EntryReport {
        let outcome = match self.process_entry(&entry, cancel).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    error = %err,
                    "Aborted outbox entry"
                );
                EntryOutcome::Aborted {
                    message: err.to_string(),
                }
            }
        };
        EntryReport::new(&entry, outcome)
    }

    async fn process_entry(
        &self,
        entry: &OutboxEntry,
        cancel: &CancellationToken,
    ) -> Result<EntryOutcome, AppError> {
        if cancel.is_cancelled() {
            return Ok(EntryOutcome::Cancelled);
        }
        let Some(claimed) = self.store.claim(entry.id).await? else {
            let current = self
                .store
                .outbox_entry(entry.entity_type, &entry.entity_id)
                .await?;
            return Ok(match current {
                Some(current) if current.parked => EntryOutcome::Parked,
                _ => EntryOutcome::AlreadyResolved,
            });
        };

        let result = self.replay(&claimed, cancel).await;
        if result.is_err() {
            if let Err(err) = self.store.release(claimed.id).await {
                warn!(entry_id = claimed.id, error = %err, "Failed to release entry");
            }
        }
        result
    }

    async fn replay(
        &self,
        claimed: &OutboxEntry,
        cancel: &CancellationToken,
    ) -> Result<EntryOutcome, AppError> {
        let record = self
            .store
            .get(claimed.entity_type, &claimed.entity_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "{} {} has no local record",
                    claimed.entity_type, claimed.entity_id
                ))
            })?;

        if let Some(reason) = self.pending_parent(claimed, &record).await? {
            self.store.release(claimed.id).await?;
            debug!(
                entity_type = %claimed.entity_type,
                entity_id = %claimed.entity_id,
                reason = %reason,
                "Deferred outbox entry"
            );
            return Ok(EntryOutcome::Deferred { reason });
        }

        let body = match claimed.operation {
            OutboxOperation::Delete => Value::Null,
            OutboxOperation::Create | OutboxOperation::Update => {
                self.request_body(claimed, &record).await?
            }
        };

        debug!(
            entity_type = %claimed.entity_type,
            entity_id = %claimed.entity_id,
            operation = %claimed.operation,
            revision = claimed.revision,
            "Replaying outbox entry"
        );

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.store.release(claimed.id).await?;
                return Ok(EntryOutcome::Cancelled);
            }
            result = tokio::time::timeout(
                self.options.request_timeout,
                self.send(claimed, &record, body),
            ) => result.unwrap_or(Err(RemoteError::Timeout)),
        };

        let now = now_millis();
        let acked = result
            .and_then(|payload| RemoteAck::decode(claimed.operation, payload))
            .and_then(|ack| server_copy(claimed, &record, ack, now));
        match acked {
            Ok((server_id, copy)) => {
                let outcome = self
                    .store
                    .apply_success(claimed, server_id, copy, now)
                    .await?;
                Ok(match outcome {
                    SuccessOutcome::Synced { id } => EntryOutcome::Synced { id },
                    SuccessOutcome::Purged => EntryOutcome::Purged,
                    SuccessOutcome::Requeued { .. } => EntryOutcome::Requeued,
                    SuccessOutcome::AlreadyResolved => EntryOutcome::AlreadyResolved,
                })
            }
            Err(err) => {
                let failure = FailureReport {
                    message: err.to_string(),
                    class: err.classify(claimed.operation),
                };
                let outcome = self
                    .store
                    .apply_failure(claimed, &failure, self.options.retry_policy, now)
                    .await?;
                Ok(failure_outcome(claimed, failure, outcome))
            }
        }
    }

    /// A child cannot be sent before its parent disaster has a server id.
    async fn pending_parent(
        &self,
        entry: &OutboxEntry,
        record: &StoredRecord,
    ) -> Result<Option<String>, AppError> {
        if !entry.entity_type.has_disaster_parent() || entry.operation == OutboxOperation::Delete {
            return Ok(None);
        }
        let Some(parent_id) = record.disaster_id.as_deref() else {
            return Ok(None);
        };

        match self.store.get(EntityType::Disaster, parent_id).await? {
            Some(parent) if !parent.meta.has_reached_server() => Ok(Some(format!(
                "disaster {} has not reached the server",
                parent.id()
            ))),
            _ => Ok(None),
        }
    }

    async fn request_body(
        &self,
        entry: &OutboxEntry,
        record: &StoredRecord,
    ) -> Result<Value, AppError> {
        let mut body = record.data.clone();
        let Value::Object(fields) = &mut body else {
            return Err(AppError::DeserializationError(format!(
                "{} {} is not stored as an object",
                record.entity_type,
                record.id()
            )));
        };

        if entry.operation == OutboxOperation::Create {
            if let Some(local_id) = &record.meta.local_id {
                fields.insert("localId".to_string(), Value::String(local_id.clone()));
            }
        }

        if record.entity_type == EntityType::Picture {
            if let (Some(images), Some(image_id)) = (&self.images, record.data_str("imageId")) {
                match images.path_for(image_id).await {
                    Ok(Some(path)) => {
                        fields.insert(
                            "localImagePath".to_string(),
                            Value::String(path.to_string_lossy().into_owned()),
                        );
                    }
                    Ok(None) => warn!(image_id = %image_id, "Picture file is missing"),
                    Err(err) => warn!(image_id = %image_id, error = %err, "Picture file lookup failed"),
                }
            }
        }

        Ok(body)
    }

    async fn send(
        &self,
        entry: &OutboxEntry,
        record: &StoredRecord,
        body: Value,
    ) -> Result<Value, RemoteError> {
        let target = entry.server_id.as_deref().unwrap_or(record.id());
        match entry.operation {
            OutboxOperation::Create => self.remote.create(entry.entity_type, body).await,
            OutboxOperation::Update => self.remote.update(entry.entity_type, target, body).await,
            OutboxOperation::Delete => self
                .remote
                .delete(entry.entity_type, target)
                .await
                .map(|_| Value::Null),
        }
    }
}

/// Validates the entity the server returned for a CREATE or UPDATE. A body
/// that does not decode into a valid record is malformed.
fn server_copy(
    claimed: &OutboxEntry,
    record: &StoredRecord,
    ack: RemoteAck,
    now: i64,
) -> Result<(Option<String>, Option<StoredRecord>), RemoteError> {
    if claimed.operation == OutboxOperation::Delete {
        return Ok((None, None));
    }
    let server_id = ack
        .server_id
        .or_else(|| claimed.server_id.clone())
        .unwrap_or_else(|| record.id().to_string());
    let copy = record
        .with_server_fields(&server_id, ack.fields, now)
        .map_err(RemoteError::Malformed)?;
    Ok((Some(server_id), Some(copy)))
}

fn failure_outcome(
    claimed: &OutboxEntry,
    failure: FailureReport,
    outcome: FailureOutcome,
) -> EntryOutcome {
    match outcome {
        FailureOutcome::RetryScheduled {
            retry_count,
            next_attempt_at,
        } => {
            warn!(
                entity_type = %claimed.entity_type,
                entity_id = %claimed.entity_id,
                retry_count,
                error = %failure.message,
                "Replay failed, retry scheduled"
            );
            EntryOutcome::RetryScheduled {
                retry_count,
                next_attempt_at,
            }
        }
        FailureOutcome::Parked { retry_count } => {
            warn!(
                entity_type = %claimed.entity_type,
                entity_id = %claimed.entity_id,
                retry_count,
                error = %failure.message,
                "Replay failed, record needs attention"
            );
            EntryOutcome::Failed {
                retry_count,
                conflict: failure.class.conflict(),
                message: failure.message,
            }
        }
        FailureOutcome::Requeued => EntryOutcome::Requeued,
        FailureOutcome::Purged => EntryOutcome::Purged,
        FailureOutcome::AlreadyResolved => EntryOutcome::AlreadyResolved,
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Disaster, DisasterVictim, Picture, Record, decode_remote_stored};
    use crate::domain::value_objects::{ConflictKind, SyncStatus};
    use crate::infrastructure::database::{ConnectionPool, SqliteEntityStore};
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;

    mock! {
        pub Remote {}

        #[async_trait]
        impl RemoteApi for Remote {
            async fn create(&self, entity_type: EntityType, body: Value) -> Result<Value, RemoteError>;
            async fn update(&self, entity_type: EntityType, id: &str, body: Value) -> Result<Value, RemoteError>;
            async fn delete(&self, entity_type: EntityType, id: &str) -> Result<(), RemoteError>;
            async fn fetch(&self, entity_type: EntityType, id: &str) -> Result<Option<Value>, RemoteError>;
        }
    }

    /// Answers every request after `delay`.
    struct SlowRemote {
        delay: Duration,
    }

    #[async_trait]
    impl RemoteApi for SlowRemote {
        async fn create(&self, _: EntityType, _: Value) -> Result<Value, RemoteError> {
            tokio::time::sleep(self.delay).await;
            Ok(json!({"id": "late"}))
        }

        async fn update(&self, _: EntityType, id: &str, _: Value) -> Result<Value, RemoteError> {
            tokio::time::sleep(self.delay).await;
            Ok(json!({"id": id}))
        }

        async fn delete(&self, _: EntityType, _: &str) -> Result<(), RemoteError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn fetch(&self, _: EntityType, _: &str) -> Result<Option<Value>, RemoteError> {
            Ok(None)
        }
    }

    async fn setup_store() -> Arc<SqliteEntityStore> {
        let pool = ConnectionPool::from_memory().await.unwrap();
        let store = SqliteEntityStore::new(pool);
        store.initialize().await.unwrap();
        Arc::new(store)
    }

    fn options() -> ReconcilerOptions {
        ReconcilerOptions {
            retry_policy: RetryPolicy::immediate(3),
            request_timeout: Duration::from_secs(5),
            concurrency: 2,
        }
    }

    fn flood() -> Disaster {
        Disaster {
            title: "Flood".into(),
            description: "River overflow".into(),
            disaster_type: "flood".into(),
            location: "Bandung".into(),
            latitude: None,
            longitude: None,
            status: "ACTIVE".into(),
            occurred_at: 1_000,
        }
    }

    fn victim(disaster_id: &str) -> DisasterVictim {
        DisasterVictim {
            disaster_id: disaster_id.into(),
            name: "Budi".into(),
            nik: None,
            condition: "injured".into(),
            age: None,
            gender: None,
            notes: None,
        }
    }

    async fn local_disaster_with_victim(store: &SqliteEntityStore) -> (String, String) {
        let disaster = Record::new_local(flood(), 1_000);
        let disaster_id = disaster.id().to_string();
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();
        let victim = Record::new_local(victim(&disaster_id), 1_001);
        let victim_id = victim.id().to_string();
        store
            .insert_local(victim.into_stored().unwrap())
            .await
            .unwrap();
        (disaster_id, victim_id)
    }

    #[tokio::test]
    async fn test_parent_syncs_before_child_and_child_carries_server_id() {
        let store = setup_store().await;
        let (disaster_id, victim_id) = local_disaster_with_victim(&store).await;

        let mut remote = MockRemote::new();
        let expected_local = disaster_id.clone();
        remote
            .expect_create()
            .withf(move |entity_type, body| {
                *entity_type == EntityType::Disaster && body["localId"] == expected_local
            })
            .times(1)
            .returning(|_, _| Ok(json!({"data": {"id": "d-9"}})));
        remote
            .expect_create()
            .withf(|entity_type, body| {
                *entity_type == EntityType::DisasterVictim && body["disasterId"] == "d-9"
            })
            .times(1)
            .returning(|_, _| Ok(json!({"id": "v-99"})));

        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let report = reconciler.run_pass(&CancellationToken::new()).await;

        assert_eq!(report.synced_count(), 2);
        assert!(report.is_clean());
        let victim = store
            .get(EntityType::DisasterVictim, &victim_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(victim.id(), "v-99");
        assert_eq!(victim.disaster_id.as_deref(), Some("d-9"));
        assert_eq!(victim.status(), SyncStatus::Synced);
        assert!(store.list_outbox().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_child_is_deferred_while_parent_retries() {
        let store = setup_store().await;
        let (_, victim_id) = local_disaster_with_victim(&store).await;

        let mut remote = MockRemote::new();
        remote
            .expect_create()
            .withf(|entity_type, _| *entity_type == EntityType::Disaster)
            .times(1)
            .returning(|_, _| {
                Err(RemoteError::Status {
                    code: 503,
                    body: "maintenance".into(),
                })
            });

        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let report = reconciler.run_pass(&CancellationToken::new()).await;

        assert_eq!(report.retry_scheduled_count(), 1);
        assert_eq!(report.deferred_count(), 1);
        assert!(matches!(
            report.outcome_for(EntityType::DisasterVictim, &victim_id),
            Some(EntryOutcome::Deferred { .. })
        ));
        let entry = store
            .outbox_entry(EntityType::DisasterVictim, &victim_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.retry_count, 0);
        assert!(!entry.in_flight);
    }

    #[tokio::test]
    async fn test_conflict_on_update_parks_record() {
        let store = setup_store().await;
        let payload = json!({
            "id": "d-1",
            "title": "Flood",
            "description": "River overflow",
            "disasterType": "flood",
            "location": "Bandung",
            "status": "ACTIVE",
            "occurredAt": 1_000
        });
        let remote_copy = decode_remote_stored(EntityType::Disaster, payload, 10).unwrap();
        store.upsert_remote(remote_copy.clone()).await.unwrap();
        let mut edited = remote_copy.data.clone();
        edited["status"] = json!("RESOLVED");
        store
            .update_local(EntityType::Disaster, "d-1", edited, None, 20)
            .await
            .unwrap();

        let mut remote = MockRemote::new();
        remote
            .expect_update()
            .withf(|_, id, body| id == "d-1" && body["status"] == "RESOLVED")
            .times(1)
            .returning(|_, _, _| {
                Err(RemoteError::Status {
                    code: 404,
                    body: "gone".into(),
                })
            });

        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let report = reconciler.run_pass(&CancellationToken::new()).await;

        assert_eq!(report.failed_count(), 1);
        let conflicts = report.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert!(matches!(
            conflicts[0].outcome,
            EntryOutcome::Failed {
                conflict: Some(ConflictKind::RemoteMissing),
                ..
            }
        ));
        let record = store.get(EntityType::Disaster, "d-1").await.unwrap().unwrap();
        assert_eq!(record.status(), SyncStatus::SyncFailed);
    }

    #[tokio::test]
    async fn test_cancelled_pass_sends_nothing() {
        let store = setup_store().await;
        local_disaster_with_victim(&store).await;

        let reconciler = Reconciler::new(store.clone(), Arc::new(MockRemote::new()), options());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = reconciler.run_pass(&cancel).await;

        assert!(report.cancelled);
        assert_eq!(report.count(|outcome| *outcome == EntryOutcome::Cancelled), 2);
        let outbox = store.list_outbox().await.unwrap();
        assert_eq!(outbox.len(), 2);
        assert!(outbox.iter().all(|entry| !entry.in_flight && entry.retry_count == 0));
    }

    #[tokio::test]
    async fn test_cancel_during_request_releases_entry() {
        let store = setup_store().await;
        let disaster = Record::new_local(flood(), 1_000);
        let disaster_id = disaster.id().to_string();
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();

        let remote = SlowRemote {
            delay: Duration::from_secs(10),
        };
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let report = reconciler.run_pass(&cancel).await;

        assert!(report.cancelled);
        assert_eq!(
            report.outcome_for(EntityType::Disaster, &disaster_id),
            Some(&EntryOutcome::Cancelled)
        );
        let entry = store
            .outbox_entry(EntityType::Disaster, &disaster_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!entry.in_flight);
        assert_eq!(entry.retry_count, 0);
    }

    #[tokio::test]
    async fn test_slow_request_times_out_and_schedules_retry() {
        let store = setup_store().await;
        let disaster = Record::new_local(flood(), 1_000);
        let disaster_id = disaster.id().to_string();
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();

        let remote = SlowRemote {
            delay: Duration::from_secs(10),
        };
        let mut opts = options();
        opts.request_timeout = Duration::from_millis(50);
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), opts);
        let report = reconciler.run_pass(&CancellationToken::new()).await;

        assert!(matches!(
            report.outcome_for(EntityType::Disaster, &disaster_id),
            Some(EntryOutcome::RetryScheduled { retry_count: 1, .. })
        ));
        let record = store
            .get(EntityType::Disaster, &disaster_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status(), SyncStatus::PendingCreate);
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let store = setup_store().await;
        local_disaster_with_victim(&store).await;

        let remote = SlowRemote {
            delay: Duration::from_millis(100),
        };
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let cancel = CancellationToken::new();

        let (first, second) = tokio::join!(reconciler.run_pass(&cancel), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            reconciler.run_pass(&cancel).await
        });

        assert!(!first.skipped);
        assert_eq!(first.synced_count(), 2);
        assert!(second.skipped);
        assert!(second.outcomes.is_empty());
        assert!(!reconciler.is_running());
    }

    fn flood_payload(id: &str) -> Value {
        json!({
            "id": id,
            "title": "Flood",
            "description": "River overflow",
            "disasterType": "flood",
            "location": "Bandung",
            "status": "ACTIVE",
            "occurredAt": 1_000
        })
    }

    #[tokio::test]
    async fn test_create_ack_fields_replace_local_data() {
        let store = setup_store().await;
        let parent = decode_remote_stored(EntityType::Disaster, flood_payload("d-1"), 10).unwrap();
        store.upsert_remote(parent).await.unwrap();
        let picture = Record::new_local(
            Picture {
                disaster_id: "d-1".into(),
                image_id: "img-1".into(),
                caption: Some("Bridge".into()),
                mime_type: "image/jpeg".into(),
                remote_url: None,
            },
            1_000,
        );
        let picture_id = picture.id().to_string();
        store
            .insert_local(picture.into_stored().unwrap())
            .await
            .unwrap();

        let mut remote = MockRemote::new();
        remote
            .expect_create()
            .withf(|entity_type, _| *entity_type == EntityType::Picture)
            .times(1)
            .returning(|_, _| {
                Ok(json!({"data": {
                    "id": "p-7",
                    "remoteUrl": "https://files.example.org/p-7.jpg",
                    "caption": "Bridge collapse",
                    "createdAt": 900,
                    "updatedAt": 950
                }}))
            });

        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let report = reconciler.run_pass(&CancellationToken::new()).await;
        assert_eq!(report.synced_count(), 1);

        let stored = store
            .get(EntityType::Picture, &picture_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id(), "p-7");
        assert_eq!(stored.meta.local_id.as_deref(), Some(picture_id.as_str()));
        assert_eq!(stored.status(), SyncStatus::Synced);
        assert_eq!(stored.meta.created_at, 900);
        assert_eq!(stored.meta.updated_at, 950);

        let picture = Record::<Picture>::try_from_stored(stored).unwrap();
        assert_eq!(
            picture.data.remote_url.as_deref(),
            Some("https://files.example.org/p-7.jpg")
        );
        assert_eq!(picture.data.caption.as_deref(), Some("Bridge collapse"));
        assert_eq!(picture.data.image_id, "img-1");
    }

    #[tokio::test]
    async fn test_invalid_ack_body_parks_record() {
        let store = setup_store().await;
        let disaster = Record::new_local(flood(), 1_000);
        let disaster_id = disaster.id().to_string();
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();

        let mut remote = MockRemote::new();
        remote
            .expect_create()
            .times(1)
            .returning(|_, _| Ok(json!({"id": "d-5", "title": ""})));

        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        let report = reconciler.run_pass(&CancellationToken::new()).await;

        assert!(matches!(
            report.outcome_for(EntityType::Disaster, &disaster_id),
            Some(EntryOutcome::Failed { conflict: None, .. })
        ));
        let record = store
            .get(EntityType::Disaster, &disaster_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id(), disaster_id);
        assert_eq!(record.status(), SyncStatus::SyncFailed);
        assert_eq!(record.data_str("title"), Some("Flood"));
    }

    #[tokio::test]
    async fn test_reconcile_reports_parked_entries_without_sending() {
        let store = setup_store().await;
        let disaster = Record::new_local(flood(), 1_000);
        let disaster_id = disaster.id().to_string();
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();

        let mut remote = MockRemote::new();
        remote.expect_create().times(1).returning(|_, _| {
            Err(RemoteError::Status {
                code: 422,
                body: "title too long".into(),
            })
        });
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        reconciler.run_pass(&CancellationToken::new()).await;

        let parked = store
            .outbox_entry(EntityType::Disaster, &disaster_id)
            .await
            .unwrap()
            .unwrap();
        assert!(parked.parked);

        let report = reconciler
            .reconcile(vec![parked], &CancellationToken::new())
            .await;
        assert_eq!(
            report.outcome_for(EntityType::Disaster, &disaster_id),
            Some(&EntryOutcome::Parked)
        );
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_cancel_running_reaches_the_gate_holder_only() {
        let store = setup_store().await;
        let disaster = Record::new_local(flood(), 1_000);
        store
            .insert_local(disaster.into_stored().unwrap())
            .await
            .unwrap();

        let remote = SlowRemote {
            delay: Duration::from_secs(10),
        };
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote), options());
        assert!(!reconciler.cancel_running().await);

        let running = CancellationToken::new();
        let (first, (second, cancelled)) = tokio::join!(reconciler.run_pass(&running), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let second = reconciler.run_pass(&CancellationToken::new()).await;
            (second, reconciler.cancel_running().await)
        });

        assert!(second.skipped);
        assert!(cancelled);
        assert!(running.is_cancelled());
        assert!(first.cancelled);
        assert!(!reconciler.cancel_running().await);
    }
}
