use crate::application::ports::remote_api::FailureClass;
use crate::domain::entities::{OutboxEntry, StoredRecord};
use crate::domain::sync::RetryPolicy;
use crate::domain::value_objects::{EntityType, OutboxOperation, SyncStatus};
use crate::shared::error::AppError;
use async_trait::async_trait;
use serde_json::Value;

/// Selects records for [`EntityStore::list`]. Records pending deletion are
/// hidden unless `include_deleted` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub entity_type: Option<EntityType>,
    pub sync_status: Option<SyncStatus>,
    pub disaster_id: Option<String>,
    pub include_deleted: bool,
}

impl RecordFilter {
    pub fn of_type(entity_type: EntityType) -> Self {
        Self {
            entity_type: Some(entity_type),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, sync_status: SyncStatus) -> Self {
        self.sync_status = Some(sync_status);
        self
    }

    pub fn in_disaster(mut self, disaster_id: impl Into<String>) -> Self {
        self.disaster_id = Some(disaster_id.into());
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// Result of a local edit or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The record after the mutation, `None` when it was purged.
    pub record: Option<StoredRecord>,
    /// Records dropped locally, cascaded children included.
    pub purged: Vec<StoredRecord>,
}

/// What the store did with a successful replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessOutcome {
    Synced { id: String },
    /// Remote deletion confirmed; the record is gone.
    Purged,
    /// The record changed while the request was in flight; the server id is
    /// recorded and the entry stays queued.
    Requeued { id: String },
    /// The entry was already resolved.
    AlreadyResolved,
}

/// A classified replay failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub message: String,
    pub class: FailureClass,
}

/// What the store did with a failed replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryScheduled {
        retry_count: u32,
        next_attempt_at: i64,
    },
    /// The record is now SYNC_FAILED.
    Parked { retry_count: u32 },
    /// A terminal failure raced with a local edit; the new revision is retried.
    Requeued,
    /// A deletion superseded a create that never reached the server.
    Purged,
    AlreadyResolved,
}

/// How to settle a SYNC_FAILED record.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreResolution {
    /// Unpark the entry with this operation and reset its retries.
    Requeue(OutboxOperation),
    /// Drop the entry and overwrite the record with the server copy.
    ReplaceWithRemote(StoredRecord),
    /// Drop the record and its entry.
    Purge,
}

/// Local persistence for entities and the outbox. Every method commits its
/// entity and outbox writes in one transaction.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Stores a locally created record as PENDING_CREATE with a CREATE entry.
    async fn insert_local(&self, record: StoredRecord) -> Result<OutboxEntry, AppError>;

    /// Replaces the domain fields of a record and coalesces an UPDATE.
    /// `id` may be the record's id or its local id.
    async fn update_local(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
        disaster_id: Option<String>,
        now: i64,
    ) -> Result<MutationOutcome, AppError>;

    /// Coalesces a DELETE. Deleting a disaster purges its children.
    async fn delete_local(
        &self,
        entity_type: EntityType,
        id: &str,
        now: i64,
    ) -> Result<MutationOutcome, AppError>;

    /// Stores a server-fetched record as SYNCED. Returns `false` when a local
    /// mutation is still queued for it and the local copy was kept.
    async fn upsert_remote(&self, record: StoredRecord) -> Result<bool, AppError>;

    /// Looks a record up by id or local id.
    async fn get(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<StoredRecord>, AppError>;
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, AppError>;

    async fn outbox_entry(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<OutboxEntry>, AppError>;
    /// All entries in creation order, parked ones included.
    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>, AppError>;
    /// Active entries whose backoff has elapsed.
    async fn due_entries(&self, now: i64) -> Result<Vec<OutboxEntry>, AppError>;

    /// Marks an active entry as in flight. `None` if it is gone, parked or
    /// already claimed.
    async fn claim(&self, entry_id: i64) -> Result<Option<OutboxEntry>, AppError>;
    async fn release(&self, entry_id: i64) -> Result<(), AppError>;
    /// Clears every in-flight flag. Returns how many were set.
    async fn release_in_flight(&self) -> Result<u64, AppError>;

    /// Records a confirmed replay. `server_copy` is the validated entity the
    /// server returned; it replaces the local data only while `dispatched`
    /// is still the current revision.
    async fn apply_success(
        &self,
        dispatched: &OutboxEntry,
        server_id: Option<String>,
        server_copy: Option<StoredRecord>,
        now: i64,
    ) -> Result<SuccessOutcome, AppError>;

    async fn apply_failure(
        &self,
        dispatched: &OutboxEntry,
        failure: &FailureReport,
        policy: RetryPolicy,
        now: i64,
    ) -> Result<FailureOutcome, AppError>;

    /// Manual retry of a SYNC_FAILED record.
    async fn retry_failed(
        &self,
        entity_type: EntityType,
        id: &str,
        now: i64,
    ) -> Result<StoredRecord, AppError>;

    async fn resolve_failed(
        &self,
        entity_type: EntityType,
        id: &str,
        resolution: StoreResolution,
        now: i64,
    ) -> Result<MutationOutcome, AppError>;

    async fn status_counts(&self) -> Result<Vec<(SyncStatus, u64)>, AppError>;
}
