use crate::application::ports::entity_store::{EntityStore, RecordFilter, StoreResolution};
use crate::application::ports::image_store::ImageStore;
use crate::application::ports::remote_api::RemoteApi;
use crate::domain::entities::{
    EntityData, OutboxEntry, Picture, Record, StoredRecord, decode_remote, decode_remote_stored,
};
use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation, SyncStatus};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the user settles a record stuck in SYNC_FAILED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Take the server's copy, or drop the record when the server has none.
    DiscardLocal,
    /// Send the local copy again.
    KeepLocal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    Replaced(StoredRecord),
    Requeued(StoredRecord),
    Purged,
}

/// Per-status record counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub synced: u64,
    pub pending_create: u64,
    pub pending_update: u64,
    pub pending_delete: u64,
    pub sync_failed: u64,
}

impl SyncSummary {
    pub fn pending(&self) -> u64 {
        self.pending_create + self.pending_update + self.pending_delete
    }

    pub fn total(&self) -> u64 {
        self.synced + self.pending() + self.sync_failed
    }
}

/// Typed local CRUD over the entity store. Every mutation is persisted and
/// queued before it returns; nothing here touches the network except conflict
/// resolution.
pub struct RecordService {
    store: Arc<dyn EntityStore>,
    remote: Arc<dyn RemoteApi>,
    images: Arc<dyn ImageStore>,
}

impl RecordService {
    pub fn new(
        store: Arc<dyn EntityStore>,
        remote: Arc<dyn RemoteApi>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        Self {
            store,
            remote,
            images,
        }
    }

    pub async fn create<T: EntityData>(&self, data: T) -> Result<Record<T>, AppError> {
        data.validate().map_err(AppError::ValidationError)?;

        let record = Record::new_local(data, now_millis());
        let entry = self.store.insert_local(record.into_stored()?).await?;
        debug!(entity_type = %entry.entity_type, id = %entry.entity_id, "Created local record");

        // The store may have pointed the parent at its current id.
        let stored = self
            .store
            .get(T::ENTITY_TYPE, &entry.entity_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", T::ENTITY_TYPE, entry.entity_id)))?;
        Record::try_from_stored(stored)
    }

    /// Replaces the domain fields of a record. `id` may be its local id.
    pub async fn update<T: EntityData>(&self, id: &str, data: T) -> Result<Record<T>, AppError> {
        data.validate().map_err(AppError::ValidationError)?;

        let disaster_id = data.disaster_id().map(str::to_string);
        let value = serde_json::to_value(&data)?;
        let outcome = self
            .store
            .update_local(T::ENTITY_TYPE, id, value, disaster_id, now_millis())
            .await?;
        self.remove_picture_files(&outcome.purged).await;

        let stored = outcome
            .record
            .ok_or_else(|| AppError::NotFound(format!("{} {id}", T::ENTITY_TYPE)))?;
        Record::try_from_stored(stored)
    }

    /// Queues a deletion. Returns the record still awaiting remote deletion,
    /// or `None` when it never reached the server and was dropped outright.
    pub async fn delete<T: EntityData>(&self, id: &str) -> Result<Option<Record<T>>, AppError> {
        let outcome = self
            .store
            .delete_local(T::ENTITY_TYPE, id, now_millis())
            .await?;
        if !outcome.purged.is_empty() {
            info!(
                entity_type = %T::ENTITY_TYPE,
                id = %id,
                purged = outcome.purged.len(),
                "Purged local records"
            );
        }
        self.remove_picture_files(&outcome.purged).await;

        outcome.record.map(Record::try_from_stored).transpose()
    }

    pub async fn get<T: EntityData>(&self, id: &str) -> Result<Option<Record<T>>, AppError> {
        self.store
            .get(T::ENTITY_TYPE, id)
            .await?
            .map(Record::try_from_stored)
            .transpose()
    }

    /// Visible records of one type; pending deletions are hidden.
    pub async fn list<T: EntityData>(&self) -> Result<Vec<Record<T>>, AppError> {
        self.list_typed(RecordFilter::of_type(T::ENTITY_TYPE)).await
    }

    pub async fn list_for_disaster<T: EntityData>(
        &self,
        disaster_id: &str,
    ) -> Result<Vec<Record<T>>, AppError> {
        if !T::ENTITY_TYPE.has_disaster_parent() {
            return Err(AppError::InvalidInput(format!(
                "{} records do not belong to a disaster",
                T::ENTITY_TYPE
            )));
        }
        let parent_id = match self.store.get(EntityType::Disaster, disaster_id).await? {
            Some(parent) => parent.id().to_string(),
            None => disaster_id.to_string(),
        };
        self.list_typed(RecordFilter::of_type(T::ENTITY_TYPE).in_disaster(parent_id))
            .await
    }

    pub async fn list_by_status(&self, status: SyncStatus) -> Result<Vec<StoredRecord>, AppError> {
        self.store
            .list(&RecordFilter::default().with_status(status).including_deleted())
            .await
    }

    /// Stores a record fetched from the server. A local copy with a queued
    /// mutation wins and is returned instead.
    pub async fn ingest_remote<T: EntityData>(
        &self,
        payload: serde_json::Value,
    ) -> Result<Record<T>, AppError> {
        let record =
            decode_remote::<T>(payload, now_millis()).map_err(AppError::ValidationError)?;
        let id = record.id().to_string();
        if !self.store.upsert_remote(record.into_stored()?).await? {
            debug!(entity_type = %T::ENTITY_TYPE, id = %id, "Remote copy ignored");
        }

        let stored = self
            .store
            .get(T::ENTITY_TYPE, &id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {id}", T::ENTITY_TYPE)))?;
        Record::try_from_stored(stored)
    }

    /// Saves the image file and queues a picture record for it.
    pub async fn attach_picture(
        &self,
        disaster_id: &str,
        bytes: &[u8],
        mime_type: &str,
        caption: Option<String>,
    ) -> Result<Record<Picture>, AppError> {
        let image = self.images.save(bytes, mime_type).await?;
        let picture = Picture {
            disaster_id: disaster_id.to_string(),
            image_id: image.image_id.clone(),
            caption,
            mime_type: mime_type.to_string(),
            remote_url: None,
        };

        match self.create(picture).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if let Err(cleanup) = self.images.remove(&image.image_id).await {
                    warn!(image_id = %image.image_id, error = %cleanup, "Failed to remove orphaned image");
                }
                Err(err)
            }
        }
    }

    pub async fn picture_path(&self, id: &str) -> Result<Option<PathBuf>, AppError> {
        let Some(picture) = self.get::<Picture>(id).await? else {
            return Ok(None);
        };
        self.images.path_for(&picture.data.image_id).await
    }

    pub async fn retry_failed(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<StoredRecord, AppError> {
        self.store.retry_failed(entity_type, id, now_millis()).await
    }

    /// Requeues every SYNC_FAILED record. Returns how many were requeued.
    pub async fn retry_all_failed(&self) -> Result<usize, AppError> {
        let failed = self.failed_records().await?;
        let now = now_millis();
        let mut requeued = 0;
        for record in failed {
            match self.store.retry_failed(record.entity_type, record.id(), now).await {
                Ok(_) => requeued += 1,
                Err(err) => warn!(
                    entity_type = %record.entity_type,
                    id = %record.id(),
                    error = %err,
                    "Failed to requeue record"
                ),
            }
        }
        Ok(requeued)
    }

    pub async fn resolve_conflict(
        &self,
        entity_type: EntityType,
        id: &str,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome, AppError> {
        let record = self
            .store
            .get(entity_type, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{entity_type} {id}")))?;
        let entry = self
            .store
            .outbox_entry(entity_type, record.id())
            .await?
            .filter(|entry| entry.parked)
            .ok_or_else(|| {
                AppError::Conflict(format!("{entity_type} {id} is not awaiting resolution"))
            })?;

        let store_resolution = match resolution {
            Resolution::DiscardLocal => self.remote_copy(&record, &entry).await?,
            Resolution::KeepLocal => keep_local(&entry),
        };

        let outcome = self
            .store
            .resolve_failed(entity_type, record.id(), store_resolution.clone(), now_millis())
            .await?;
        self.remove_picture_files(&outcome.purged).await;

        info!(
            entity_type = %entity_type,
            id = %record.id(),
            resolution = ?resolution,
            "Resolved failed record"
        );
        Ok(match (store_resolution, outcome.record) {
            (StoreResolution::ReplaceWithRemote(_), Some(record)) => {
                ResolutionOutcome::Replaced(record)
            }
            (StoreResolution::Requeue(_), Some(record)) => ResolutionOutcome::Requeued(record),
            _ => ResolutionOutcome::Purged,
        })
    }

    pub async fn failed_records(&self) -> Result<Vec<StoredRecord>, AppError> {
        self.list_by_status(SyncStatus::SyncFailed).await
    }

    /// Parked entries the server refused because remote state diverged.
    pub async fn conflicts(&self) -> Result<Vec<OutboxEntry>, AppError> {
        Ok(self
            .store
            .list_outbox()
            .await?
            .into_iter()
            .filter(|entry| entry.parked && entry.conflict.is_some())
            .collect())
    }

    pub async fn outbox(&self) -> Result<Vec<OutboxEntry>, AppError> {
        self.store.list_outbox().await
    }

    pub async fn sync_summary(&self) -> Result<SyncSummary, AppError> {
        let mut summary = SyncSummary::default();
        for (status, count) in self.store.status_counts().await? {
            match status {
                SyncStatus::Synced => summary.synced = count,
                SyncStatus::PendingCreate => summary.pending_create = count,
                SyncStatus::PendingUpdate => summary.pending_update = count,
                SyncStatus::PendingDelete => summary.pending_delete = count,
                SyncStatus::SyncFailed => summary.sync_failed = count,
            }
        }
        Ok(summary)
    }

    async fn list_typed<T: EntityData>(
        &self,
        filter: RecordFilter,
    ) -> Result<Vec<Record<T>>, AppError> {
        self.store
            .list(&filter)
            .await?
            .into_iter()
            .map(Record::try_from_stored)
            .collect()
    }

    async fn remote_copy(
        &self,
        record: &StoredRecord,
        entry: &OutboxEntry,
    ) -> Result<StoreResolution, AppError> {
        let remote_id = match entry.server_id.as_deref() {
            Some(server_id) => server_id,
            None if record.meta.has_reached_server() => record.id(),
            None => return Ok(StoreResolution::Purge),
        };

        let payload = self
            .remote
            .fetch(record.entity_type, remote_id)
            .await
            .map_err(|err| AppError::Network(err.to_string()))?;
        match payload {
            Some(payload) => {
                let remote = decode_remote_stored(record.entity_type, payload, now_millis())
                    .map_err(AppError::ValidationError)?;
                Ok(StoreResolution::ReplaceWithRemote(remote))
            }
            None => Ok(StoreResolution::Purge),
        }
    }

    async fn remove_picture_files(&self, purged: &[StoredRecord]) {
        for record in purged
            .iter()
            .filter(|record| record.entity_type == EntityType::Picture)
        {
            let Some(image_id) = record.data_str("imageId") else {
                continue;
            };
            if let Err(err) = self.images.remove(image_id).await {
                warn!(image_id = %image_id, error = %err, "Failed to remove image file");
            }
        }
    }
}

fn keep_local(entry: &OutboxEntry) -> StoreResolution {
    match (entry.conflict, entry.operation) {
        (Some(ConflictKind::RemoteMissing), OutboxOperation::Update) => {
            StoreResolution::Requeue(OutboxOperation::Create)
        }
        (Some(ConflictKind::RemoteMissing), OutboxOperation::Delete) => StoreResolution::Purge,
        (_, operation) => StoreResolution::Requeue(operation),
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
