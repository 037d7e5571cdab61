use super::ConnectionPool;
use crate::application::ports::entity_store::{
    EntityStore, FailureOutcome, FailureReport, MutationOutcome, RecordFilter, StoreResolution,
    SuccessOutcome,
};
use crate::domain::entities::{OutboxEntry, StoredRecord};
use crate::domain::sync::{CoalesceDecision, RetryPolicy, coalesce};
use crate::domain::value_objects::{
    EntityType, OutboxOperation, SyncEvent, SyncStatus, Transition,
};
use crate::shared::error::AppError;
use async_trait::async_trait;
use mapper::{map_outbox_row, map_record_row};
use queries::{
    CLAIM_OUTBOX_ENTRY, RELEASE_ALL_IN_FLIGHT, RELEASE_OUTBOX_ENTRY, SELECT_ENTITIES_FILTERED,
    SELECT_OUTBOX_ALL, SELECT_OUTBOX_DUE, SELECT_STATUS_COUNTS, UPDATE_ENTITY_LOCAL,
    UPSERT_REMOTE_ENTITY,
};
use serde_json::Value;
use sqlx::{Row, SqliteConnection};
use tracing::{debug, info};

mod mapper;
mod outbox;
mod queries;
mod records;


pub struct SqliteEntityStore {
    pool: ConnectionPool,
}

enum LocalChange {
    Edit {
        data: Value,
        disaster_id: Option<String>,
    },
    Delete,
}

impl SqliteEntityStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    pub async fn initialize(&self) -> Result<(), AppError> {
        self.pool.migrate().await?;
        Ok(())
    }

    pub async fn health_check(&self) -> Result<bool, AppError> {
        let result = sqlx::query("SELECT 1")
            .fetch_one(self.pool.get_pool())
            .await;
        Ok(result.is_ok())
    }

    async fn apply_local_change(
        &self,
        entity_type: EntityType,
        id: &str,
        change: LocalChange,
        now: i64,
    ) -> Result<MutationOutcome, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let current = records::fetch_record(&mut tx, entity_type, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{entity_type} {id}")))?;
        let entry = outbox::fetch_entry_for(&mut tx, entity_type, current.id()).await?;

        let (event, requested) = match &change {
            LocalChange::Edit { .. } => (SyncEvent::LocalEdit, OutboxOperation::Update),
            LocalChange::Delete => (SyncEvent::LocalDelete, OutboxOperation::Delete),
        };
        let parked = entry
            .as_ref()
            .filter(|entry| entry.parked)
            .map(|entry| entry.operation);
        current
            .status()
            .on_local_event(event, parked)
            .map_err(|err| AppError::InvalidInput(err.to_string()))?;

        let operation = match coalesce(entry.as_ref(), requested) {
            CoalesceDecision::Reject(reason) => {
                return Err(AppError::InvalidInput(format!(
                    "{entity_type} {}: {reason}",
                    current.id()
                )));
            }
            CoalesceDecision::Cancel => {
                let purged = records::purge(&mut tx, &current).await?;
                tx.commit().await?;
                debug!(
                    entity_type = %entity_type,
                    id = %current.id(),
                    "Cancelled unsynced record"
                );
                return Ok(MutationOutcome {
                    record: None,
                    purged,
                });
            }
            CoalesceDecision::Append(operation) => {
                outbox::insert_entry(&mut tx, &current, operation, now).await?;
                operation
            }
            CoalesceDecision::Replace(operation) => {
                if let Some(entry) = &entry {
                    if entry.parked {
                        outbox::revive(
                            &mut tx,
                            entry.id,
                            operation,
                            entry.server_id.as_deref(),
                            now,
                        )
                        .await?;
                    } else {
                        outbox::coalesce_into(&mut tx, entry.id, operation, now).await?;
                    }
                }
                operation
            }
        };

        let status = operation.pending_status();
        let mut purged = Vec::new();
        match change {
            LocalChange::Edit { data, disaster_id } => {
                let (data, disaster_id) = match disaster_id {
                    Some(parent) if entity_type.has_disaster_parent() => {
                        let parent_id = records::resolve_parent(&mut tx, &parent).await?;
                        (records::with_parent_id(data, &parent_id), Some(parent_id))
                    }
                    other => (data, other),
                };
                sqlx::query(UPDATE_ENTITY_LOCAL)
                    .bind(entity_type.as_str())
                    .bind(current.id())
                    .bind(serde_json::to_string(&data)?)
                    .bind(disaster_id)
                    .bind(status.as_str())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
            }
            LocalChange::Delete => {
                records::set_status(&mut tx, &current, status).await?;
                if entity_type == EntityType::Disaster {
                    purged = records::purge_children(&mut tx, current.id()).await?;
                }
            }
        }

        let record = records::fetch_record_exact(&mut tx, entity_type, current.id()).await?;
        tx.commit().await?;

        Ok(MutationOutcome { record, purged })
    }
}

/// Applies `event` and expects the record to survive it.
fn next_status(current: SyncStatus, event: SyncEvent) -> Result<SyncStatus, AppError> {
    match current.on_event(event) {
        Ok(Transition::To(status)) => Ok(status),
        Ok(Transition::Purge) => Err(AppError::Internal(format!(
            "{event:?} unexpectedly purges a {current} record"
        ))),
        Err(err) => Err(AppError::InvalidInput(err.to_string())),
    }
}

async fn require_parked_entry(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
) -> Result<OutboxEntry, AppError> {
    let entry = outbox::fetch_entry_for(conn, record.entity_type, record.id())
        .await?
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "{} {} has no queued mutation",
                record.entity_type,
                record.id()
            ))
        })?;
    if !entry.parked {
        return Err(AppError::InvalidInput(format!(
            "{} {} has not failed",
            record.entity_type,
            record.id()
        )));
    }
    Ok(entry)
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn insert_local(&self, mut record: StoredRecord) -> Result<OutboxEntry, AppError> {
        if record.status() != SyncStatus::PendingCreate {
            return Err(AppError::InvalidInput(format!(
                "New records must be {}, got {}",
                SyncStatus::PendingCreate,
                record.status()
            )));
        }

        let mut tx = self.pool.get_pool().begin().await?;

        if record.entity_type.has_disaster_parent() {
            let parent = record.disaster_id.clone().ok_or_else(|| {
                AppError::InvalidInput(format!("{} requires a disaster", record.entity_type))
            })?;
            let parent_id = records::resolve_parent(&mut tx, &parent).await?;
            record.data = records::with_parent_id(record.data, &parent_id);
            record.disaster_id = Some(parent_id);
        }

        if records::fetch_record(&mut tx, record.entity_type, record.id())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "{} {} already exists",
                record.entity_type,
                record.id()
            )));
        }

        let operation = match coalesce(None, OutboxOperation::Create) {
            CoalesceDecision::Append(operation) => operation,
            other => {
                return Err(AppError::Internal(format!(
                    "Unexpected outbox decision for a new record: {other:?}"
                )));
            }
        };

        records::insert_record(&mut tx, &record).await?;
        let entry =
            outbox::insert_entry(&mut tx, &record, operation, record.meta.created_at).await?;
        tx.commit().await?;

        debug!(
            entity_type = %record.entity_type,
            id = %record.id(),
            "Stored local record"
        );
        Ok(entry)
    }

    async fn update_local(
        &self,
        entity_type: EntityType,
        id: &str,
        data: Value,
        disaster_id: Option<String>,
        now: i64,
    ) -> Result<MutationOutcome, AppError> {
        self.apply_local_change(entity_type, id, LocalChange::Edit { data, disaster_id }, now)
            .await
    }

    async fn delete_local(
        &self,
        entity_type: EntityType,
        id: &str,
        now: i64,
    ) -> Result<MutationOutcome, AppError> {
        self.apply_local_change(entity_type, id, LocalChange::Delete, now)
            .await
    }

    async fn upsert_remote(&self, mut record: StoredRecord) -> Result<bool, AppError> {
        if record.status() != SyncStatus::Synced || record.meta.last_synced_at.is_none() {
            return Err(AppError::InvalidInput(format!(
                "Remote {} {} must be synced",
                record.entity_type,
                record.id()
            )));
        }

        let mut tx = self.pool.get_pool().begin().await?;

        let existing = records::fetch_record_exact(&mut tx, record.entity_type, record.id()).await?;
        if let Some(existing) = &existing {
            if outbox::fetch_entry_for(&mut tx, existing.entity_type, existing.id())
                .await?
                .is_some()
            {
                debug!(
                    entity_type = %existing.entity_type,
                    id = %existing.id(),
                    "Kept local copy with queued mutation"
                );
                return Ok(false);
            }
            record.meta.local_id = existing.meta.local_id.clone();
        }

        sqlx::query(UPSERT_REMOTE_ENTITY)
            .bind(record.entity_type.as_str())
            .bind(record.id())
            .bind(&record.meta.local_id)
            .bind(&record.disaster_id)
            .bind(record.status().as_str())
            .bind(serde_json::to_string(&record.data)?)
            .bind(record.meta.created_at)
            .bind(record.meta.updated_at)
            .bind(record.meta.last_synced_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<StoredRecord>, AppError> {
        let mut conn = self.pool.get_pool().acquire().await?;
        records::fetch_record(&mut conn, entity_type, id).await
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, AppError> {
        let rows = sqlx::query(SELECT_ENTITIES_FILTERED)
            .bind(filter.entity_type.map(|entity_type| entity_type.as_str()))
            .bind(filter.sync_status.map(|status| status.as_str()))
            .bind(filter.disaster_id.as_deref())
            .bind(filter.include_deleted)
            .fetch_all(self.pool.get_pool())
            .await?;

        rows.iter().map(map_record_row).collect()
    }

    async fn outbox_entry(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> Result<Option<OutboxEntry>, AppError> {
        let mut conn = self.pool.get_pool().acquire().await?;
        let canonical = records::fetch_record(&mut conn, entity_type, entity_id)
            .await?
            .map(|record| record.meta.id)
            .unwrap_or_else(|| entity_id.to_string());
        outbox::fetch_entry_for(&mut conn, entity_type, &canonical).await
    }

    async fn list_outbox(&self) -> Result<Vec<OutboxEntry>, AppError> {
        let rows = sqlx::query(SELECT_OUTBOX_ALL)
            .fetch_all(self.pool.get_pool())
            .await?;

        rows.iter().map(map_outbox_row).collect()
    }

    async fn due_entries(&self, now: i64) -> Result<Vec<OutboxEntry>, AppError> {
        let rows = sqlx::query(SELECT_OUTBOX_DUE)
            .bind(now)
            .fetch_all(self.pool.get_pool())
            .await?;

        rows.iter().map(map_outbox_row).collect()
    }

    async fn claim(&self, entry_id: i64) -> Result<Option<OutboxEntry>, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;
        let claimed = sqlx::query(CLAIM_OUTBOX_ENTRY)
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            return Ok(None);
        }

        let entry = outbox::fetch_entry(&mut tx, entry_id).await?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn release(&self, entry_id: i64) -> Result<(), AppError> {
        sqlx::query(RELEASE_OUTBOX_ENTRY)
            .bind(entry_id)
            .execute(self.pool.get_pool())
            .await?;
        Ok(())
    }

    async fn release_in_flight(&self) -> Result<u64, AppError> {
        let result = sqlx::query(RELEASE_ALL_IN_FLIGHT)
            .execute(self.pool.get_pool())
            .await?;
        if result.rows_affected() > 0 {
            info!(
                count = result.rows_affected(),
                "Released entries left in flight"
            );
        }
        Ok(result.rows_affected())
    }

    async fn apply_success(
        &self,
        dispatched: &OutboxEntry,
        server_id: Option<String>,
        server_copy: Option<StoredRecord>,
        now: i64,
    ) -> Result<SuccessOutcome, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let Some(entry) = outbox::fetch_entry(&mut tx, dispatched.id).await? else {
            return Ok(SuccessOutcome::AlreadyResolved);
        };
        let Some(record) =
            records::fetch_record_exact(&mut tx, entry.entity_type, &entry.entity_id).await?
        else {
            outbox::delete_entry(&mut tx, entry.id).await?;
            tx.commit().await?;
            return Ok(SuccessOutcome::AlreadyResolved);
        };

        if dispatched.operation == OutboxOperation::Delete {
            records::purge(&mut tx, &record).await?;
            tx.commit().await?;
            return Ok(SuccessOutcome::Purged);
        }

        let server_id = server_id
            .or_else(|| entry.server_id.clone())
            .unwrap_or_else(|| record.meta.id.clone());

        let outcome = if entry.revision == dispatched.revision {
            let status = next_status(record.status(), SyncEvent::ReconcileSucceeded)?;
            records::apply_ack(&mut tx, &record, &server_id, status, now).await?;
            if let Some(copy) = &server_copy {
                records::write_server_copy(&mut tx, copy, &server_id).await?;
            }
            outbox::delete_entry(&mut tx, entry.id).await?;
            SuccessOutcome::Synced { id: server_id }
        } else {
            // The server has the dispatched revision; what is queued now is
            // a change to an existing record.
            let operation = match entry.operation {
                OutboxOperation::Create => OutboxOperation::Update,
                other => other,
            };
            records::apply_ack(&mut tx, &record, &server_id, operation.pending_status(), now)
                .await?;
            outbox::requeue_after_ack(&mut tx, entry.id, &server_id, operation, now).await?;
            SuccessOutcome::Requeued { id: server_id }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn apply_failure(
        &self,
        dispatched: &OutboxEntry,
        failure: &FailureReport,
        policy: RetryPolicy,
        now: i64,
    ) -> Result<FailureOutcome, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let Some(entry) = outbox::fetch_entry(&mut tx, dispatched.id).await? else {
            return Ok(FailureOutcome::AlreadyResolved);
        };
        let Some(record) =
            records::fetch_record_exact(&mut tx, entry.entity_type, &entry.entity_id).await?
        else {
            outbox::delete_entry(&mut tx, entry.id).await?;
            tx.commit().await?;
            return Ok(FailureOutcome::AlreadyResolved);
        };

        // A delete queued behind a create that never landed has nothing to
        // remove remotely.
        if entry.operation == OutboxOperation::Delete
            && entry.server_id.is_none()
            && !record.meta.has_reached_server()
        {
            records::purge(&mut tx, &record).await?;
            tx.commit().await?;
            return Ok(FailureOutcome::Purged);
        }

        if entry.revision != dispatched.revision && !failure.class.is_retryable() {
            outbox::retry_now(&mut tx, entry.id, &failure.message, now).await?;
            tx.commit().await?;
            return Ok(FailureOutcome::Requeued);
        }

        let retry_count = entry.retry_count.saturating_add(1);
        let exhausted = !failure.class.is_retryable() || policy.is_exhausted(retry_count);
        let status = next_status(
            record.status(),
            SyncEvent::ReconcileFailed {
                retries_exhausted: exhausted,
            },
        )?;

        let outcome = if exhausted {
            outbox::park(
                &mut tx,
                entry.id,
                retry_count,
                &failure.message,
                failure.class.conflict(),
                now,
            )
            .await?;
            records::set_status(&mut tx, &record, status).await?;
            FailureOutcome::Parked { retry_count }
        } else {
            let next_attempt_at = policy.next_attempt_at(retry_count, now);
            outbox::schedule_retry(
                &mut tx,
                entry.id,
                retry_count,
                &failure.message,
                next_attempt_at,
                now,
            )
            .await?;
            FailureOutcome::RetryScheduled {
                retry_count,
                next_attempt_at,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn retry_failed(
        &self,
        entity_type: EntityType,
        id: &str,
        now: i64,
    ) -> Result<StoredRecord, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let record = records::fetch_record(&mut tx, entity_type, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{entity_type} {id}")))?;
        let entry = require_parked_entry(&mut tx, &record).await?;
        let status = next_status(
            record.status(),
            SyncEvent::ManualRetry {
                original: entry.operation,
            },
        )?;

        outbox::revive(
            &mut tx,
            entry.id,
            entry.operation,
            entry.server_id.as_deref(),
            now,
        )
        .await?;
        records::set_status(&mut tx, &record, status).await?;
        let updated = records::fetch_record_exact(&mut tx, entity_type, record.id())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{entity_type} {id}")))?;
        tx.commit().await?;

        info!(
            entity_type = %entity_type,
            id = %updated.id(),
            operation = %entry.operation,
            "Requeued failed record"
        );
        Ok(updated)
    }

    async fn resolve_failed(
        &self,
        entity_type: EntityType,
        id: &str,
        resolution: StoreResolution,
        now: i64,
    ) -> Result<MutationOutcome, AppError> {
        let mut tx = self.pool.get_pool().begin().await?;

        let record = records::fetch_record(&mut tx, entity_type, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{entity_type} {id}")))?;
        let entry = require_parked_entry(&mut tx, &record).await?;

        let outcome = match resolution {
            StoreResolution::Requeue(operation) => {
                let status = next_status(
                    record.status(),
                    SyncEvent::ManualRetry {
                        original: operation,
                    },
                )?;
                let server_id = match operation {
                    OutboxOperation::Create => None,
                    _ => entry.server_id.as_deref(),
                };
                outbox::revive(&mut tx, entry.id, operation, server_id, now).await?;
                records::set_status(&mut tx, &record, status).await?;
                MutationOutcome {
                    record: records::fetch_record_exact(&mut tx, entity_type, record.id()).await?,
                    purged: Vec::new(),
                }
            }
            StoreResolution::ReplaceWithRemote(remote) => {
                if remote.entity_type != entity_type || remote.status() != SyncStatus::Synced {
                    return Err(AppError::InvalidInput(format!(
                        "Replacement for {entity_type} {id} must be a synced {entity_type}"
                    )));
                }
                outbox::delete_entry(&mut tx, entry.id).await?;
                let replaced = records::replace_with_remote(&mut tx, &record, remote).await?;
                MutationOutcome {
                    record: Some(replaced),
                    purged: Vec::new(),
                }
            }
            StoreResolution::Purge => MutationOutcome {
                record: None,
                purged: records::purge(&mut tx, &record).await?,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn status_counts(&self) -> Result<Vec<(SyncStatus, u64)>, AppError> {
        let rows = sqlx::query(SELECT_STATUS_COUNTS)
            .fetch_all(self.pool.get_pool())
            .await?;

        rows.iter()
            .map(|row| -> Result<(SyncStatus, u64), AppError> {
                let status: String = row.try_get("sync_status")?;
                let count: i64 = row.try_get("record_count")?;
                let status = SyncStatus::parse(&status).map_err(AppError::DeserializationError)?;
                Ok((status, u64::try_from(count).unwrap_or_default()))
            })
            .collect()
    }
}
