use crate::domain::entities::{OutboxEntry, StoredRecord, SyncMetadata};
use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation, SyncStatus};
use crate::shared::error::AppError;
use serde_json::Value;
use sqlx::{Row, sqlite::SqliteRow};

pub(super) fn map_record_row(row: &SqliteRow) -> Result<StoredRecord, AppError> {
    let entity_type: String = row.try_get("entity_type")?;
    let sync_status: String = row.try_get("sync_status")?;
    let data: String = row.try_get("data")?;

    Ok(StoredRecord {
        entity_type: EntityType::parse(&entity_type).map_err(AppError::DeserializationError)?,
        meta: SyncMetadata {
            id: row.try_get("id")?,
            local_id: row.try_get::<Option<String>, _>("local_id")?,
            sync_status: SyncStatus::parse(&sync_status).map_err(AppError::DeserializationError)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_synced_at: row.try_get::<Option<i64>, _>("last_synced_at")?,
        },
        disaster_id: row.try_get::<Option<String>, _>("disaster_id")?,
        data: serde_json::from_str::<Value>(&data)?,
    })
}

pub(super) fn map_outbox_row(row: &SqliteRow) -> Result<OutboxEntry, AppError> {
    let entity_type: String = row.try_get("entity_type")?;
    let operation: String = row.try_get("operation")?;
    let conflict = row
        .try_get::<Option<String>, _>("conflict")?
        .map(|value| ConflictKind::parse(&value))
        .transpose()
        .map_err(AppError::DeserializationError)?;
    let retry_count = u32::try_from(row.try_get::<i64, _>("retry_count")?)
        .map_err(|_| AppError::Internal("Invalid retry_count".into()))?;

    Ok(OutboxEntry {
        id: row.try_get("id")?,
        entity_type: EntityType::parse(&entity_type).map_err(AppError::DeserializationError)?,
        entity_id: row.try_get("entity_id")?,
        operation: OutboxOperation::parse(&operation).map_err(AppError::DeserializationError)?,
        local_id: row.try_get::<Option<String>, _>("local_id")?,
        server_id: row.try_get::<Option<String>, _>("server_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        retry_count,
        error_message: row.try_get::<Option<String>, _>("error_message")?,
        next_attempt_at: row.try_get::<Option<i64>, _>("next_attempt_at")?,
        revision: row.try_get("revision")?,
        in_flight: row.try_get("in_flight")?,
        parked: row.try_get("parked")?,
        conflict,
    })
}
