use super::mapper::map_outbox_row;
use super::queries::{
    COALESCE_OUTBOX_ENTRY, DELETE_OUTBOX_ENTRY, INSERT_OUTBOX_ENTRY, PARK_OUTBOX_ENTRY,
    REQUEUE_AFTER_ACK, RETRY_NOW, REVIVE_OUTBOX_ENTRY, SCHEDULE_RETRY, SELECT_OUTBOX_BY_ENTITY,
    SELECT_OUTBOX_BY_ID,
};
use crate::domain::entities::{OutboxEntry, StoredRecord};
use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation};
use crate::shared::error::AppError;
use sqlx::SqliteConnection;

pub(super) async fn fetch_entry(
    conn: &mut SqliteConnection,
    entry_id: i64,
) -> Result<Option<OutboxEntry>, AppError> {
    let row = sqlx::query(SELECT_OUTBOX_BY_ID)
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_outbox_row).transpose()
}

pub(super) async fn fetch_entry_for(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    entity_id: &str,
) -> Result<Option<OutboxEntry>, AppError> {
    let row = sqlx::query(SELECT_OUTBOX_BY_ENTITY)
        .bind(entity_type.as_str())
        .bind(entity_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_outbox_row).transpose()
}

pub(super) async fn insert_entry(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
    operation: OutboxOperation,
    now: i64,
) -> Result<OutboxEntry, AppError> {
    let server_id = record
        .meta
        .has_reached_server()
        .then(|| record.id().to_string());

    let result = sqlx::query(INSERT_OUTBOX_ENTRY)
        .bind(record.entity_type.as_str())
        .bind(record.id())
        .bind(operation.as_str())
        .bind(&record.meta.local_id)
        .bind(server_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;

    fetch_entry(conn, result.last_insert_rowid())
        .await?
        .ok_or_else(|| AppError::Internal("Outbox entry vanished after insert".into()))
}

pub(super) async fn coalesce_into(
    conn: &mut SqliteConnection,
    entry_id: i64,
    operation: OutboxOperation,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(COALESCE_OUTBOX_ENTRY)
        .bind(entry_id)
        .bind(operation.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Unparks an entry with fresh retries.
pub(super) async fn revive(
    conn: &mut SqliteConnection,
    entry_id: i64,
    operation: OutboxOperation,
    server_id: Option<&str>,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(REVIVE_OUTBOX_ENTRY)
        .bind(entry_id)
        .bind(operation.as_str())
        .bind(server_id)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn requeue_after_ack(
    conn: &mut SqliteConnection,
    entry_id: i64,
    server_id: &str,
    operation: OutboxOperation,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(REQUEUE_AFTER_ACK)
        .bind(entry_id)
        .bind(server_id)
        .bind(server_id)
        .bind(operation.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn schedule_retry(
    conn: &mut SqliteConnection,
    entry_id: i64,
    retry_count: u32,
    message: &str,
    next_attempt_at: i64,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(SCHEDULE_RETRY)
        .bind(entry_id)
        .bind(i64::from(retry_count))
        .bind(message)
        .bind(next_attempt_at)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn retry_now(
    conn: &mut SqliteConnection,
    entry_id: i64,
    message: &str,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(RETRY_NOW)
        .bind(entry_id)
        .bind(message)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn park(
    conn: &mut SqliteConnection,
    entry_id: i64,
    retry_count: u32,
    message: &str,
    conflict: Option<ConflictKind>,
    now: i64,
) -> Result<(), AppError> {
    sqlx::query(PARK_OUTBOX_ENTRY)
        .bind(entry_id)
        .bind(i64::from(retry_count))
        .bind(message)
        .bind(conflict.map(|kind| kind.as_str()))
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn delete_entry(
    conn: &mut SqliteConnection,
    entry_id: i64,
) -> Result<(), AppError> {
    sqlx::query(DELETE_OUTBOX_ENTRY)
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}
