use super::mapper::map_record_row;
use super::queries::{
    DELETE_CHILD_OUTBOX_ENTRIES, DELETE_CHILDREN, DELETE_ENTITY, DELETE_OUTBOX_FOR_ENTITY,
    INSERT_ENTITY, REMAP_DISASTER_REFERENCES, REMAP_REPORTER_REFERENCES, REMAP_USER_REFERENCES,
    SELECT_CHILDREN, SELECT_ENTITY, SELECT_ENTITY_EXACT, UPDATE_ENTITY_AFTER_ACK,
    UPDATE_ENTITY_FROM_SERVER, UPDATE_ENTITY_STATUS,
};
use crate::domain::entities::StoredRecord;
use crate::domain::value_objects::{EntityType, SyncStatus};
use crate::shared::error::AppError;
use serde_json::Value;
use sqlx::SqliteConnection;

/// Looks a record up by id, falling back to its local id.
pub(super) async fn fetch_record(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<StoredRecord>, AppError> {
    let row = sqlx::query(SELECT_ENTITY)
        .bind(entity_type.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_record_row).transpose()
}

pub(super) async fn fetch_record_exact(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<Option<StoredRecord>, AppError> {
    let row = sqlx::query(SELECT_ENTITY_EXACT)
        .bind(entity_type.as_str())
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(map_record_row).transpose()
}

pub(super) async fn insert_record(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
) -> Result<(), AppError> {
    let data = serde_json::to_string(&record.data)?;
    sqlx::query(INSERT_ENTITY)
        .bind(record.entity_type.as_str())
        .bind(&record.meta.id)
        .bind(&record.meta.local_id)
        .bind(&record.disaster_id)
        .bind(record.meta.sync_status.as_str())
        .bind(data)
        .bind(record.meta.created_at)
        .bind(record.meta.updated_at)
        .bind(record.meta.last_synced_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(super) async fn set_status(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
    status: SyncStatus,
) -> Result<(), AppError> {
    sqlx::query(UPDATE_ENTITY_STATUS)
        .bind(record.entity_type.as_str())
        .bind(record.id())
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Resolves the parent disaster a child points at and returns its current
/// id. Parents pending deletion cannot take new children.
pub(super) async fn resolve_parent(
    conn: &mut SqliteConnection,
    disaster_id: &str,
) -> Result<String, AppError> {
    let parent = fetch_record(conn, EntityType::Disaster, disaster_id)
        .await?
        .ok_or_else(|| AppError::InvalidInput(format!("Disaster {disaster_id} not found")))?;

    if parent.status() == SyncStatus::PendingDelete {
        return Err(AppError::InvalidInput(format!(
            "Disaster {disaster_id} is being deleted"
        )));
    }
    Ok(parent.meta.id)
}

/// Points `data.disasterId` at the parent's current id.
pub(super) fn with_parent_id(mut data: Value, parent_id: &str) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert("disasterId".to_string(), Value::String(parent_id.to_string()));
    }
    data
}

/// Deletes a record with its outbox entry. A disaster takes its children
/// along. Returns everything removed, the record first.
pub(super) async fn purge(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
) -> Result<Vec<StoredRecord>, AppError> {
    sqlx::query(DELETE_OUTBOX_FOR_ENTITY)
        .bind(record.entity_type.as_str())
        .bind(record.id())
        .execute(&mut *conn)
        .await?;
    sqlx::query(DELETE_ENTITY)
        .bind(record.entity_type.as_str())
        .bind(record.id())
        .execute(&mut *conn)
        .await?;

    let mut purged = vec![record.clone()];
    if record.entity_type == EntityType::Disaster {
        purged.extend(purge_children(conn, record.id()).await?);
    }
    Ok(purged)
}

pub(super) async fn purge_children(
    conn: &mut SqliteConnection,
    disaster_id: &str,
) -> Result<Vec<StoredRecord>, AppError> {
    let rows = sqlx::query(SELECT_CHILDREN)
        .bind(disaster_id)
        .fetch_all(&mut *conn)
        .await?;
    let children = rows
        .iter()
        .map(map_record_row)
        .collect::<Result<Vec<_>, _>>()?;

    if children.is_empty() {
        return Ok(children);
    }

    sqlx::query(DELETE_CHILD_OUTBOX_ENTRIES)
        .bind(disaster_id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(DELETE_CHILDREN)
        .bind(disaster_id)
        .execute(&mut *conn)
        .await?;

    tracing::debug!(
        disaster_id = %disaster_id,
        count = children.len(),
        "Purged child records"
    );
    Ok(children)
}

/// Moves a record onto its server id and updates its sync state. References
/// held by other records follow the new id.
pub(super) async fn apply_ack(
    conn: &mut SqliteConnection,
    record: &StoredRecord,
    server_id: &str,
    status: SyncStatus,
    synced_at: i64,
) -> Result<(), AppError> {
    let renamed = server_id != record.id();
    if renamed {
        drop_stale_copy(conn, record.entity_type, server_id).await?;
    }

    sqlx::query(UPDATE_ENTITY_AFTER_ACK)
        .bind(record.entity_type.as_str())
        .bind(record.id())
        .bind(server_id)
        .bind(status.as_str())
        .bind(synced_at)
        .execute(&mut *conn)
        .await?;

    if renamed {
        remap_references(conn, record.entity_type, record.id(), server_id).await?;
    }
    Ok(())
}

/// Stores the domain fields and timestamps the server returned for a record
/// already moved onto `server_id`.
pub(super) async fn write_server_copy(
    conn: &mut SqliteConnection,
    copy: &StoredRecord,
    server_id: &str,
) -> Result<(), AppError> {
    let data = serde_json::to_string(&copy.data)?;
    sqlx::query(UPDATE_ENTITY_FROM_SERVER)
        .bind(copy.entity_type.as_str())
        .bind(server_id)
        .bind(data)
        .bind(&copy.disaster_id)
        .bind(copy.meta.created_at)
        .bind(copy.meta.updated_at)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Swaps a local record for the server's copy, keeping the local id.
pub(super) async fn replace_with_remote(
    conn: &mut SqliteConnection,
    local: &StoredRecord,
    mut remote: StoredRecord,
) -> Result<StoredRecord, AppError> {
    sqlx::query(DELETE_ENTITY)
        .bind(local.entity_type.as_str())
        .bind(local.id())
        .execute(&mut *conn)
        .await?;

    let renamed = remote.id() != local.id();
    if renamed {
        drop_stale_copy(conn, remote.entity_type, remote.id()).await?;
    }

    remote.meta.local_id = local.meta.local_id.clone();
    insert_record(conn, &remote).await?;

    if renamed {
        remap_references(conn, local.entity_type, local.id(), remote.id()).await?;
    }
    Ok(remote)
}

/// Removes a cached copy that would collide with a record taking over `id`.
async fn drop_stale_copy(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    id: &str,
) -> Result<(), AppError> {
    sqlx::query(DELETE_OUTBOX_FOR_ENTITY)
        .bind(entity_type.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query(DELETE_ENTITY)
        .bind(entity_type.as_str())
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn remap_references(
    conn: &mut SqliteConnection,
    entity_type: EntityType,
    old_id: &str,
    new_id: &str,
) -> Result<(), AppError> {
    let queries: &[&str] = match entity_type {
        EntityType::Disaster => &[REMAP_DISASTER_REFERENCES],
        EntityType::User => &[REMAP_USER_REFERENCES, REMAP_REPORTER_REFERENCES],
        _ => &[],
    };

    for query in queries {
        let result = sqlx::query(query)
            .bind(old_id)
            .bind(new_id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() > 0 {
            tracing::debug!(
                entity_type = %entity_type,
                old_id = %old_id,
                new_id = %new_id,
                rows = result.rows_affected(),
                "Remapped references to server id"
            );
        }
    }
    Ok(())
}
