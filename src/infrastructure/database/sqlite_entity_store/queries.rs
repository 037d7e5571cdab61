// Entities

pub(super) const INSERT_ENTITY: &str = r#"
    INSERT INTO entities (
        entity_type,
        id,
        local_id,
        disaster_id,
        sync_status,
        data,
        created_at,
        updated_at,
        last_synced_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
"#;

pub(super) const UPSERT_REMOTE_ENTITY: &str = r#"
    INSERT INTO entities (
        entity_type,
        id,
        local_id,
        disaster_id,
        sync_status,
        data,
        created_at,
        updated_at,
        last_synced_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
    ON CONFLICT(entity_type, id) DO UPDATE SET
        disaster_id = excluded.disaster_id,
        sync_status = excluded.sync_status,
        data = excluded.data,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        last_synced_at = excluded.last_synced_at
"#;

pub(super) const SELECT_ENTITY: &str = r#"
    SELECT entity_type,
           id,
           local_id,
           disaster_id,
           sync_status,
           data,
           created_at,
           updated_at,
           last_synced_at
    FROM entities
    WHERE entity_type = ?1
      AND (id = ?2 OR local_id = ?2)
    ORDER BY (id = ?2) DESC
    LIMIT 1
"#;

pub(super) const SELECT_ENTITY_EXACT: &str = r#"
    SELECT entity_type,
           id,
           local_id,
           disaster_id,
           sync_status,
           data,
           created_at,
           updated_at,
           last_synced_at
    FROM entities
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const SELECT_ENTITIES_FILTERED: &str = r#"
    SELECT entity_type,
           id,
           local_id,
           disaster_id,
           sync_status,
           data,
           created_at,
           updated_at,
           last_synced_at
    FROM entities
    WHERE (?1 IS NULL OR entity_type = ?1)
      AND (?2 IS NULL OR sync_status = ?2)
      AND (?3 IS NULL OR disaster_id = ?3)
      AND (?4 = 1 OR sync_status != 'PENDING_DELETE')
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const SELECT_CHILDREN: &str = r#"
    SELECT entity_type,
           id,
           local_id,
           disaster_id,
           sync_status,
           data,
           created_at,
           updated_at,
           last_synced_at
    FROM entities
    WHERE disaster_id = ?1 AND entity_type != 'disaster'
"#;

pub(super) const UPDATE_ENTITY_LOCAL: &str = r#"
    UPDATE entities
    SET data = ?3,
        disaster_id = ?4,
        sync_status = ?5,
        updated_at = ?6
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const UPDATE_ENTITY_STATUS: &str = r#"
    UPDATE entities
    SET sync_status = ?3
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const UPDATE_ENTITY_AFTER_ACK: &str = r#"
    UPDATE entities
    SET id = ?3,
        sync_status = ?4,
        last_synced_at = ?5
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const UPDATE_ENTITY_FROM_SERVER: &str = r#"
    UPDATE entities
    SET data = ?3,
        disaster_id = ?4,
        created_at = ?5,
        updated_at = ?6
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const DELETE_ENTITY: &str = r#"
    DELETE FROM entities
    WHERE entity_type = ?1 AND id = ?2
"#;

pub(super) const DELETE_CHILDREN: &str = r#"
    DELETE FROM entities
    WHERE disaster_id = ?1 AND entity_type != 'disaster'
"#;

pub(super) const REMAP_DISASTER_REFERENCES: &str = r#"
    UPDATE entities
    SET disaster_id = ?2,
        data = json_set(data, '$.disasterId', ?2)
    WHERE disaster_id = ?1
"#;

pub(super) const REMAP_USER_REFERENCES: &str = r#"
    UPDATE entities
    SET data = json_set(data, '$.userId', ?2)
    WHERE entity_type IN ('disaster_volunteer', 'notification')
      AND json_extract(data, '$.userId') = ?1
"#;

pub(super) const REMAP_REPORTER_REFERENCES: &str = r#"
    UPDATE entities
    SET data = json_set(data, '$.reporterId', ?2)
    WHERE entity_type = 'disaster_report'
      AND json_extract(data, '$.reporterId') = ?1
"#;

pub(super) const SELECT_STATUS_COUNTS: &str = r#"
    SELECT sync_status, COUNT(*) AS record_count
    FROM entities
    GROUP BY sync_status
"#;

// Outbox

pub(super) const INSERT_OUTBOX_ENTRY: &str = r#"
    INSERT INTO sync_outbox (
        entity_type,
        entity_id,
        operation,
        local_id,
        server_id,
        revision,
        retry_count,
        in_flight,
        parked,
        created_at,
        updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, 0, 0, ?6, ?6)
"#;

pub(super) const SELECT_OUTBOX_BY_ID: &str = r#"
    SELECT id,
           entity_type,
           entity_id,
           operation,
           local_id,
           server_id,
           revision,
           retry_count,
           error_message,
           conflict,
           next_attempt_at,
           in_flight,
           parked,
           created_at,
           updated_at
    FROM sync_outbox
    WHERE id = ?1
"#;

pub(super) const SELECT_OUTBOX_BY_ENTITY: &str = r#"
    SELECT id,
           entity_type,
           entity_id,
           operation,
           local_id,
           server_id,
           revision,
           retry_count,
           error_message,
           conflict,
           next_attempt_at,
           in_flight,
           parked,
           created_at,
           updated_at
    FROM sync_outbox
    WHERE entity_type = ?1 AND entity_id = ?2
"#;

pub(super) const SELECT_OUTBOX_ALL: &str = r#"
    SELECT id,
           entity_type,
           entity_id,
           operation,
           local_id,
           server_id,
           revision,
           retry_count,
           error_message,
           conflict,
           next_attempt_at,
           in_flight,
           parked,
           created_at,
           updated_at
    FROM sync_outbox
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const SELECT_OUTBOX_DUE: &str = r#"
    SELECT id,
           entity_type,
           entity_id,
           operation,
           local_id,
           server_id,
           revision,
           retry_count,
           error_message,
           conflict,
           next_attempt_at,
           in_flight,
           parked,
           created_at,
           updated_at
    FROM sync_outbox
    WHERE parked = 0
      AND in_flight = 0
      AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
    ORDER BY created_at ASC, id ASC
"#;

pub(super) const COALESCE_OUTBOX_ENTRY: &str = r#"
    UPDATE sync_outbox
    SET operation = ?2,
        revision = revision + 1,
        updated_at = ?3
    WHERE id = ?1
"#;

pub(super) const REVIVE_OUTBOX_ENTRY: &str = r#"
    UPDATE sync_outbox
    SET operation = ?2,
        server_id = ?3,
        revision = revision + 1,
        retry_count = 0,
        error_message = NULL,
        conflict = NULL,
        next_attempt_at = NULL,
        parked = 0,
        updated_at = ?4
    WHERE id = ?1
"#;

pub(super) const CLAIM_OUTBOX_ENTRY: &str = r#"
    UPDATE sync_outbox
    SET in_flight = 1
    WHERE id = ?1 AND parked = 0 AND in_flight = 0
"#;

pub(super) const RELEASE_OUTBOX_ENTRY: &str = r#"
    UPDATE sync_outbox
    SET in_flight = 0
    WHERE id = ?1
"#;

pub(super) const RELEASE_ALL_IN_FLIGHT: &str = r#"
    UPDATE sync_outbox
    SET in_flight = 0
    WHERE in_flight = 1
"#;

pub(super) const REQUEUE_AFTER_ACK: &str = r#"
    UPDATE sync_outbox
    SET entity_id = ?2,
        server_id = ?3,
        operation = ?4,
        retry_count = 0,
        error_message = NULL,
        next_attempt_at = NULL,
        in_flight = 0,
        updated_at = ?5
    WHERE id = ?1
"#;

pub(super) const SCHEDULE_RETRY: &str = r#"
    UPDATE sync_outbox
    SET retry_count = ?2,
        error_message = ?3,
        next_attempt_at = ?4,
        in_flight = 0,
        updated_at = ?5
    WHERE id = ?1
"#;

pub(super) const RETRY_NOW: &str = r#"
    UPDATE sync_outbox
    SET error_message = ?2,
        next_attempt_at = NULL,
        in_flight = 0,
        updated_at = ?3
    WHERE id = ?1
"#;

pub(super) const PARK_OUTBOX_ENTRY: &str = r#"
    UPDATE sync_outbox
    SET retry_count = ?2,
        error_message = ?3,
        conflict = ?4,
        next_attempt_at = NULL,
        in_flight = 0,
        parked = 1,
        updated_at = ?5
    WHERE id = ?1
"#;

pub(super) const DELETE_OUTBOX_ENTRY: &str = r#"
    DELETE FROM sync_outbox
    WHERE id = ?1
"#;

pub(super) const DELETE_OUTBOX_FOR_ENTITY: &str = r#"
    DELETE FROM sync_outbox
    WHERE entity_type = ?1 AND entity_id = ?2
"#;

pub(super) const DELETE_CHILD_OUTBOX_ENTRIES: &str = r#"
    DELETE FROM sync_outbox
    WHERE EXISTS (
        SELECT 1
        FROM entities e
        WHERE e.disaster_id = ?1
          AND e.entity_type != 'disaster'
          AND e.entity_type = sync_outbox.entity_type
          AND e.id = sync_outbox.entity_id
    )
"#;
