use crate::domain::value_objects::SyncStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bookkeeping carried by every syncable record. Timestamps are milliseconds
/// since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub id: String,
    pub local_id: Option<String>,
    pub sync_status: SyncStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_synced_at: Option<i64>,
}

impl SyncMetadata {
    /// Metadata for a record originated on this device. `id` starts out equal
    /// to the generated `local_id`.
    pub fn new_local(now: i64) -> Self {
        let local_id = Uuid::new_v4().to_string();
        Self {
            id: local_id.clone(),
            local_id: Some(local_id),
            sync_status: SyncStatus::PendingCreate,
            created_at: now,
            updated_at: now,
            last_synced_at: None,
        }
    }

    /// Metadata for a record fetched from the server.
    pub fn from_remote(id: String, created_at: i64, updated_at: i64, now: i64) -> Self {
        Self {
            id,
            local_id: None,
            sync_status: SyncStatus::Synced,
            created_at,
            updated_at,
            last_synced_at: Some(now),
        }
    }

    /// Whether any version of this record has been confirmed by the server.
    pub fn has_reached_server(&self) -> bool {
        self.last_synced_at.is_some()
    }
}
