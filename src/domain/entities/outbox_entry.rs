use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation};
use serde::{Deserialize, Serialize};

/// A queued mutation awaiting replay against the server. There is at most one
/// entry per `(entity_type, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    pub id: i64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: OutboxOperation,
    pub local_id: Option<String>,
    pub server_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub next_attempt_at: Option<i64>,
    /// Bumped on every coalesced mutation.
    pub revision: i64,
    pub in_flight: bool,
    /// Set once the record is SYNC_FAILED; parked entries are not replayed.
    pub parked: bool,
    pub conflict: Option<ConflictKind>,
}

impl OutboxEntry {
    pub fn is_active(&self) -> bool {
        !self.parked
    }

    pub fn is_due(&self, now: i64) -> bool {
        self.is_active() && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}
