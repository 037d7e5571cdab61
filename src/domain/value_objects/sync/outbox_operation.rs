use super::SyncStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxOperation {
    Create,
    Update,
    Delete,
}

impl OutboxOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxOperation::Create => "CREATE",
            OutboxOperation::Update => "UPDATE",
            OutboxOperation::Delete => "DELETE",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "CREATE" => Ok(OutboxOperation::Create),
            "UPDATE" => Ok(OutboxOperation::Update),
            "DELETE" => Ok(OutboxOperation::Delete),
            other => Err(format!("Unknown outbox operation: {other}")),
        }
    }

    /// Status a record carries while this operation waits in the outbox.
    pub fn pending_status(&self) -> SyncStatus {
        match self {
            OutboxOperation::Create => SyncStatus::PendingCreate,
            OutboxOperation::Update => SyncStatus::PendingUpdate,
            OutboxOperation::Delete => SyncStatus::PendingDelete,
        }
    }
}

impl fmt::Display for OutboxOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
