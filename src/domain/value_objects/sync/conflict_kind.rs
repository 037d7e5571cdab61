use serde::{Deserialize, Serialize};
use std::fmt;

/// Why the server refused to apply a queued mutation as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// The record was assumed to exist remotely but the server returned 404.
    RemoteMissing,
    /// The server rejected the mutation with 409.
    Rejected,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::RemoteMissing => "REMOTE_MISSING",
            ConflictKind::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "REMOTE_MISSING" => Ok(ConflictKind::RemoteMissing),
            "REJECTED" => Ok(ConflictKind::Rejected),
            other => Err(format!("Unknown conflict kind: {other}")),
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
