use super::OutboxOperation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Relationship between a local record and its server copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    PendingCreate,
    PendingUpdate,
    PendingDelete,
    SyncFailed,
}

/// Something that happened to a record, local or remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    LocalEdit,
    LocalDelete,
    ReconcileSucceeded,
    ReconcileFailed { retries_exhausted: bool },
    ManualRetry { original: OutboxOperation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    To(SyncStatus),
    /// The record never reached the server and is dropped locally.
    Purge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SyncStatus,
    pub event: SyncEvent,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not allowed while {}", self.event, self.from)
    }
}

impl std::error::Error for InvalidTransition {}

impl SyncStatus {
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Synced,
        SyncStatus::PendingCreate,
        SyncStatus::PendingUpdate,
        SyncStatus::PendingDelete,
        SyncStatus::SyncFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "SYNCED",
            SyncStatus::PendingCreate => "PENDING_CREATE",
            SyncStatus::PendingUpdate => "PENDING_UPDATE",
            SyncStatus::PendingDelete => "PENDING_DELETE",
            SyncStatus::SyncFailed => "SYNC_FAILED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "SYNCED" => Ok(SyncStatus::Synced),
            "PENDING_CREATE" => Ok(SyncStatus::PendingCreate),
            "PENDING_UPDATE" => Ok(SyncStatus::PendingUpdate),
            "PENDING_DELETE" => Ok(SyncStatus::PendingDelete),
            "SYNC_FAILED" => Ok(SyncStatus::SyncFailed),
            other => Err(format!("Unknown sync status: {other}")),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            SyncStatus::PendingCreate | SyncStatus::PendingUpdate | SyncStatus::PendingDelete
        )
    }

    /// Applies `event` to this status.
    ///
    /// `SyncFailed` only accepts a manual retry; local edits to a failed record
    /// go through [`SyncStatus::on_local_event`], which revives it first.
    pub fn on_event(self, event: SyncEvent) -> Result<Transition, InvalidTransition> {
        use SyncEvent::*;
        use SyncStatus::*;

        let invalid = || InvalidTransition { from: self, event };

        match (self, event) {
            (Synced, LocalEdit) => Ok(Transition::To(PendingUpdate)),
            (Synced, LocalDelete) => Ok(Transition::To(PendingDelete)),
            (Synced, ReconcileSucceeded) => Ok(Transition::To(Synced)),
            (Synced, ReconcileFailed { .. }) | (Synced, ManualRetry { .. }) => Err(invalid()),

            (PendingCreate, LocalEdit) => Ok(Transition::To(PendingCreate)),
            (PendingCreate, LocalDelete) => Ok(Transition::Purge),

            (PendingUpdate, LocalEdit) => Ok(Transition::To(PendingUpdate)),
            (PendingUpdate, LocalDelete) => Ok(Transition::To(PendingDelete)),

            (PendingDelete, LocalEdit) => Err(invalid()),
            (PendingDelete, LocalDelete) => Ok(Transition::To(PendingDelete)),

            (PendingCreate | PendingUpdate | PendingDelete, ReconcileSucceeded) => {
                Ok(Transition::To(Synced))
            }
            (
                PendingCreate | PendingUpdate | PendingDelete,
                ReconcileFailed {
                    retries_exhausted: false,
                },
            ) => Ok(Transition::To(self)),
            (
                PendingCreate | PendingUpdate | PendingDelete,
                ReconcileFailed {
                    retries_exhausted: true,
                },
            ) => Ok(Transition::To(SyncFailed)),
            (PendingCreate | PendingUpdate | PendingDelete, ManualRetry { .. }) => Err(invalid()),

            (SyncFailed, ManualRetry { original }) => Ok(Transition::To(original.pending_status())),
            (SyncFailed, LocalEdit)
            | (SyncFailed, LocalDelete)
            | (SyncFailed, ReconcileSucceeded)
            | (SyncFailed, ReconcileFailed { .. }) => Err(invalid()),
        }
    }

    /// Applies a local edit or delete. A failed record is first revived to the
    /// pending state of its parked operation, then the event is applied.
    pub fn on_local_event(
        self,
        event: SyncEvent,
        parked: Option<OutboxOperation>,
    ) -> Result<Transition, InvalidTransition> {
        match self {
            SyncStatus::SyncFailed => {
                let original = parked.unwrap_or(OutboxOperation::Update);
                match self.on_event(SyncEvent::ManualRetry { original })? {
                    Transition::To(revived) => revived.on_event(event),
                    Transition::Purge => Ok(Transition::Purge),
                }
            }
            other => other.on_event(event),
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip_matches_wire_names() {
        for status in SyncStatus::ALL {
            assert_eq!(SyncStatus::parse(status.as_str()).unwrap(), status);
        }
        assert_eq!(
            serde_json::to_string(&SyncStatus::PendingCreate).unwrap(),
            "\"PENDING_CREATE\""
        );
        assert!(SyncStatus::parse("pending").is_err());
    }

    #[test]
    fn test_synced_transitions_on_local_changes() {
        assert_eq!(
            SyncStatus::Synced.on_event(SyncEvent::LocalEdit),
            Ok(Transition::To(SyncStatus::PendingUpdate))
        );
        assert_eq!(
            SyncStatus::Synced.on_event(SyncEvent::LocalDelete),
            Ok(Transition::To(SyncStatus::PendingDelete))
        );
    }

    #[test]
    fn test_pending_create_delete_purges() {
        assert_eq!(
            SyncStatus::PendingCreate.on_event(SyncEvent::LocalDelete),
            Ok(Transition::Purge)
        );
        assert_eq!(
            SyncStatus::PendingCreate.on_event(SyncEvent::LocalEdit),
            Ok(Transition::To(SyncStatus::PendingCreate))
        );
    }

    #[test]
    fn test_pending_update_delete_supersedes() {
        assert_eq!(
            SyncStatus::PendingUpdate.on_event(SyncEvent::LocalDelete),
            Ok(Transition::To(SyncStatus::PendingDelete))
        );
    }

    #[test]
    fn test_edit_after_delete_is_rejected() {
        assert!(SyncStatus::PendingDelete
            .on_event(SyncEvent::LocalEdit)
            .is_err());
    }

    #[test]
    fn test_failure_keeps_status_until_exhausted() {
        for status in [
            SyncStatus::PendingCreate,
            SyncStatus::PendingUpdate,
            SyncStatus::PendingDelete,
        ] {
            assert_eq!(
                status.on_event(SyncEvent::ReconcileFailed {
                    retries_exhausted: false
                }),
                Ok(Transition::To(status))
            );
            assert_eq!(
                status.on_event(SyncEvent::ReconcileFailed {
                    retries_exhausted: true
                }),
                Ok(Transition::To(SyncStatus::SyncFailed))
            );
            assert_eq!(
                status.on_event(SyncEvent::ReconcileSucceeded),
                Ok(Transition::To(SyncStatus::Synced))
            );
        }
    }

    #[test]
    fn test_manual_retry_restores_original_pending_state() {
        assert_eq!(
            SyncStatus::SyncFailed.on_event(SyncEvent::ManualRetry {
                original: OutboxOperation::Delete
            }),
            Ok(Transition::To(SyncStatus::PendingDelete))
        );
        assert!(SyncStatus::Synced
            .on_event(SyncEvent::ManualRetry {
                original: OutboxOperation::Create
            })
            .is_err());
    }

    #[test]
    fn test_local_event_revives_failed_record() {
        assert_eq!(
            SyncStatus::SyncFailed
                .on_local_event(SyncEvent::LocalEdit, Some(OutboxOperation::Create)),
            Ok(Transition::To(SyncStatus::PendingCreate))
        );
        assert_eq!(
            SyncStatus::SyncFailed
                .on_local_event(SyncEvent::LocalDelete, Some(OutboxOperation::Create)),
            Ok(Transition::Purge)
        );
        assert_eq!(
            SyncStatus::SyncFailed
                .on_local_event(SyncEvent::LocalDelete, Some(OutboxOperation::Update)),
            Ok(Transition::To(SyncStatus::PendingDelete))
        );
    }
}
