use crate::domain::entities::OutboxEntry;
use crate::domain::value_objects::{ConflictKind, EntityType, OutboxOperation};
use serde::{Deserialize, Serialize};

/// What happened to one outbox entry during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryOutcome {
    /// The record is SYNCED under `id`.
    Synced { id: String },
    /// Remote deletion confirmed, or a queued delete made the replay moot.
    Purged,
    /// The record changed mid-flight and stays queued.
    Requeued,
    RetryScheduled {
        retry_count: u32,
        next_attempt_at: i64,
    },
    /// The record is SYNC_FAILED and needs the user.
    Failed {
        retry_count: u32,
        message: String,
        conflict: Option<ConflictKind>,
    },
    /// Waiting on a parent that has not reached the server.
    Deferred { reason: String },
    AlreadyResolved,
    /// Parked in SYNC_FAILED; only a manual retry or resolution moves it.
    Parked,
    Cancelled,
    /// A local storage error stopped this entry; the outbox is untouched.
    Aborted { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReport {
    pub entry_id: i64,
    pub entity_type: EntityType,
    /// Entity id as dispatched, before any server id was recorded.
    pub entity_id: String,
    pub operation: OutboxOperation,
    pub outcome: EntryOutcome,
}

impl EntryReport {
    pub fn new(entry: &OutboxEntry, outcome: EntryOutcome) -> Self {
        Self {
            entry_id: entry.id,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id.clone(),
            operation: entry.operation,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub outcomes: Vec<EntryReport>,
    /// Another pass was already running.
    pub skipped: bool,
    pub cancelled: bool,
    /// Set when the outbox could not be loaded at all.
    pub storage_error: Option<String>,
}

impl ReconcileReport {
    pub fn started(started_at: i64) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            outcomes: Vec::new(),
            skipped: false,
            cancelled: false,
            storage_error: None,
        }
    }

    pub fn skipped(now: i64) -> Self {
        Self {
            skipped: true,
            ..Self::started(now)
        }
    }

    pub fn count(&self, predicate: impl Fn(&EntryOutcome) -> bool) -> usize {
        self.outcomes
            .iter()
            .filter(|report| predicate(&report.outcome))
            .count()
    }

    pub fn synced_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EntryOutcome::Synced { .. } | EntryOutcome::Purged))
    }

    pub fn retry_scheduled_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EntryOutcome::RetryScheduled { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EntryOutcome::Failed { .. }))
    }

    pub fn deferred_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EntryOutcome::Deferred { .. }))
    }

    pub fn aborted_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, EntryOutcome::Aborted { .. }))
    }

    /// Entries parked with a conflict in this pass.
    pub fn conflicts(&self) -> Vec<&EntryReport> {
        self.outcomes
            .iter()
            .filter(|report| {
                matches!(
                    report.outcome,
                    EntryOutcome::Failed {
                        conflict: Some(_),
                        ..
                    }
                )
            })
            .collect()
    }

    pub fn outcome_for(&self, entity_type: EntityType, entity_id: &str) -> Option<&EntryOutcome> {
        self.outcomes
            .iter()
            .find(|report| report.entity_type == entity_type && report.entity_id == entity_id)
            .map(|report| &report.outcome)
    }

    /// Nothing failed, aborted or was left behind.
    pub fn is_clean(&self) -> bool {
        !self.skipped
            && !self.cancelled
            && self.storage_error.is_none()
            && self.outcomes.iter().all(|report| {
                matches!(
                    report.outcome,
                    EntryOutcome::Synced { .. }
                        | EntryOutcome::Purged
                        | EntryOutcome::AlreadyResolved
                )
            })
    }
}
