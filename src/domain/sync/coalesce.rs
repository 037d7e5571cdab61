use crate::domain::entities::OutboxEntry;
use crate::domain::value_objects::OutboxOperation;

/// What to do with the outbox when a new local mutation is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoalesceDecision {
    /// No entry yet: append one with this operation.
    Append(OutboxOperation),
    /// Rewrite the existing entry in place with this operation.
    Replace(OutboxOperation),
    /// Drop the existing entry and the record: it never reached the server.
    Cancel,
    Reject(String),
}

/// Merges `incoming` into the entity's existing outbox entry, if any.
///
/// CREATE+UPDATE stays CREATE, CREATE+DELETE cancels both, UPDATE+DELETE
/// becomes DELETE. A CREATE already dispatched by a running pass may have
/// reached the server, so deleting it becomes a DELETE instead of a cancel.
pub fn coalesce(existing: Option<&OutboxEntry>, incoming: OutboxOperation) -> CoalesceDecision {
    use OutboxOperation::*;

    let Some(entry) = existing else {
        return CoalesceDecision::Append(incoming);
    };

    match (entry.operation, incoming) {
        (Create, Update) => CoalesceDecision::Replace(Create),
        (Create, Delete) if entry.in_flight => CoalesceDecision::Replace(Delete),
        (Create, Delete) => CoalesceDecision::Cancel,
        (Update, Update) => CoalesceDecision::Replace(Update),
        (Update, Delete) => CoalesceDecision::Replace(Delete),
        (Delete, Delete) => CoalesceDecision::Replace(Delete),
        (Delete, Create | Update) => {
            CoalesceDecision::Reject("record is pending deletion".to_string())
        }
        (Create | Update, Create) => {
            CoalesceDecision::Reject("record is already queued".to_string())
        }
    }
}
