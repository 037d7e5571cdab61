pub mod sync;

pub use sync::{
    ConflictKind, EntityType, InvalidTransition, OutboxOperation, SyncEvent, SyncStatus,
    Transition,
};
