pub mod conflict_kind;
pub mod entity_type;
pub mod outbox_operation;
pub mod sync_status;

pub use conflict_kind::ConflictKind;
pub use entity_type::EntityType;
pub use outbox_operation::OutboxOperation;
pub use sync_status::{InvalidTransition, SyncEvent, SyncStatus, Transition};
