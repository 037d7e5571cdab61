pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::services::{
    EntryOutcome, ReconcileReport, Reconciler, ReconcilerOptions, RecordService, Resolution,
    ResolutionOutcome, SyncScheduler, SyncSummary, SyncTrigger,
};
pub use domain::entities::{Record, StoredRecord};
pub use domain::value_objects::{EntityType, OutboxOperation, SyncStatus};
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;
