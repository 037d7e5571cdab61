pub mod reconcile_report;
pub mod reconciler;
pub mod record_service;
pub mod sync_scheduler;

pub use reconcile_report::{EntryOutcome, EntryReport, ReconcileReport};
pub use reconciler::{Reconciler, ReconcilerOptions};
pub use record_service::{RecordService, Resolution, ResolutionOutcome, SyncSummary};
pub use sync_scheduler::{SyncScheduler, SyncTrigger};
