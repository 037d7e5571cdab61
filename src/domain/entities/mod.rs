pub mod disaster;
pub mod disaster_aid;
pub mod disaster_report;
pub mod disaster_victim;
pub mod disaster_volunteer;
pub mod notification;
pub mod outbox_entry;
pub mod picture;
pub mod record;
pub mod sync_metadata;
pub mod user;

pub use disaster::Disaster;
pub use disaster_aid::DisasterAid;
pub use disaster_report::DisasterReport;
pub use disaster_victim::DisasterVictim;
pub use disaster_volunteer::DisasterVolunteer;
pub use notification::Notification;
pub use outbox_entry::OutboxEntry;
pub use picture::Picture;
pub use record::{decode_remote, decode_remote_stored, EntityData, Record, StoredRecord};
pub use sync_metadata::SyncMetadata;
pub use user::User;
