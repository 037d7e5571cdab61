pub mod connectivity;
pub mod entity_store;
pub mod image_store;
pub mod remote_api;

pub use connectivity::ConnectivitySignal;
pub use entity_store::{
    EntityStore, FailureOutcome, FailureReport, MutationOutcome, RecordFilter, StoreResolution,
    SuccessOutcome,
};
pub use image_store::{ImageStore, StoredImage};
pub use remote_api::{FailureClass, RemoteAck, RemoteApi, RemoteError};
