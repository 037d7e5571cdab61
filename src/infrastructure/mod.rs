pub mod connectivity;
pub mod database;
pub mod remote;
pub mod storage;

pub use connectivity::WatchConnectivity;
pub use database::{ConnectionPool, SqliteEntityStore};
pub use remote::HttpRemoteApi;
pub use storage::FileImageStore;
