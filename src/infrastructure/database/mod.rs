pub mod connection_pool;
pub mod sqlite_entity_store;

pub use connection_pool::ConnectionPool;
pub use sqlite_entity_store::SqliteEntityStore;
