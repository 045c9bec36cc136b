//! Record stores. Implement RecordStore.

pub mod memory_store;
pub mod sqlite_store;

pub use memory_store::MemoryRecordStore;
pub use sqlite_store::SqliteRecordStore;
