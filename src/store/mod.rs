//! Record Store
//!
//! The storage engine port. Backends keep their session bookkeeping in memory
//! and read and write persisted objects through a `RecordStore`.

pub mod persistence;

pub use persistence::SledRecordStore;

use crate::entity::Record;
use crate::error::StorageError;
use crate::types::EntityKey;

/// Record Store interface
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &EntityKey) -> Result<Option<Record>, StorageError>;
    fn put(&self, record: &Record) -> Result<(), StorageError>;
    fn remove(&self, key: &EntityKey) -> Result<(), StorageError>;

    /// All records of one entity, ordered by key
    fn scan(&self, entity_name: &str) -> Result<Vec<Record>, StorageError>;

    /// Make every completed write durable
    fn flush(&self) -> Result<(), StorageError>;
}
