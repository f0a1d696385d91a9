//! Persistence layer for the Record Store

use crate::entity::Record;
use crate::error::StorageError;
use crate::store::RecordStore;
use crate::types::EntityKey;
use bincode;
use sled;
use std::path::Path;

/// Sled-based implementation of RecordStore
#[derive(Clone)]
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open (or create) a SledRecordStore at the given path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| engine_error("Failed to open sled database", e))?;
        Ok(Self { db })
    }

    /// Open a store that lives only as long as this handle
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| engine_error("Failed to open temporary sled database", e))?;
        Ok(Self { db })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

impl RecordStore for SledRecordStore {
    fn get(&self, key: &EntityKey) -> Result<Option<Record>, StorageError> {
        match self
            .db
            .get(key.storage_key())
            .map_err(|e| engine_error("Failed to get record", e))?
        {
            Some(value) => Ok(Some(decode(&value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &Record) -> Result<(), StorageError> {
        let value = bincode::serialize(record).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to serialize record: {}", e),
            ))
        })?;

        self.db
            .insert(record.key.storage_key(), value)
            .map_err(|e| engine_error("Failed to put record", e))?;
        Ok(())
    }

    fn remove(&self, key: &EntityKey) -> Result<(), StorageError> {
        self.db
            .remove(key.storage_key())
            .map_err(|e| engine_error("Failed to remove record", e))?;
        Ok(())
    }

    fn scan(&self, entity_name: &str) -> Result<Vec<Record>, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(EntityKey::storage_prefix(entity_name)) {
            let (_, value) = item.map_err(|e| engine_error("Failed to scan records", e))?;
            // "A/" also prefixes every "A/B/<id>" key.
            let record = decode(&value)?;
            if record.key.entity == entity_name {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db
            .flush()
            .map_err(|e| engine_error("Failed to flush sled database", e))?;
        Ok(())
    }
}

fn decode(bytes: &[u8]) -> Result<Record, StorageError> {
    bincode::deserialize(bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to deserialize record: {}", e),
        ))
    })
}

fn engine_error(context: &str, err: sled::Error) -> StorageError {
    StorageError::IoError(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{}: {}", context, err),
    ))
}
