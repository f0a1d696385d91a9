//! Storage façade: picks a backend from configuration and opens it.

use crate::backend::{HierarchicalStorage, IsolatedStorage};
use crate::config::{StorageConfig, StorageKitConfig, StoreType};
use crate::error::ApiError;
use crate::storage::Storage;
use crate::store::{RecordStore, SledRecordStore};
use crate::types::BackendKind;
use std::sync::Arc;
use tracing::info;

/// Backend selection tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageType {
    /// Session tree over one named store
    Hierarchical { store_name: String },
    /// Independent, registry-tracked sessions
    Isolated,
}

impl StorageType {
    pub fn from_config(config: &StorageConfig) -> Self {
        match config.backend {
            BackendKind::Hierarchical => StorageType::Hierarchical {
                store_name: config.store_name.clone(),
            },
            BackendKind::Isolated => StorageType::Isolated,
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            StorageType::Hierarchical { .. } => BackendKind::Hierarchical,
            StorageType::Isolated => BackendKind::Isolated,
        }
    }
}

/// Validate `config` and open the storage it describes.
///
/// The isolated backend starts its registry sweep on the ambient tokio runtime
/// when there is one.
pub fn open(config: &StorageKitConfig) -> Result<Arc<dyn Storage>, ApiError> {
    let config = config.clone().validated()?;
    let storage_type = StorageType::from_config(&config.storage);
    let store = open_store(&config.storage)?;

    info!(
        backend = %storage_type.backend(),
        store_type = ?config.storage.store_type,
        "Opening storage"
    );

    let storage: Arc<dyn Storage> = match storage_type {
        StorageType::Hierarchical { .. } => Arc::new(HierarchicalStorage::new(store)?),
        StorageType::Isolated => Arc::new(IsolatedStorage::new(
            store,
            config.registry.sweep_interval(),
        )?),
    };
    Ok(storage)
}

fn open_store(config: &StorageConfig) -> Result<Arc<dyn RecordStore>, ApiError> {
    let store = match config.store_type {
        StoreType::Memory => SledRecordStore::temporary()?,
        StoreType::Sql => {
            let path = config.store_path()?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::ConfigError(format!(
                        "Failed to create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            SledRecordStore::new(&path)?
        }
    };
    Ok(Arc::new(store))
}
