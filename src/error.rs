//! Error types for the StorageKit persistence layer.

use crate::types::{BackendKind, ContextId, EntityKey, EntityKind};
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entity type mismatch: backend stores {expected} entities, got {actual}")]
    EntityTypeMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Context not found: {0}")]
    ContextNotFound(ContextId),

    #[error("Context {context} does not belong to a {expected} backend")]
    ContextTypeMismatch {
        context: ContextId,
        expected: BackendKind,
    },

    #[error("Context {context} accessed outside its owning queue")]
    WrongQueue { context: ContextId },

    #[error("Entity not found: {0}")]
    EntityNotFound(EntityKey),

    #[error("Invalid sweep interval: {0:?}")]
    InvalidSweepInterval(std::time::Duration),

    #[error("Execution queue closed: {0}")]
    QueueClosed(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by the configuration and façade layers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
