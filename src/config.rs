//! Configuration System
//!
//! Layered configuration for backend selection, store location, registry sweep
//! cadence and logging. Sources are merged with the `config` crate: defaults,
//! then the global file, then workspace files, then `STORAGEKIT_*` environment
//! variables.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::registry::DEFAULT_SWEEP_INTERVAL_SECS;
use crate::types::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageKitConfig {
    /// Backend selection and store location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Context registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where records live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// On-disk store under `data_dir`
    Sql,
    /// Temporary store discarded with the storage
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Store name; the on-disk store is `<data_dir>/<store_name>.sled`
    #[serde(default = "default_store_name")]
    pub store_name: String,

    #[serde(default = "default_store_type")]
    pub store_type: StoreType,

    /// Directory for on-disk stores (defaults to the platform data directory)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_backend() -> BackendKind {
    BackendKind::Isolated
}

fn default_store_name() -> String {
    "StorageKit".to_string()
}

fn default_store_type() -> StoreType {
    StoreType::Sql
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            store_name: default_store_name(),
            store_type: default_store_type(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    /// Resolve the directory holding on-disk stores
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ApiError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("", "", "storagekit")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                ApiError::ConfigError("Could not determine a data directory".to_string())
            })
    }

    /// Location of the on-disk store
    pub fn store_path(&self) -> Result<PathBuf, ApiError> {
        Ok(self
            .resolve_data_dir()?
            .join(format!("{}.sled", self.store_name)))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store_name.trim().is_empty() {
            return Err("Store name cannot be empty".to_string());
        }
        if self
            .store_name
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err(format!(
                "Store name '{}' must not contain path separators",
                self.store_name
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds between periodic registry sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_secs == 0 {
            return Err("Sweep interval must be at least one second".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Storage(String),
    Registry(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Registry(msg) => write!(f, "Registry: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl StorageKitConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.storage.validate() {
            errors.push(ValidationError::Storage(e));
        }
        if let Err(e) = self.registry.validate() {
            errors.push(ValidationError::Registry(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one `ApiError`
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }
}
