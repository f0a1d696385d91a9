//! Configuration loader.

use super::merge::builder_with_defaults;
use super::sources::{environment, global_file, workspace_file};
use super::StorageKitConfig;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Loads [`StorageKitConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, `config/{STORAGEKIT_ENV}.toml`, environment.
    pub fn load(workspace_root: &Path) -> Result<StorageKitConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }

    /// Load from one explicit file. Environment overrides still apply.
    pub fn load_from_file(path: &Path) -> Result<StorageKitConfig, ConfigError> {
        let builder = builder_with_defaults()?.add_source(File::from(path).required(true));
        let builder = environment::add_to_builder(builder);

        builder.build()?.try_deserialize()
    }

    /// Built-in defaults only
    pub fn default() -> StorageKitConfig {
        StorageKitConfig::default()
    }
}
