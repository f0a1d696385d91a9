//! Defaults applied beneath every other source.

use crate::registry::DEFAULT_SWEEP_INTERVAL_SECS;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.backend", "isolated")?
        .set_default("storage.store_name", "StorageKit")?
        .set_default("storage.store_type", "sql")?
        .set_default("registry.sweep_interval_secs", DEFAULT_SWEEP_INTERVAL_SECS)?
        .set_default("logging.level", "info")
}
