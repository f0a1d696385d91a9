//! Environment source: STORAGEKIT_<SECTION>__<KEY>, e.g. STORAGEKIT_STORAGE__BACKEND.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub const ENV_PREFIX: &str = "STORAGEKIT";

/// Add the environment overlay, which wins over every file source.
pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
