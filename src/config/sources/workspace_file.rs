//! Per-workspace config files under `<workspace>/config/`.
//!
//! `config.toml` is the shared base. A profile file named after
//! `STORAGEKIT_ENV` (default `development`) is layered on top of it, so a
//! workspace can keep e.g. a `testing.toml` with a short sweep interval.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

const PROFILE_VAR: &str = "STORAGEKIT_ENV";
const DEFAULT_PROFILE: &str = "development";

/// Active profile name. Must be a bare file stem.
pub fn profile() -> Result<String, ConfigError> {
    let name = std::env::var(PROFILE_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

    let bare = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !bare {
        return Err(ConfigError::Message(format!(
            "{} must be a plain profile name, got {:?}",
            PROFILE_VAR, name
        )));
    }
    Ok(name)
}

/// Workspace files that exist, lowest precedence first.
pub fn existing_files(workspace_root: &Path, profile: &str) -> Vec<PathBuf> {
    let config_dir = workspace_root.join("config");
    [
        config_dir.join("config.toml"),
        config_dir.join(format!("{}.toml", profile)),
    ]
    .into_iter()
    .filter(|path| path.is_file())
    .collect()
}

pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let profile = profile()?;
    let files = existing_files(workspace_root, &profile);
    if files.is_empty() {
        debug!(workspace = %workspace_root.display(), %profile, "No workspace configuration files");
    }

    for path in files {
        debug!(config_path = %path.display(), %profile, "Layering workspace configuration");
        builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
    }
    Ok(builder)
}
