// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** validate
/// durations or process entries. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses durations and checks process entries.
/// - Makes relative working directories relative to the config file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    if let Some(root) = config_root_dir(path) {
        config.rebase_working_dirs(&root);
    }
    Ok(config)
}

/// Default config location: `Procreg.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Procreg.toml")
}

/// Directory containing the config file, if the path names one.
///
/// A bare filename like "Procreg.toml" has an empty parent; relative paths
/// then stay relative to the current directory.
fn config_root_dir(config_path: &Path) -> Option<PathBuf> {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Some(parent.to_path_buf()),
        _ => None,
    }
}
