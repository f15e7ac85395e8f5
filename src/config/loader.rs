// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{BatchConfig, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for
/// the checked [`BatchConfig`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Like [`load_from_path`], but a missing file yields the defaults so the
/// whole batch can be described on the command line.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "config file not found; using defaults");
        return Ok(RawConfigFile::default());
    }
    load_from_path(path)
}

/// Load a configuration file from path and run validation.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<BatchConfig> {
    let raw_config = load_from_path(&path)?;
    let config = BatchConfig::try_from(raw_config)?;
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("Simbatch.toml")
}
