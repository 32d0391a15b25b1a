use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (DAG correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - invalid task ids,
///   - unknown `after` references,
///   - DAG cycles,
///   - malformed durations.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Parse and validate a configuration held in memory.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    let raw_config: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw_config)
}

/// Default config path: `Dagflow.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dagflow.toml")
}
