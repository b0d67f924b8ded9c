//! Configuration management for big-red

mod app;
mod endpoint;
pub mod serde_utils;

pub use app::{AppConfig, HttpConfig, RelayConfig};
pub use endpoint::EndpointConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("big-red")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file.
///
/// Files with a `.json` extension are parsed as JSON, everything else as TOML.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: T = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)?
    };
    Ok(config)
}

/// Load and validate the application configuration
pub fn load_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = load_config(path)?;
    config.validate()?;
    Ok(config)
}
