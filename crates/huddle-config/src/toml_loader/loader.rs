//! Core TOML config loading: read from path, string or platform default.

use crate::schema::HuddleConfig;
use crate::validation;
use huddle_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Parse config from TOML text, filling missing fields with defaults.
pub fn load_from_str(content: &str) -> Result<HuddleConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))
}

/// Load config from a specific TOML file path.
///
/// After loading, the config is validated; if validation fails, a warning
/// is logged and the parsed config is returned as-is.
pub fn load_from_path(path: &Path) -> Result<HuddleConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ParseError(format!("failed to read {}: {e}", path.display())))?;

    let config = load_from_str(&content)?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path.
///
/// On Linux: `~/.config/huddle/config.toml`
///
/// If the file does not exist, creates a default config file and returns defaults.
pub fn load_default() -> Result<HuddleConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(HuddleConfig::default())
        }
        Err(e) => Err(e),
    }
}
