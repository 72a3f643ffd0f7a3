//! Huddle configuration system.
//!
//! TOML-based configuration for voice rooms, the realtime relay
//! connection, the self-hosted relay and logging. All sections use
//! sensible defaults so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use huddle_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! println!("{}", config_to_json(&config));
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{
    DirectoryConfig, HuddleConfig, IceServerConfig, IdentityConfig, LogLevel, LoggingConfig,
    RealtimeSettings, RelaySettings, RoleSetting, RoomSettings, CONFIG_SCHEMA_VERSION,
};

use huddle_common::ConfigError;

/// Load config from the platform default path and validate it.
///
/// Loads `config.toml` from the OS config directory, creating a default
/// if none exists.
pub fn load_config() -> Result<HuddleConfig, ConfigError> {
    let config = toml_loader::load_default()?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &HuddleConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = HuddleConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"identity\""));
        assert!(json.contains("\"directory\""));
        assert!(json.contains("\"room\""));
        assert!(json.contains("\"realtime\""));
        assert!(json.contains("\"relay\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_schema_version_is_1() {
        assert_eq!(CONFIG_SCHEMA_VERSION, 1);
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = HuddleConfig::default();
        let json = config_to_json(&config);
        let parsed: HuddleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.room.reaction_ttl_ms, 3000);
        assert_eq!(parsed.room.message_ttl_ms, 6000);
        assert_eq!(parsed.realtime.heartbeat_interval, 25);
    }
}
