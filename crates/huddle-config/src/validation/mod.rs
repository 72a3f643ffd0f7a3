//! Full configuration validation.
//!
//! Each section has its own validator; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::HuddleConfig;
use huddle_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &HuddleConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_identity(&mut errors, config);
    sections::validate_room(&mut errors, config);
    sections::validate_realtime(&mut errors, config);
    sections::validate_relay(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
