//! Local identity and static directory configuration.

use serde::{Deserialize, Serialize};

/// Room role as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoleSetting {
    Guest,
    #[default]
    Member,
    Moderator,
    Owner,
}

/// Who this participant is when no external directory is available.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdentityConfig {
    /// Participant id. Empty means "generate one per run".
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: RoleSetting,
}

/// Static directory used by standalone deployments.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Participant ids allowed to force-mute and kick in every room.
    pub moderators: Vec<String>,
}
