//! Voice room behavior configuration.

use serde::{Deserialize, Serialize};

/// One STUN/TURN entry handed to every peer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// Room session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    /// Space joined when none is given on the command line.
    pub default_space: String,
    pub ice_servers: Vec<IceServerConfig>,
    /// Reaction overlay lifetime in milliseconds.
    pub reaction_ttl_ms: u32,
    /// Chat bubble lifetime in milliseconds.
    pub message_ttl_ms: u32,
    /// Longest chat bubble accepted, in characters.
    pub max_message_len: u32,
    /// Seconds an offer may stay unanswered before it is re-sent.
    pub negotiation_timeout_secs: u32,
    pub max_negotiation_retries: u32,
    /// Resolve offer glare by participant id ordering.
    pub deterministic_tie_break: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            default_space: "lobby".into(),
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            }],
            reaction_ttl_ms: 3000,
            message_ttl_ms: 6000,
            max_message_len: 280,
            negotiation_timeout_secs: 10,
            max_negotiation_retries: 3,
            deterministic_tie_break: true,
        }
    }
}
