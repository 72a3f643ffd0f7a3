use std::time::Duration;

use huddle_config::schema::RoomSettings;

use crate::protocol::IceServer;

/// Runtime settings of one room session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Transport room key, e.g. `room:lobby`.
    pub room_id: String,
    pub ice_servers: Vec<IceServer>,
    pub reaction_ttl: Duration,
    pub message_ttl: Duration,
    pub max_message_len: usize,
    pub negotiation_timeout: Duration,
    pub max_negotiation_retries: u32,
    pub deterministic_tie_break: bool,
    /// Extra attempts for a failed presence track.
    pub track_retries: u32,
    pub track_retry_delay: Duration,
    /// How often presence is re-published while it is known to be stale.
    pub presence_retry_interval: Duration,
}

impl SessionConfig {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self::from_settings(room_id, &RoomSettings::default())
    }

    pub fn from_settings(room_id: impl Into<String>, settings: &RoomSettings) -> Self {
        Self {
            room_id: room_id.into(),
            ice_servers: settings
                .ice_servers
                .iter()
                .map(|s| IceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone(),
                    credential: s.credential.clone(),
                })
                .collect(),
            reaction_ttl: Duration::from_millis(settings.reaction_ttl_ms.into()),
            message_ttl: Duration::from_millis(settings.message_ttl_ms.into()),
            max_message_len: settings.max_message_len as usize,
            negotiation_timeout: Duration::from_secs(settings.negotiation_timeout_secs.into()),
            max_negotiation_retries: settings.max_negotiation_retries,
            deterministic_tie_break: settings.deterministic_tie_break,
            track_retries: 2,
            track_retry_delay: Duration::from_millis(500),
            presence_retry_interval: Duration::from_secs(5),
        }
    }
}
