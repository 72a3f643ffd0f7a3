//! Configuration, protocol types, and event/command enums for the realtime client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use huddle_config::RealtimeSettings;
use serde::{Deserialize, Serialize};

/// Prefix the relay puts in front of every channel topic.
pub(crate) const TOPIC_PREFIX: &str = "realtime:";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RealtimeConfig {
    /// Explicit WebSocket endpoint. Takes precedence over `project_ref`.
    pub url: Option<String>,
    /// Supabase project reference (e.g., "ojmqzagktzkualzgpcbq").
    pub project_ref: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional access token (JWT) for authenticated connections.
    pub access_token: Option<String>,
    pub heartbeat_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_delay_secs: u64,
    pub connect_timeout_secs: u64,
    /// How long `subscribe` waits for the join reply.
    pub join_timeout_secs: u64,
}

impl std::fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("join_timeout_secs", &self.join_timeout_secs)
            .finish()
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: None,
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            heartbeat_interval_secs: 25,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
            join_timeout_secs: 10,
        }
    }
}

impl RealtimeConfig {
    pub fn from_settings(settings: &RealtimeSettings) -> Self {
        Self {
            url: Some(settings.url.clone()).filter(|u| !u.is_empty()),
            project_ref: settings.project_ref.clone(),
            api_key: settings.api_key.clone(),
            access_token: None,
            heartbeat_interval_secs: u64::from(settings.heartbeat_interval),
            reconnect_delay_secs: u64::from(settings.reconnect_delay),
            max_reconnect_delay_secs: u64::from(settings.max_reconnect_delay),
            join_timeout_secs: u64::from(settings.join_timeout),
            ..Self::default()
        }
    }

    /// Build the WebSocket URL, including protocol version and key.
    pub(crate) fn ws_url(&self) -> String {
        match &self.url {
            Some(url) => {
                let sep = if url.contains('?') { '&' } else { '?' };
                let mut full = format!("{url}{sep}vsn=1.0.0");
                if !self.api_key.is_empty() {
                    full.push_str(&format!("&apikey={}", self.api_key));
                }
                full
            }
            None => format!(
                "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
                self.project_ref, self.api_key
            ),
        }
    }

    pub(crate) fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

static REF_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_ref() -> String {
    REF_COUNTER.fetch_add(1, Ordering::Relaxed).to_string()
}

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    /// Message on a room channel, with a fresh ref.
    pub(crate) fn channel(topic: &str, event: &str, payload: serde_json::Value) -> Self {
        Self {
            topic: format!("{TOPIC_PREFIX}{topic}"),
            event: event.to_string(),
            payload,
            msg_ref: Some(next_ref()),
        }
    }

    pub(crate) fn heartbeat() -> Self {
        Self {
            topic: "phoenix".to_string(),
            event: "heartbeat".to_string(),
            payload: serde_json::json!({}),
            msg_ref: Some(next_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub broadcast: BroadcastConfig,
    pub presence: PresenceConfig,
}

#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Whether to receive your own broadcasts (Supabase "self" key).
    pub self_send: bool,
    /// Whether broadcasts are acknowledged by the server.
    pub ack: bool,
}

#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// The key used to identify this client in presence state.
    pub key: String,
}

impl ChannelConfig {
    /// Room channel: no echo of own broadcasts, presence keyed by participant.
    pub fn room(presence_key: &str) -> Self {
        Self {
            broadcast: BroadcastConfig {
                self_send: false,
                ack: false,
            },
            presence: PresenceConfig {
                key: presence_key.to_string(),
            },
        }
    }

    /// Serialize to the JSON payload expected by phx_join.
    pub(crate) fn to_join_payload(&self, access_token: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "config": {
                "broadcast": {
                    "self": self.broadcast.self_send,
                    "ack": self.broadcast.ack
                },
                "presence": {
                    "key": self.presence.key
                }
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = serde_json::Value::String(token.to_string());
        }
        payload
    }
}

// ---------------------------------------------------------------------------
// Events & Commands
// ---------------------------------------------------------------------------

/// Presence metas keyed by presence key.
pub type PresenceMap = HashMap<String, Vec<serde_json::Value>>;

#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    Connected,
    Disconnected,
    /// The relay acknowledged our join on a channel.
    ChannelJoined { topic: String },
    ChannelError { topic: String, message: String },
    /// The relay closed a channel we had joined.
    ChannelClosed { topic: String },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    /// Full presence state (sent after every join).
    PresenceState { topic: String, state: PresenceMap },
    PresenceDiff {
        topic: String,
        joins: PresenceMap,
        leaves: PresenceMap,
    },
    Error(String),
}

#[derive(Debug)]
pub(crate) enum RealtimeCommand {
    JoinChannel {
        topic: String,
        config: ChannelConfig,
    },
    LeaveChannel {
        topic: String,
    },
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },
    PresenceTrack {
        topic: String,
        payload: serde_json::Value,
    },
    PresenceUntrack {
        topic: String,
    },
    Disconnect,
}
