//! Presence/signaling relay connection settings.

use serde::{Deserialize, Serialize};

/// Connection to the presence/signaling relay.
///
/// Either `url` points at a self-hosted `huddle-relay`, or
/// `project_ref` + `api_key` select a managed Supabase Realtime project.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    /// Full WebSocket URL. Takes precedence over `project_ref` when set.
    pub url: String,
    pub project_ref: String,
    pub api_key: String,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval: u32,
    /// Reconnect base delay in seconds.
    pub reconnect_delay: u32,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay: u32,
    /// Seconds to wait for a channel join acknowledgement.
    pub join_timeout: u32,
}

impl std::fmt::Debug for RealtimeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSettings")
            .field("url", &self.url)
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reconnect_delay", &self.reconnect_delay)
            .field("max_reconnect_delay", &self.max_reconnect_delay)
            .field("join_timeout", &self.join_timeout)
            .finish()
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/socket/websocket".into(),
            project_ref: String::new(),
            api_key: String::new(),
            heartbeat_interval: 25,
            reconnect_delay: 1,
            max_reconnect_delay: 30,
            join_timeout: 10,
        }
    }
}

/// Settings for the self-hosted relay binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub bind: String,
    pub port: u32,
    /// Seconds without a heartbeat before a client is dropped.
    pub idle_timeout: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 4000,
            idle_timeout: 60,
        }
    }
}
