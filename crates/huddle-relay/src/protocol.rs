//! Phoenix Channels v1 JSON frames, the subset the room client speaks.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Topic used for socket-level heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub msg_ref: Option<String>,
}

impl Frame {
    /// Server push with no ref.
    pub fn push(topic: &str, event: &str, payload: Value) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: None,
        }
    }

    pub fn ok(topic: &str, msg_ref: Option<String>) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_reply".into(),
            payload: json!({"status": "ok", "response": {}}),
            msg_ref,
        }
    }

    pub fn error(topic: &str, msg_ref: Option<String>, reason: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: "phx_reply".into(),
            payload: json!({"status": "error", "response": {"reason": reason}}),
            msg_ref,
        }
    }

    pub fn presence_state(topic: &str, state: Value) -> Self {
        Self::push(topic, "presence_state", state)
    }

    pub fn presence_diff(topic: &str, joins: Value, leaves: Value) -> Self {
        Self::push(topic, "presence_diff", json!({"joins": joins, "leaves": leaves}))
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Options a client sends in its `phx_join` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOptions {
    /// Presence key. Clients that send none are keyed by connection.
    pub presence_key: Option<String>,
    /// Echo the client's own broadcasts back to it.
    pub broadcast_self: bool,
}

impl JoinOptions {
    pub fn from_payload(payload: &Value) -> Self {
        let config = payload.get("config");
        let presence_key = config
            .and_then(|c| c.get("presence"))
            .and_then(|p| p.get("key"))
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        let broadcast_self = config
            .and_then(|c| c.get("broadcast"))
            .and_then(|b| b.get("self"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            presence_key,
            broadcast_self,
        }
    }
}

/// Wrap metas the way Phoenix presence does: `{"metas": [...]}`.
pub fn presence_entry(metas: Vec<Value>) -> Value {
    json!({ "metas": metas })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_options_read_supabase_config() {
        let payload = json!({
            "config": {
                "broadcast": {"self": true, "ack": false},
                "presence": {"key": "alice"}
            }
        });
        let opts = JoinOptions::from_payload(&payload);
        assert_eq!(opts.presence_key.as_deref(), Some("alice"));
        assert!(opts.broadcast_self);
    }

    #[test]
    fn join_options_default_when_missing() {
        let opts = JoinOptions::from_payload(&json!({"config": {"presence": {"key": ""}}}));
        assert_eq!(opts.presence_key, None);
        assert!(!opts.broadcast_self);
    }

    #[test]
    fn reply_shape() {
        let frame = Frame::error("realtime:room:1", Some("3".into()), "unmatched topic");
        let v: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(v["event"], "phx_reply");
        assert_eq!(v["ref"], "3");
        assert_eq!(v["payload"]["status"], "error");
        assert_eq!(v["payload"]["response"]["reason"], "unmatched topic");
    }

    #[test]
    fn parses_client_frame_without_ref() {
        let frame: Frame =
            serde_json::from_str(r#"{"topic":"phoenix","event":"heartbeat","payload":{}}"#).unwrap();
        assert_eq!(frame.topic, PHOENIX_TOPIC);
        assert!(frame.msg_ref.is_none());
    }
}
