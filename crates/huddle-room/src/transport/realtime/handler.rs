//! Incoming Phoenix message handler and presence parsing.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::connection::ChannelMap;
use super::types::{PhoenixMessage, PresenceMap, RealtimeEvent, TOPIC_PREFIX};

fn strip_topic_prefix(topic: &str) -> &str {
    topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic)
}

/// Parse a Phoenix presence map into `HashMap<key, Vec<meta>>`.
///
/// Presence arrives as `{ "key": { "metas": [{ ... }] } }`.
pub(crate) fn parse_presence_map(value: &serde_json::Value) -> PresenceMap {
    let mut result = PresenceMap::new();
    if let Some(obj) = value.as_object() {
        for (key, val) in obj {
            if let Some(metas) = val.get("metas").and_then(|m| m.as_array()) {
                result.insert(key.clone(), metas.clone());
            }
        }
    }
    result
}

/// Handle a single incoming Phoenix message.
pub(crate) async fn handle_phoenix_message(
    msg: &PhoenixMessage,
    channels: &ChannelMap,
    event_tx: &mpsc::Sender<RealtimeEvent>,
) {
    let topic = strip_topic_prefix(&msg.topic).to_string();

    let event = match msg.event.as_str() {
        "phx_reply" => {
            let status = msg
                .payload
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("error");
            let is_join_reply = channels
                .read()
                .await
                .get(&topic)
                .is_some_and(|ch| ch.join_ref.is_some() && ch.join_ref == msg.msg_ref);

            if !is_join_reply {
                if status != "ok" {
                    warn!(topic = %topic, status, payload = %msg.payload, "Request rejected by relay");
                }
                return;
            }
            if status == "ok" {
                debug!(topic = %topic, "Channel joined");
                RealtimeEvent::ChannelJoined { topic }
            } else {
                let message = msg
                    .payload
                    .get("response")
                    .and_then(|r| r.get("reason"))
                    .and_then(|r| r.as_str())
                    .unwrap_or("unknown error")
                    .to_string();
                warn!(topic = %topic, status, reason = %message, "Channel join rejected");
                RealtimeEvent::ChannelError { topic, message }
            }
        }
        "phx_error" => {
            warn!(topic = %topic, "Channel error");
            RealtimeEvent::ChannelError {
                topic,
                message: "channel error".to_string(),
            }
        }
        "phx_close" => {
            info!(topic = %topic, "Channel closed");
            RealtimeEvent::ChannelClosed { topic }
        }
        "broadcast" => {
            let inner_event = msg
                .payload
                .get("event")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown")
                .to_string();
            let inner_payload = msg
                .payload
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            debug!(topic = %topic, event = %inner_event, "Broadcast received");
            RealtimeEvent::Broadcast {
                topic,
                event: inner_event,
                payload: inner_payload,
            }
        }
        "presence_state" => {
            let state = parse_presence_map(&msg.payload);
            debug!(topic = %topic, users = state.len(), "Presence state received");
            RealtimeEvent::PresenceState { topic, state }
        }
        "presence_diff" => {
            let joins = msg
                .payload
                .get("joins")
                .map(parse_presence_map)
                .unwrap_or_default();
            let leaves = msg
                .payload
                .get("leaves")
                .map(parse_presence_map)
                .unwrap_or_default();
            debug!(
                topic = %topic,
                joins = joins.len(),
                leaves = leaves.len(),
                "Presence diff received"
            );
            RealtimeEvent::PresenceDiff {
                topic,
                joins,
                leaves,
            }
        }
        _ => {
            debug!(topic = %topic, event = %msg.event, "Unhandled Phoenix event");
            return;
        }
    };

    let _ = event_tx.send(event).await;
}
