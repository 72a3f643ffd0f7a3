//! Topic store: who joined which channel, their presence metas, and fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, RwLock};

use crate::protocol::{presence_entry, Frame, JoinOptions};

/// Identifies one WebSocket connection.
pub type ConnId = u64;

struct Member {
    tx: mpsc::Sender<String>,
    presence_key: String,
    broadcast_self: bool,
    meta: Option<Value>,
}

type Members = HashMap<ConnId, Member>;

/// Queue a frame for one member. Slow or gone clients lose the frame.
fn deliver(conn: ConnId, member: &Member, frame: &Frame) -> bool {
    let text = match frame.to_text() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            return false;
        }
    };
    match member.tx.try_send(text) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(conn, error = %e, "Dropping frame for slow client");
            false
        }
    }
}

fn metas_for(members: &Members, key: &str) -> Vec<Value> {
    members
        .values()
        .filter(|m| m.presence_key == key)
        .filter_map(|m| m.meta.clone())
        .collect()
}

fn single(key: &str, metas: Vec<Value>) -> Value {
    let mut map = Map::new();
    if !metas.is_empty() {
        map.insert(key.to_string(), presence_entry(metas));
    }
    Value::Object(map)
}

fn fan_out(members: &Members, frame: &Frame) {
    for (conn, member) in members {
        deliver(*conn, member, frame);
    }
}

/// Tell the topic that `meta` under `key` is gone. Metas other
/// connections still hold for the same key are re-announced as joins.
fn announce_departure(topic: &str, members: &Members, key: &str, meta: Value) {
    let remaining = metas_for(members, key);
    let frame = Frame::presence_diff(topic, single(key, remaining), single(key, vec![meta]));
    fan_out(members, &frame);
}

/// Thread-safe topic store.
#[derive(Clone, Default)]
pub struct RoomStore {
    topics: Arc<RwLock<HashMap<String, Members>>>,
    next_ref: Arc<AtomicU64>,
}

impl RoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn presence_ref(&self) -> String {
        format!("P{}", self.next_ref.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Join `conn` to `topic`. Returns the topic's current presence state.
    ///
    /// Joining a topic twice replaces the earlier membership.
    pub async fn join(
        &self,
        topic: &str,
        conn: ConnId,
        options: &JoinOptions,
        tx: mpsc::Sender<String>,
    ) -> Value {
        let mut map = self.topics.write().await;
        let members = map.entry(topic.to_string()).or_default();
        if let Some(old) = members.remove(&conn) {
            if let Some(meta) = old.meta {
                announce_departure(topic, members, &old.presence_key, meta);
            }
        }
        members.insert(
            conn,
            Member {
                tx,
                presence_key: options
                    .presence_key
                    .clone()
                    .unwrap_or_else(|| format!("conn-{conn}")),
                broadcast_self: options.broadcast_self,
                meta: None,
            },
        );
        presence_state(members)
    }

    /// Returns `false` if `conn` was not in `topic`.
    pub async fn leave(&self, topic: &str, conn: ConnId) -> bool {
        let mut map = self.topics.write().await;
        let Some(members) = map.get_mut(topic) else {
            return false;
        };
        let Some(member) = members.remove(&conn) else {
            return false;
        };
        if let Some(meta) = member.meta {
            announce_departure(topic, members, &member.presence_key, meta);
        }
        if members.is_empty() {
            map.remove(topic);
        }
        true
    }

    pub async fn is_member(&self, topic: &str, conn: ConnId) -> bool {
        self.topics
            .read()
            .await
            .get(topic)
            .is_some_and(|m| m.contains_key(&conn))
    }

    /// Replace the member's presence meta and diff it to the topic.
    pub async fn track(&self, topic: &str, conn: ConnId, payload: Value) -> bool {
        let mut meta = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("payload".into(), other);
                map
            }
        };
        meta.insert("phx_ref".into(), Value::String(self.presence_ref()));

        let mut map = self.topics.write().await;
        let Some(members) = map.get_mut(topic) else {
            return false;
        };
        let Some(member) = members.get_mut(&conn) else {
            return false;
        };
        let key = member.presence_key.clone();
        let old = member.meta.replace(Value::Object(meta.clone()));
        let leaves = single(&key, old.into_iter().collect());
        let frame = Frame::presence_diff(topic, single(&key, vec![Value::Object(meta)]), leaves);
        fan_out(members, &frame);
        true
    }

    pub async fn untrack(&self, topic: &str, conn: ConnId) -> bool {
        let mut map = self.topics.write().await;
        let Some(members) = map.get_mut(topic) else {
            return false;
        };
        let Some(old) = members.get_mut(&conn).and_then(|m| m.meta.take()) else {
            return false;
        };
        if let Some(key) = members.get(&conn).map(|m| m.presence_key.clone()) {
            announce_departure(topic, members, &key, old);
        }
        true
    }

    /// Relay a broadcast payload. Returns how many members got it, or
    /// `None` if the sender has not joined the topic.
    pub async fn broadcast(&self, topic: &str, conn: ConnId, payload: &Value) -> Option<usize> {
        let map = self.topics.read().await;
        let members = map.get(topic)?;
        let sender = members.get(&conn)?;
        let frame = Frame::push(topic, "broadcast", payload.clone());
        let delivered = members
            .iter()
            .filter(|(id, _)| **id != conn || sender.broadcast_self)
            .filter(|(id, member)| deliver(**id, member, &frame))
            .count();
        Some(delivered)
    }

    /// Drop a connection from every topic. Returns the topics it left.
    pub async fn disconnect(&self, conn: ConnId) -> Vec<String> {
        let mut map = self.topics.write().await;
        let mut left = Vec::new();
        for (topic, members) in map.iter_mut() {
            if let Some(member) = members.remove(&conn) {
                if let Some(meta) = member.meta {
                    announce_departure(topic, members, &member.presence_key, meta);
                }
                left.push(topic.clone());
            }
        }
        map.retain(|_, members| !members.is_empty());
        left
    }

    /// Remove members whose connection task is gone.
    pub async fn reap_stale(&self) -> usize {
        let stale: Vec<ConnId> = {
            let map = self.topics.read().await;
            map.values()
                .flat_map(|members| members.iter())
                .filter(|(_, m)| m.tx.is_closed())
                .map(|(id, _)| *id)
                .collect()
        };
        for conn in &stale {
            tracing::info!(conn, "Reaping stale connection");
            self.disconnect(*conn).await;
        }
        stale.len()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.read().await.len()
    }

    pub async fn member_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, HashMap::len)
    }
}

fn presence_state(members: &Members) -> Value {
    let mut grouped: HashMap<&str, Vec<Value>> = HashMap::new();
    for member in members.values() {
        if let Some(meta) = &member.meta {
            grouped
                .entry(member.presence_key.as_str())
                .or_default()
                .push(meta.clone());
        }
    }
    Value::Object(
        grouped
            .into_iter()
            .map(|(key, metas)| (key.to_string(), presence_entry(metas)))
            .collect(),
    )
}
