//! Per-connection handler: decode Phoenix frames, apply them to the
//! store, and pump queued frames back out to the socket.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::{Frame, JoinOptions, PHOENIX_TOPIC};
use crate::rooms::{ConnId, RoomStore};

static NEXT_CONN: AtomicU64 = AtomicU64::new(1);

/// Outbound queue depth per client.
const QUEUE_DEPTH: usize = 256;

/// What one connection has joined, plus its outbound queue.
pub struct ClientState {
    id: ConnId,
    tx: mpsc::Sender<String>,
    topics: HashSet<String>,
}

impl ClientState {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            id: NEXT_CONN.fetch_add(1, Ordering::Relaxed),
            tx,
            topics: HashSet::new(),
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Apply one client frame. Returns the frames owed directly to this
    /// client, in order.
    pub async fn dispatch(&mut self, frame: Frame, store: &RoomStore) -> Vec<Frame> {
        let Frame {
            topic,
            event,
            payload,
            msg_ref,
        } = frame;

        if topic == PHOENIX_TOPIC {
            return match event.as_str() {
                "heartbeat" => vec![Frame::ok(&topic, msg_ref)],
                _ => vec![Frame::error(&topic, msg_ref, "unknown event")],
            };
        }

        if event == "phx_join" {
            let options = JoinOptions::from_payload(&payload);
            let state = store.join(&topic, self.id, &options, self.tx.clone()).await;
            self.topics.insert(topic.clone());
            tracing::info!(conn = self.id, topic = %topic, key = ?options.presence_key, "Joined");
            return vec![Frame::ok(&topic, msg_ref), Frame::presence_state(&topic, state)];
        }

        if !self.topics.contains(&topic) {
            return vec![Frame::error(&topic, msg_ref, "unmatched topic")];
        }

        match event.as_str() {
            "phx_leave" => {
                self.topics.remove(&topic);
                store.leave(&topic, self.id).await;
                tracing::info!(conn = self.id, topic = %topic, "Left");
                vec![Frame::ok(&topic, msg_ref)]
            }
            "broadcast" => {
                let delivered = store.broadcast(&topic, self.id, &payload).await;
                tracing::trace!(conn = self.id, topic = %topic, ?delivered, "Broadcast");
                vec![Frame::ok(&topic, msg_ref)]
            }
            "presence" => {
                let kind = payload.get("event").and_then(Value::as_str).unwrap_or_default();
                let applied = match kind {
                    "track" => {
                        let meta = payload.get("payload").cloned().unwrap_or(Value::Null);
                        store.track(&topic, self.id, meta).await
                    }
                    "untrack" => store.untrack(&topic, self.id).await,
                    _ => return vec![Frame::error(&topic, msg_ref, "unknown presence event")],
                };
                if applied || kind == "untrack" {
                    vec![Frame::ok(&topic, msg_ref)]
                } else {
                    vec![Frame::error(&topic, msg_ref, "presence rejected")]
                }
            }
            _ => vec![Frame::error(&topic, msg_ref, "unknown event")],
        }
    }

    /// Leave every joined topic.
    pub async fn close(&mut self, store: &RoomStore) {
        self.topics.clear();
        store.disconnect(self.id).await;
    }
}

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    store: RoomStore,
    idle_timeout: Duration,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<String>(QUEUE_DEPTH);
    let mut client = ClientState::new(tx.clone());

    tracing::info!(peer = %addr, conn = client.id(), "Client connected");

    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            Some(msg) = rx.recv() => {
                if sink.send(Message::Text(msg.into())).await.is_err() {
                    break;
                }
            }

            _ = &mut idle => {
                tracing::info!(peer = %addr, conn = client.id(), "Idle timeout");
                break;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
                        let frame = match serde_json::from_str::<Frame>(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "Invalid frame");
                                continue;
                            }
                        };
                        for reply in client.dispatch(frame, &store).await {
                            match reply.to_text() {
                                Ok(text) => {
                                    if tx.try_send(text).is_err() {
                                        tracing::debug!(conn = client.id(), "Reply queue full");
                                    }
                                }
                                Err(e) => tracing::warn!(error = %e, "Failed to encode reply"),
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    client.close(&store).await;
    tracing::info!(peer = %addr, conn = client.id(), "Client disconnected");
}
