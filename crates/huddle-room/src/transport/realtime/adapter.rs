//! [`SignalTransport`] over the realtime client.
//!
//! One channel per room. Presence state and diffs are folded into a full
//! roster so subscribers always receive the complete room view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::RealtimeClient;
use super::types::{ChannelConfig, PresenceMap, RealtimeConfig, RealtimeEvent};
use crate::error::TransportError;
use crate::protocol::{PresenceRecord, Roster, SignalEnvelope, SIGNAL_EVENT};
use crate::transport::{SignalTransport, Subscription, SubscriptionHandle, TransportEvent};

type JoinReply = oneshot::Sender<Result<(), TransportError>>;

struct Route {
    handle_id: u64,
    tx: mpsc::UnboundedSender<TransportEvent>,
    roster: Roster,
    pending_join: Option<JoinReply>,
}

type RouteMap = Arc<Mutex<HashMap<String, Route>>>;

pub struct RealtimeTransport {
    client: RealtimeClient,
    presence_key: String,
    routes: RouteMap,
    next_id: AtomicU64,
    join_timeout: Duration,
    translator: JoinHandle<()>,
}

impl RealtimeTransport {
    /// Connect to the relay. `presence_key` is the local participant id.
    pub fn connect(config: RealtimeConfig, presence_key: impl Into<String>) -> Self {
        let join_timeout = config.join_timeout();
        let (client, events) = RealtimeClient::connect(config);
        let routes: RouteMap = Arc::default();
        let translator = tokio::spawn(translate_events(events, Arc::clone(&routes)));
        Self {
            client,
            presence_key: presence_key.into(),
            routes,
            next_id: AtomicU64::new(1),
            join_timeout,
            translator,
        }
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    /// Leave every room and close the socket.
    pub async fn shutdown(&self) {
        self.client.disconnect().await;
    }

    async fn abandon(&self, room: &str) {
        self.routes.lock().await.remove(room);
        let _ = self.client.leave_channel(room).await;
    }

    async fn ensure_route(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        match self.routes.lock().await.get(&handle.room) {
            Some(route) if route.handle_id == handle.id => Ok(()),
            _ => Err(TransportError::Closed),
        }
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        self.translator.abort();
    }
}

#[async_trait]
impl SignalTransport for RealtimeTransport {
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError> {
        let (join_tx, join_rx) = oneshot::channel();
        let (tx, events) = mpsc::unbounded_channel();
        let handle = SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            room: room.to_string(),
        };

        {
            let mut routes = self.routes.lock().await;
            if routes.contains_key(room) {
                return Err(TransportError::Subscribe(format!(
                    "already subscribed to {room}"
                )));
            }
            routes.insert(
                room.to_string(),
                Route {
                    handle_id: handle.id,
                    tx,
                    roster: Roster::new(),
                    pending_join: Some(join_tx),
                },
            );
        }

        if let Err(e) = self
            .client
            .join_channel(room, ChannelConfig::room(&self.presence_key))
            .await
        {
            self.routes.lock().await.remove(room);
            return Err(TransportError::Subscribe(e.to_string()));
        }

        let outcome = match tokio::time::timeout(self.join_timeout, join_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Subscribe("join abandoned".into())),
            Err(_) => Err(TransportError::Subscribe(format!(
                "no join reply within {}s",
                self.join_timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(()) => {
                info!(room, "Subscribed to room channel");
                Ok(Subscription { handle, events })
            }
            Err(e) => {
                warn!(room, error = %e, "Room subscribe failed");
                self.abandon(room).await;
                Err(e)
            }
        }
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        {
            let mut routes = self.routes.lock().await;
            match routes.get(&handle.room) {
                Some(route) if route.handle_id == handle.id => {
                    routes.remove(&handle.room);
                }
                _ => return Ok(()),
            }
        }
        self.client.presence_untrack(&handle.room).await?;
        self.client.leave_channel(&handle.room).await
    }

    async fn track(
        &self,
        handle: &SubscriptionHandle,
        record: &PresenceRecord,
    ) -> Result<(), TransportError> {
        self.ensure_route(handle).await?;
        let payload =
            serde_json::to_value(record).map_err(|e| TransportError::Track(e.to_string()))?;
        self.client
            .presence_track(&handle.room, payload)
            .await
            .map_err(|e| TransportError::Track(e.to_string()))
    }

    async fn broadcast(
        &self,
        handle: &SubscriptionHandle,
        envelope: &SignalEnvelope,
    ) -> Result<(), TransportError> {
        self.ensure_route(handle).await?;
        let payload =
            serde_json::to_value(envelope).map_err(|e| TransportError::Broadcast(e.to_string()))?;
        self.client
            .broadcast(&handle.room, SIGNAL_EVENT, payload)
            .await
            .map_err(|e| TransportError::Broadcast(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Event translation
// ---------------------------------------------------------------------------

/// The most recent meta for a presence key, decoded as a record.
fn latest_record(metas: &[serde_json::Value]) -> Option<PresenceRecord> {
    metas
        .last()
        .and_then(|meta| serde_json::from_value(meta.clone()).ok())
}

fn roster_from_state(state: &PresenceMap) -> Roster {
    state
        .iter()
        .filter_map(|(key, metas)| latest_record(metas).map(|r| (key.clone(), r)))
        .collect()
}

/// Replace the roster with a full state. Ids missing from it are not
/// reported as leaves; only a diff removes a participant.
fn apply_state(roster: &mut Roster, state: &PresenceMap) {
    *roster = roster_from_state(state);
}

/// Apply a diff. Returns ids that left without rejoining in the same diff.
fn apply_diff(roster: &mut Roster, joins: &PresenceMap, leaves: &PresenceMap) -> Vec<String> {
    let mut gone = Vec::new();
    for key in leaves.keys() {
        if !joins.contains_key(key) && roster.remove(key).is_some() {
            gone.push(key.clone());
        }
    }
    for (key, metas) in joins {
        match latest_record(metas) {
            Some(record) => {
                roster.insert(key.clone(), record);
            }
            None => debug!(key = %key, "Ignoring presence meta without a record"),
        }
    }
    gone
}

fn publish(route: &Route, gone: Vec<String>) {
    for id in gone {
        let _ = route.tx.send(TransportEvent::PresenceLeave(id));
    }
    let _ = route
        .tx
        .send(TransportEvent::PresenceSync(route.roster.clone()));
}

async fn translate_events(mut events: mpsc::Receiver<RealtimeEvent>, routes: RouteMap) {
    let mut dropped = false;
    while let Some(event) = events.recv().await {
        match event {
            RealtimeEvent::Connected if dropped => {
                dropped = false;
                let routes = routes.lock().await;
                info!(rooms = routes.len(), "Realtime relay reconnected");
                for route in routes.values() {
                    let _ = route.tx.send(TransportEvent::Reconnected);
                }
            }
            RealtimeEvent::Connected => info!("Realtime relay connected"),
            RealtimeEvent::Disconnected => {
                dropped = true;
                warn!("Realtime relay disconnected");
            }
            RealtimeEvent::ChannelJoined { topic } => {
                if let Some(reply) = routes
                    .lock()
                    .await
                    .get_mut(&topic)
                    .and_then(|r| r.pending_join.take())
                {
                    let _ = reply.send(Ok(()));
                }
            }
            RealtimeEvent::ChannelError { topic, message } => {
                let mut routes = routes.lock().await;
                match routes.get_mut(&topic).and_then(|r| r.pending_join.take()) {
                    Some(reply) => {
                        let _ = reply.send(Err(TransportError::Subscribe(message)));
                    }
                    None => warn!(topic = %topic, message = %message, "Room channel error"),
                }
            }
            RealtimeEvent::ChannelClosed { topic } => {
                if let Some(route) = routes.lock().await.remove(&topic) {
                    let _ = route
                        .tx
                        .send(TransportEvent::Closed("channel closed by relay".into()));
                }
            }
            RealtimeEvent::Broadcast {
                topic,
                event,
                payload,
            } => {
                if event != SIGNAL_EVENT {
                    debug!(topic = %topic, event = %event, "Ignoring foreign broadcast");
                    continue;
                }
                match serde_json::from_value::<SignalEnvelope>(payload) {
                    Ok(envelope) => {
                        if let Some(route) = routes.lock().await.get(&topic) {
                            let _ = route.tx.send(TransportEvent::Broadcast(envelope));
                        }
                    }
                    Err(e) => debug!(topic = %topic, error = %e, "Malformed signal envelope"),
                }
            }
            RealtimeEvent::PresenceState { topic, state } => {
                if let Some(route) = routes.lock().await.get_mut(&topic) {
                    apply_state(&mut route.roster, &state);
                    publish(route, Vec::new());
                }
            }
            RealtimeEvent::PresenceDiff {
                topic,
                joins,
                leaves,
            } => {
                if let Some(route) = routes.lock().await.get_mut(&topic) {
                    let gone = apply_diff(&mut route.roster, &joins, &leaves);
                    publish(route, gone);
                }
            }
            RealtimeEvent::Error(message) => warn!(error = %message, "Realtime client error"),
        }
    }
}
