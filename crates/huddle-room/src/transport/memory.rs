//! In-process relay with failure injection.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{SignalTransport, Subscription, SubscriptionHandle, TransportEvent};
use crate::error::TransportError;
use crate::protocol::{PresenceRecord, Roster, SignalEnvelope, SignalKind};

/// Operation that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Subscribe,
    Track,
    Broadcast,
}

struct Member {
    tx: mpsc::UnboundedSender<TransportEvent>,
    record: Option<PresenceRecord>,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    rooms: HashMap<String, HashMap<u64, Member>>,
    failing: HashSet<FailPoint>,
    drops: HashMap<SignalKind, usize>,
    sent: HashMap<SignalKind, usize>,
}

impl HubState {
    fn check(&self, point: FailPoint) -> Result<(), TransportError> {
        if !self.failing.contains(&point) {
            return Ok(());
        }
        let reason = "injected failure".to_string();
        Err(match point {
            FailPoint::Subscribe => TransportError::Subscribe(reason),
            FailPoint::Track => TransportError::Track(reason),
            FailPoint::Broadcast => TransportError::Broadcast(reason),
        })
    }

    fn roster(&self, room: &str) -> Roster {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .values()
                    .filter_map(|m| m.record.as_ref())
                    .map(|r| (r.identity.id.clone(), r.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn sync_room(&self, room: &str) {
        let roster = self.roster(room);
        if let Some(members) = self.rooms.get(room) {
            for member in members.values() {
                let _ = member
                    .tx
                    .send(TransportEvent::PresenceSync(roster.clone()));
            }
        }
    }

    fn handle_of(&self, room: &str, participant: &str) -> Option<SubscriptionHandle> {
        self.rooms.get(room)?.iter().find_map(|(id, m)| {
            m.record
                .as_ref()
                .filter(|r| r.identity.id == participant)
                .map(|_| SubscriptionHandle {
                    id: *id,
                    room: room.to_string(),
                })
        })
    }

    /// Tell everyone but `participant` that it left, then resync them.
    fn blip(&self, room: &str, participant: &str) {
        let roster = self.roster(room);
        let Some(members) = self.rooms.get(room) else {
            return;
        };
        let others = members
            .values()
            .filter(|m| !m.record.as_ref().is_some_and(|r| r.identity.id == participant));
        for member in others {
            let _ = member
                .tx
                .send(TransportEvent::PresenceLeave(participant.to_string()));
            let _ = member.tx.send(TransportEvent::PresenceSync(roster.clone()));
        }
    }

    /// Remove a member, telling the others it left.
    fn remove(&mut self, handle: &SubscriptionHandle) -> Option<Member> {
        let members = self.rooms.get_mut(&handle.room)?;
        let member = members.remove(&handle.id)?;
        let gone = member.record.as_ref().map(|r| r.identity.id.clone());
        let still_present = gone.as_ref().is_some_and(|id| {
            members
                .values()
                .any(|m| m.record.as_ref().is_some_and(|r| &r.identity.id == id))
        });
        if let Some(id) = gone.filter(|_| !still_present) {
            for other in members.values() {
                let _ = other.tx.send(TransportEvent::PresenceLeave(id.clone()));
            }
        }
        if members.is_empty() {
            self.rooms.remove(&handle.room);
        } else {
            self.sync_room(&handle.room);
        }
        Some(member)
    }
}

/// Shared in-memory relay. Clones talk to the same rooms.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_failing(&self, point: FailPoint, failing: bool) {
        let mut state = self.state.lock().await;
        if failing {
            state.failing.insert(point);
        } else {
            state.failing.remove(&point);
        }
    }

    /// Silently lose the next `count` broadcasts of `kind`.
    pub async fn drop_next(&self, kind: SignalKind, count: usize) {
        self.state.lock().await.drops.insert(kind, count);
    }

    /// Number of broadcasts of `kind` actually relayed.
    pub async fn sent_count(&self, kind: SignalKind) -> usize {
        self.state.lock().await.sent.get(&kind).copied().unwrap_or(0)
    }

    pub async fn member_count(&self, room: &str) -> usize {
        self.state
            .lock()
            .await
            .rooms
            .get(room)
            .map_or(0, HashMap::len)
    }

    /// Drop a subscriber as if its connection died.
    pub async fn disconnect(&self, handle: &SubscriptionHandle) {
        let mut state = self.state.lock().await;
        if let Some(member) = state.remove(handle) {
            let _ = member
                .tx
                .send(TransportEvent::Closed("disconnected by relay".into()));
        }
    }

    /// Drop whichever subscriber tracks `participant`.
    pub async fn disconnect_participant(&self, room: &str, participant: &str) {
        let handle = self.state.lock().await.handle_of(room, participant);
        if let Some(handle) = handle {
            self.disconnect(&handle).await;
        }
    }

    /// Others briefly see `participant` leave and come back, while its
    /// own link stays up.
    pub async fn blip_presence(&self, room: &str, participant: &str) {
        self.state.lock().await.blip(room, participant);
    }

    /// `participant`'s link drops and recovers: the others see it leave
    /// and return, and it is told it reconnected.
    pub async fn reconnect(&self, room: &str, participant: &str) {
        let state = self.state.lock().await;
        let Some(handle) = state.handle_of(room, participant) else {
            return;
        };
        state.blip(room, participant);
        let roster = state.roster(room);
        if let Some(member) = state.rooms.get(room).and_then(|m| m.get(&handle.id)) {
            let _ = member.tx.send(TransportEvent::Reconnected);
            let _ = member.tx.send(TransportEvent::PresenceSync(roster));
        }
        debug!(room, participant, "Memory subscriber reconnected");
    }
}

#[async_trait]
impl SignalTransport for MemoryHub {
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError> {
        let mut state = self.state.lock().await;
        state.check(FailPoint::Subscribe)?;
        state.next_id += 1;
        let handle = SubscriptionHandle {
            id: state.next_id,
            room: room.to_string(),
        };
        let (tx, events) = mpsc::unbounded_channel();
        let roster = state.roster(room);
        if !roster.is_empty() {
            let _ = tx.send(TransportEvent::PresenceSync(roster));
        }
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(handle.id, Member { tx, record: None });
        debug!(room, handle = handle.id, "Memory subscriber joined");
        Ok(Subscription { handle, events })
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError> {
        self.state.lock().await.remove(handle);
        Ok(())
    }

    async fn track(
        &self,
        handle: &SubscriptionHandle,
        record: &PresenceRecord,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.check(FailPoint::Track)?;
        let member = state
            .rooms
            .get_mut(&handle.room)
            .and_then(|m| m.get_mut(&handle.id))
            .ok_or(TransportError::Closed)?;
        member.record = Some(record.clone());
        state.sync_room(&handle.room);
        Ok(())
    }

    async fn broadcast(
        &self,
        handle: &SubscriptionHandle,
        envelope: &SignalEnvelope,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.check(FailPoint::Broadcast)?;
        let members = state
            .rooms
            .get(&handle.room)
            .filter(|m| m.contains_key(&handle.id))
            .ok_or(TransportError::Closed)?;

        let targets: Vec<_> = members
            .iter()
            .filter(|(id, _)| **id != handle.id)
            .map(|(_, m)| m.tx.clone())
            .collect();

        if let Some(left) = state.drops.get_mut(&envelope.kind).filter(|n| **n > 0) {
            *left -= 1;
            debug!(kind = %envelope.kind, from = %envelope.from, "Dropping envelope");
            return Ok(());
        }

        for tx in targets {
            let _ = tx.send(TransportEvent::Broadcast(envelope.clone()));
        }
        *state.sent.entry(envelope.kind).or_default() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ParticipantIdentity;

    fn record(id: &str) -> PresenceRecord {
        PresenceRecord::new(ParticipantIdentity::new(id, id.to_uppercase()), false)
    }

    async fn next_sync(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> Roster {
        loop {
            match events.recv().await {
                Some(TransportEvent::PresenceSync(r)) => return r,
                Some(_) => continue,
                None => panic!("channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn track_delivers_full_roster_to_everyone() {
        let hub = MemoryHub::new();
        let mut a = hub.subscribe("room:1").await.unwrap();
        let mut b = hub.subscribe("room:1").await.unwrap();

        hub.track(&a.handle, &record("alice")).await.unwrap();
        hub.track(&b.handle, &record("bob")).await.unwrap();

        next_sync(&mut a.events).await;
        let roster = next_sync(&mut a.events).await;
        assert_eq!(roster.len(), 2);
        next_sync(&mut b.events).await;
        let roster = next_sync(&mut b.events).await;
        assert!(roster.contains_key("alice") && roster.contains_key("bob"));
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let hub = MemoryHub::new();
        let mut a = hub.subscribe("r").await.unwrap();
        let mut b = hub.subscribe("r").await.unwrap();

        let env = SignalEnvelope::new(SignalKind::Ready, "alice");
        hub.broadcast(&a.handle, &env).await.unwrap();

        assert!(matches!(
            b.events.recv().await,
            Some(TransportEvent::Broadcast(e)) if e.kind == SignalKind::Ready
        ));
        assert!(a.events.try_recv().is_err());
        assert_eq!(hub.sent_count(SignalKind::Ready).await, 1);
    }

    #[tokio::test]
    async fn unsubscribe_emits_leave_then_sync() {
        let hub = MemoryHub::new();
        let a = hub.subscribe("r").await.unwrap();
        let mut b = hub.subscribe("r").await.unwrap();
        hub.track(&a.handle, &record("alice")).await.unwrap();
        next_sync(&mut b.events).await;

        hub.unsubscribe(&a.handle).await.unwrap();

        assert!(matches!(
            b.events.recv().await,
            Some(TransportEvent::PresenceLeave(id)) if id == "alice"
        ));
        assert!(next_sync(&mut b.events).await.is_empty());
        assert_eq!(hub.member_count("r").await, 1);
    }

    #[tokio::test]
    async fn drop_next_loses_only_that_kind() {
        let hub = MemoryHub::new();
        let a = hub.subscribe("r").await.unwrap();
        let mut b = hub.subscribe("r").await.unwrap();
        hub.drop_next(SignalKind::Answer, 1).await;

        hub.broadcast(&a.handle, &SignalEnvelope::new(SignalKind::Answer, "a"))
            .await
            .unwrap();
        hub.broadcast(&a.handle, &SignalEnvelope::new(SignalKind::Ready, "a"))
            .await
            .unwrap();
        hub.broadcast(&a.handle, &SignalEnvelope::new(SignalKind::Answer, "a"))
            .await
            .unwrap();

        let kinds: Vec<_> = [b.events.recv().await, b.events.recv().await]
            .into_iter()
            .map(|e| match e {
                Some(TransportEvent::Broadcast(env)) => env.kind,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec![SignalKind::Ready, SignalKind::Answer]);
    }

    #[tokio::test]
    async fn injected_failures() {
        let hub = MemoryHub::new();
        hub.set_failing(FailPoint::Subscribe, true).await;
        assert!(matches!(
            hub.subscribe("r").await,
            Err(TransportError::Subscribe(_))
        ));
        hub.set_failing(FailPoint::Subscribe, false).await;

        let a = hub.subscribe("r").await.unwrap();
        hub.set_failing(FailPoint::Track, true).await;
        assert!(matches!(
            hub.track(&a.handle, &record("alice")).await,
            Err(TransportError::Track(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_closes_subscriber() {
        let hub = MemoryHub::new();
        let mut a = hub.subscribe("r").await.unwrap();
        hub.disconnect(&a.handle).await;
        assert!(matches!(
            a.events.recv().await,
            Some(TransportEvent::Closed(_))
        ));
        assert!(matches!(
            hub.broadcast(&a.handle, &SignalEnvelope::new(SignalKind::Ready, "a"))
                .await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn reconnect_blips_others_and_notifies_member() {
        let hub = MemoryHub::new();
        let mut a = hub.subscribe("r").await.unwrap();
        let mut b = hub.subscribe("r").await.unwrap();
        hub.track(&a.handle, &record("alice")).await.unwrap();
        hub.track(&b.handle, &record("bob")).await.unwrap();
        while a.events.try_recv().is_ok() {}
        while b.events.try_recv().is_ok() {}

        hub.reconnect("r", "bob").await;

        assert!(matches!(
            a.events.recv().await,
            Some(TransportEvent::PresenceLeave(id)) if id == "bob"
        ));
        assert_eq!(next_sync(&mut a.events).await.len(), 2);
        assert!(matches!(
            b.events.recv().await,
            Some(TransportEvent::Reconnected)
        ));
        assert_eq!(next_sync(&mut b.events).await.len(), 2);
        assert_eq!(hub.member_count("r").await, 2);

        hub.disconnect_participant("r", "bob").await;
        assert!(matches!(
            b.events.recv().await,
            Some(TransportEvent::Closed(_))
        ));
        assert_eq!(hub.member_count("r").await, 1);
    }
}
