//! Short-lived display overlays: emoji reactions and chat bubbles.
//!
//! Each (participant, kind) slot holds one overlay. Showing a new one
//! bumps the slot's generation and restarts its timer; an expiry only
//! clears the slot if its generation is still current.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::RoomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Reaction,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OverlayExpired {
    pub owner: String,
    pub kind: OverlayKind,
    pub generation: u64,
}

struct Slot {
    generation: u64,
    timer: JoinHandle<()>,
}

pub(crate) struct EphemeralBus {
    reaction_ttl: Duration,
    message_ttl: Duration,
    max_message_len: usize,
    next_generation: u64,
    slots: HashMap<(String, OverlayKind), Slot>,
    expired_tx: mpsc::UnboundedSender<OverlayExpired>,
}

impl EphemeralBus {
    pub(crate) fn new(
        reaction_ttl: Duration,
        message_ttl: Duration,
        max_message_len: usize,
        expired_tx: mpsc::UnboundedSender<OverlayExpired>,
    ) -> Self {
        Self {
            reaction_ttl,
            message_ttl,
            max_message_len,
            next_generation: 0,
            slots: HashMap::new(),
            expired_tx,
        }
    }

    pub(crate) fn reaction(&self, emoji: &str) -> Result<String, RoomError> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(RoomError::InvalidInput("reaction must not be empty".into()));
        }
        Ok(emoji.to_string())
    }

    /// Trim and cap a chat bubble.
    pub(crate) fn message(&self, text: &str) -> Result<String, RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::InvalidInput("message must not be empty".into()));
        }
        Ok(text.chars().take(self.max_message_len).collect())
    }

    /// Start (or restart) the expiry timer for a slot.
    pub(crate) fn show(&mut self, owner: &str, kind: OverlayKind) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        let ttl = match kind {
            OverlayKind::Reaction => self.reaction_ttl,
            OverlayKind::Message => self.message_ttl,
        };
        let tx = self.expired_tx.clone();
        let expired = OverlayExpired {
            owner: owner.to_string(),
            kind,
            generation,
        };
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let _ = tx.send(expired);
        });
        if let Some(old) = self
            .slots
            .insert((owner.to_string(), kind), Slot { generation, timer })
        {
            old.timer.abort();
        }
        generation
    }

    /// Consume an expiry. Returns `true` if the slot should be cleared.
    pub(crate) fn take_expired(&mut self, expired: &OverlayExpired) -> bool {
        let key = (expired.owner.clone(), expired.kind);
        match self.slots.get(&key) {
            Some(slot) if slot.generation == expired.generation => {
                self.slots.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Stop one slot's timer. Returns `false` if nothing was showing.
    pub(crate) fn cancel(&mut self, owner: &str, kind: OverlayKind) -> bool {
        match self.slots.remove(&(owner.to_string(), kind)) {
            Some(slot) => {
                slot.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Drop all timers belonging to one participant.
    pub(crate) fn forget(&mut self, owner: &str) {
        self.slots.retain(|(o, _), slot| {
            if o == owner {
                slot.timer.abort();
                false
            } else {
                true
            }
        });
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> (EphemeralBus, mpsc::UnboundedReceiver<OverlayExpired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EphemeralBus::new(Duration::from_secs(3), Duration::from_secs(6), 5, tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reaction_expires_after_ttl() {
        let (mut bus, mut rx) = bus();
        let start = tokio::time::Instant::now();
        let generation = bus.show("bob", OverlayKind::Reaction);

        let expired = rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(expired.generation, generation);
        assert!(bus.take_expired(&expired));
        assert!(!bus.take_expired(&expired));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_overlay_restarts_timer() {
        let (mut bus, mut rx) = bus();
        let start = tokio::time::Instant::now();
        bus.show("bob", OverlayKind::Reaction);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let second = bus.show("bob", OverlayKind::Reaction);

        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.generation, second);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(bus.take_expired(&expired));
    }

    #[test]
    fn stale_generation_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut bus = EphemeralBus::new(Duration::from_secs(3), Duration::from_secs(6), 10, tx);
            let first = bus.show("bob", OverlayKind::Message);
            bus.show("bob", OverlayKind::Message);
            let stale = OverlayExpired {
                owner: "bob".into(),
                kind: OverlayKind::Message,
                generation: first,
            };
            assert!(!bus.take_expired(&stale));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn message_uses_longer_ttl_and_forget_cancels() {
        let (mut bus, mut rx) = bus();
        let start = tokio::time::Instant::now();
        bus.show("bob", OverlayKind::Message);
        bus.show("carol", OverlayKind::Reaction);
        bus.forget("carol");

        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.owner, "bob");
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_slot_never_expires() {
        let (mut bus, mut rx) = bus();
        bus.show("alice", OverlayKind::Reaction);
        assert!(bus.cancel("alice", OverlayKind::Reaction));
        assert!(!bus.cancel("alice", OverlayKind::Reaction));

        bus.show("alice", OverlayKind::Message);
        let expired = rx.recv().await.unwrap();
        assert_eq!(expired.kind, OverlayKind::Message);
    }

    #[test]
    fn message_is_trimmed_and_capped() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let bus = EphemeralBus::new(Duration::from_secs(3), Duration::from_secs(6), 5, tx);
        assert_eq!(bus.message("  hello world ").unwrap(), "hello");
        assert!(matches!(bus.message("   "), Err(RoomError::InvalidInput(_))));
        assert!(matches!(bus.reaction(""), Err(RoomError::InvalidInput(_))));
        assert_eq!(bus.reaction(" 👍 ").unwrap(), "👍");
    }
}
