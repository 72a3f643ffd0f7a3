//! Room-scoped pub/sub channel used for presence and signaling.
//!
//! The room core only sees [`SignalTransport`]. [`MemoryHub`] relays in
//! process; [`RealtimeTransport`] speaks Phoenix Channels to a relay.

mod memory;
pub mod realtime;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::protocol::{PresenceRecord, Roster, SignalEnvelope};

pub use memory::{FailPoint, MemoryHub};
pub use realtime::RealtimeTransport;

/// Identifies one subscription to one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: u64,
    pub room: String,
}

/// What a subscriber observes on its room channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The full current roster. Sent on every roster change.
    PresenceSync(Roster),
    PresenceLeave(String),
    Broadcast(SignalEnvelope),
    /// The link to the relay dropped and came back. Signals sent in
    /// between may be lost; presence is restored by the transport.
    Reconnected,
    /// The subscription is gone and will not recover.
    Closed(String),
}

pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
pub trait SignalTransport: Send + Sync {
    async fn subscribe(&self, room: &str) -> Result<Subscription, TransportError>;
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), TransportError>;
    /// Publish presence. Idempotent; the last call wins.
    async fn track(
        &self,
        handle: &SubscriptionHandle,
        record: &PresenceRecord,
    ) -> Result<(), TransportError>;
    /// At-most-once delivery to every other subscriber, FIFO per sender.
    async fn broadcast(
        &self,
        handle: &SubscriptionHandle,
        envelope: &SignalEnvelope,
    ) -> Result<(), TransportError>;
}
