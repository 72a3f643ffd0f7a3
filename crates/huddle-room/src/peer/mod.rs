//! Per-participant negotiation.
//!
//! Each remote participant gets a [`actor::PeerActor`] task that owns its
//! connection. The session talks to it through [`PeerCommand`]s and hears
//! back through [`PeerUpdate`]s; nothing else touches the connection.

mod actor;
mod manager;

use std::sync::Arc;
use std::time::Duration;

use crate::media::{MediaStream, MediaTrack};
use crate::protocol::{IceCandidate, SessionDescription};

pub(crate) use actor::Signaler;
pub(crate) use manager::PeerManager;


/// Offer/answer state of one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    HaveLocalOffer,
    HaveRemoteOffer,
    Connected,
    Closed,
}

impl NegotiationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HaveLocalOffer => "have-local-offer",
            Self::HaveRemoteOffer => "have-remote-offer",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }

    /// No offer is outstanding in either direction.
    pub fn is_stable(&self) -> bool {
        matches!(self, Self::Idle | Self::Connected)
    }
}

impl std::fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NegotiationSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    pub tie_break: bool,
}

#[derive(Debug)]
pub(crate) enum PeerCommand {
    /// Start (or queue) an offer toward the peer.
    Negotiate,
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
    AddTrack {
        track: Arc<MediaTrack>,
        stream_id: String,
    },
    RemoveTrack {
        track_id: String,
    },
    Close,
}

#[derive(Debug)]
pub(crate) enum PeerUpdateKind {
    State(NegotiationState),
    RemoteStream(Option<MediaStream>),
    Speaking(bool),
}

/// Report from a peer actor. `epoch` tells a replaced actor's late
/// reports apart from the current one's.
#[derive(Debug)]
pub(crate) struct PeerUpdate {
    pub peer_id: String,
    pub epoch: u64,
    pub kind: PeerUpdateKind,
}
