//! Local peer list derived from full-roster presence syncs.

use std::collections::BTreeMap;

use crate::ephemeral::OverlayKind;
use crate::media::MediaStream;
use crate::peer::NegotiationState;
use crate::protocol::{ParticipantIdentity, Roster};

/// One other participant as seen locally.
#[derive(Debug, Clone)]
pub struct Peer {
    pub participant_id: String,
    pub identity: ParticipantIdentity,
    pub connection_state: NegotiationState,
    pub is_muted: bool,
    pub remote_stream: Option<MediaStream>,
    pub is_speaking: bool,
    pub reaction: Option<String>,
    pub message: Option<String>,
}

impl Peer {
    fn new(participant_id: String, identity: ParticipantIdentity, is_muted: bool) -> Self {
        Self {
            participant_id,
            identity,
            connection_state: NegotiationState::Idle,
            is_muted,
            remote_stream: None,
            is_speaking: false,
            reaction: None,
            message: None,
        }
    }
}

/// Connection-side facts about a peer, kept even before presence has
/// announced it.
#[derive(Debug, Clone, Default)]
pub(crate) struct LinkState {
    pub state: NegotiationState,
    pub remote_stream: Option<MediaStream>,
    pub is_speaking: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SyncOutcome {
    /// Ids seen for the first time.
    pub joined: Vec<String>,
    pub changed: bool,
}

pub(crate) struct PresenceDirectory {
    local_id: String,
    peers: BTreeMap<String, Peer>,
}

impl PresenceDirectory {
    pub(crate) fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            peers: BTreeMap::new(),
        }
    }

    /// Upsert every roster entry except self.
    ///
    /// Ids missing from the roster are kept; only an explicit leave
    /// removes a peer.
    pub(crate) fn apply_sync(&mut self, roster: &Roster) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        for (id, record) in roster {
            if *id == self.local_id {
                continue;
            }
            match self.peers.get_mut(id) {
                Some(peer) => {
                    if peer.identity != record.identity || peer.is_muted != record.is_muted {
                        peer.identity = record.identity.clone();
                        peer.is_muted = record.is_muted;
                        outcome.changed = true;
                    }
                }
                None => {
                    self.peers.insert(
                        id.clone(),
                        Peer::new(id.clone(), record.identity.clone(), record.is_muted),
                    );
                    outcome.joined.push(id.clone());
                    outcome.changed = true;
                }
            }
        }
        outcome.joined.sort();
        outcome
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Peer> {
        self.peers.remove(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    #[cfg(test)]
    pub(crate) fn get(&self, id: &str) -> Option<&Peer> {
        self.peers.get(id)
    }

    pub(crate) fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub(crate) fn clear(&mut self) {
        self.peers.clear();
    }

    /// Copy connection facts onto a known peer. Returns whether anything changed.
    pub(crate) fn apply_link(&mut self, id: &str, link: &LinkState) -> bool {
        let Some(peer) = self.peers.get_mut(id) else {
            return false;
        };
        let stream_changed = match (&peer.remote_stream, &link.remote_stream) {
            (None, None) => false,
            (Some(a), Some(b)) => {
                a.id != b.id
                    || a.tracks.len() != b.tracks.len()
                    || a.tracks.iter().zip(&b.tracks).any(|(x, y)| x.id() != y.id())
            }
            _ => true,
        };
        let changed = stream_changed
            || peer.connection_state != link.state
            || peer.is_speaking != link.is_speaking;
        peer.connection_state = link.state;
        peer.remote_stream = link.remote_stream.clone();
        peer.is_speaking = link.is_speaking;
        changed
    }

    pub(crate) fn set_overlay(&mut self, id: &str, kind: OverlayKind, text: Option<String>) -> bool {
        let Some(peer) = self.peers.get_mut(id) else {
            return false;
        };
        let slot = match kind {
            OverlayKind::Reaction => &mut peer.reaction,
            OverlayKind::Message => &mut peer.message,
        };
        if *slot == text {
            return false;
        }
        *slot = text;
        true
    }
}
