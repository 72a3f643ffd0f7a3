use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::actor::{PeerActor, Signaler};
use super::{NegotiationSettings, PeerCommand, PeerUpdate};
use crate::error::RtcError;
use crate::media::MediaTrack;
use crate::protocol::IceServer;
use crate::rtc::RtcEngine;

struct PeerHandle {
    epoch: u64,
    /// Join instance of the remote participant this connection serves.
    remote_session: Option<String>,
    inbox: mpsc::UnboundedSender<PeerCommand>,
    task: JoinHandle<()>,
}

/// Registry of peer actors, one per remote participant.
///
/// Local tracks are held by reference and attached to every connection
/// created afterwards.
pub(crate) struct PeerManager {
    signaler: Signaler,
    engine: Arc<dyn RtcEngine>,
    ice_servers: Vec<IceServer>,
    settings: NegotiationSettings,
    updates: mpsc::UnboundedSender<PeerUpdate>,
    local_tracks: Vec<(String, Arc<MediaTrack>)>,
    peers: HashMap<String, PeerHandle>,
    next_epoch: u64,
}

impl PeerManager {
    pub(crate) fn new(
        signaler: Signaler,
        engine: Arc<dyn RtcEngine>,
        ice_servers: Vec<IceServer>,
        settings: NegotiationSettings,
        updates: mpsc::UnboundedSender<PeerUpdate>,
    ) -> Self {
        Self {
            signaler,
            engine,
            ice_servers,
            settings,
            updates,
            local_tracks: Vec::new(),
            peers: HashMap::new(),
            next_epoch: 0,
        }
    }

    /// Ensure an actor exists for `peer_id`. A different `remote_session`
    /// means the participant rejoined, so the old connection is replaced.
    /// Returns whether a new actor was started.
    pub(crate) fn create_or_get(
        &mut self,
        peer_id: &str,
        remote_session: Option<&str>,
    ) -> Result<bool, RtcError> {
        if let Some(handle) = self.peers.get_mut(peer_id) {
            let known = handle.remote_session.clone();
            match (known.as_deref(), remote_session) {
                (Some(known), Some(seen)) if known != seen => {}
                (None, Some(seen)) => {
                    handle.remote_session = Some(seen.to_string());
                    return Ok(false);
                }
                _ => return Ok(false),
            }
            info!(peer = %peer_id, "Participant rejoined, replacing connection");
            self.teardown(peer_id);
        }

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let (rtc_tx, rtc_rx) = mpsc::unbounded_channel();
        let mut conn = self
            .engine
            .create_connection(peer_id, &self.ice_servers, rtc_tx)?;
        for (stream_id, track) in &self.local_tracks {
            if let Err(e) = conn.add_track(Arc::clone(track), stream_id) {
                warn!(peer = %peer_id, track = %track.id(), error = %e, "Failed to attach local track");
            }
        }

        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let actor = PeerActor::new(
            peer_id.to_string(),
            epoch,
            self.signaler.clone(),
            conn,
            self.settings.clone(),
            self.updates.clone(),
        );
        let task = tokio::spawn(actor.run(inbox_rx, rtc_rx));
        self.peers.insert(
            peer_id.to_string(),
            PeerHandle {
                epoch,
                remote_session: remote_session.map(str::to_string),
                inbox,
                task,
            },
        );
        debug!(peer = %peer_id, epoch, tracks = self.local_tracks.len(), "Peer connection created");
        Ok(true)
    }

    /// Queue a command for one peer. Returns `false` if it has no actor.
    pub(crate) fn send(&self, peer_id: &str, cmd: PeerCommand) -> bool {
        self.peers
            .get(peer_id)
            .is_some_and(|h| h.inbox.send(cmd).is_ok())
    }

    pub(crate) fn is_current(&self, peer_id: &str, epoch: u64) -> bool {
        self.peers.get(peer_id).is_some_and(|h| h.epoch == epoch)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    /// Attach a local track to every connection and renegotiate each.
    pub(crate) fn add_local_track(&mut self, track: Arc<MediaTrack>, stream_id: &str) {
        for handle in self.peers.values() {
            let _ = handle.inbox.send(PeerCommand::AddTrack {
                track: Arc::clone(&track),
                stream_id: stream_id.to_string(),
            });
        }
        self.local_tracks.push((stream_id.to_string(), track));
    }

    pub(crate) fn remove_local_track(&mut self, track_id: &str) {
        self.local_tracks.retain(|(_, t)| t.id() != track_id);
        for handle in self.peers.values() {
            let _ = handle.inbox.send(PeerCommand::RemoveTrack {
                track_id: track_id.to_string(),
            });
        }
    }

    /// Close one peer's connection. The actor finishes on its own task.
    pub(crate) fn teardown(&mut self, peer_id: &str) -> bool {
        match self.peers.remove(peer_id) {
            Some(handle) => {
                let _ = handle.inbox.send(PeerCommand::Close);
                debug!(peer = %peer_id, epoch = handle.epoch, "Peer connection torn down");
                true
            }
            None => false,
        }
    }

    /// Close every connection but keep the local tracks for the next ones.
    pub(crate) fn close_all(&mut self) -> usize {
        let ids: Vec<String> = self.peers.keys().cloned().collect();
        for id in &ids {
            self.teardown(id);
        }
        ids.len()
    }

    /// Close every connection and wait for the actors to finish.
    pub(crate) async fn teardown_all(&mut self) {
        let handles: Vec<PeerHandle> = self.peers.drain().map(|(_, h)| h).collect();
        for handle in &handles {
            let _ = handle.inbox.send(PeerCommand::Close);
        }
        for handle in handles {
            if let Err(e) = handle.task.await {
                warn!(error = %e, "Peer actor ended abnormally");
            }
        }
        self.local_tracks.clear();
    }
}
