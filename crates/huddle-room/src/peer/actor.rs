use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{NegotiationSettings, NegotiationState, PeerCommand, PeerUpdate, PeerUpdateKind};
use crate::error::SignalError;
use crate::media::{MediaStream, MediaTrack};
use crate::protocol::{IceCandidate, SessionDescription, SignalEnvelope, SignalKind};
use crate::rtc::{RtcConnection, RtcConnectionState, RtcEvent};
use crate::transport::{SignalTransport, SubscriptionHandle};

/// Sends point-to-point envelopes on behalf of the local participant.
#[derive(Clone)]
pub(crate) struct Signaler {
    pub transport: Arc<dyn SignalTransport>,
    pub handle: SubscriptionHandle,
    pub local_id: String,
    pub session_id: String,
}

impl Signaler {
    async fn send<T: Serialize>(&self, kind: SignalKind, to: &str, data: &T) {
        let envelope = SignalEnvelope::new(kind, self.local_id.as_str())
            .to(to)
            .in_session(self.session_id.as_str())
            .with_data(data);
        if let Err(e) = self.transport.broadcast(&self.handle, &envelope).await {
            warn!(peer = %to, kind = %kind, error = %e, "Failed to send signal");
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Owns the connection to one remote participant. All transitions of
/// that connection happen on this task, one message at a time.
pub(super) struct PeerActor {
    peer_id: String,
    epoch: u64,
    signaler: Signaler,
    conn: Box<dyn RtcConnection>,
    settings: NegotiationSettings,
    /// Polite peers yield on offer glare.
    polite: bool,
    state: NegotiationState,
    was_connected: bool,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    renegotiate_pending: bool,
    offer_deadline: Option<Instant>,
    retries: u32,
    remote_stream_id: Option<String>,
    remote_tracks: Vec<Arc<MediaTrack>>,
    updates: mpsc::UnboundedSender<PeerUpdate>,
    round: String,
}

impl PeerActor {
    pub(super) fn new(
        peer_id: String,
        epoch: u64,
        signaler: Signaler,
        conn: Box<dyn RtcConnection>,
        settings: NegotiationSettings,
        updates: mpsc::UnboundedSender<PeerUpdate>,
    ) -> Self {
        let polite = signaler.local_id.as_str() > peer_id.as_str();
        Self {
            peer_id,
            epoch,
            signaler,
            conn,
            settings,
            polite,
            state: NegotiationState::Idle,
            was_connected: false,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            renegotiate_pending: false,
            offer_deadline: None,
            retries: 0,
            remote_stream_id: None,
            remote_tracks: Vec::new(),
            updates,
            round: String::new(),
        }
    }

    pub(super) async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<PeerCommand>,
        mut rtc_events: mpsc::UnboundedReceiver<RtcEvent>,
    ) {
        debug!(peer = %self.peer_id, epoch = self.epoch, polite = self.polite, "Peer actor started");
        loop {
            tokio::select! {
                cmd = inbox.recv() => match cmd {
                    Some(PeerCommand::Close) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(event) = rtc_events.recv() => self.handle_rtc_event(event).await,
                _ = wait_until(self.offer_deadline) => self.on_offer_timeout().await,
            }
        }
        self.close();
    }

    async fn handle_command(&mut self, cmd: PeerCommand) {
        match cmd {
            PeerCommand::Negotiate => self.negotiate().await,
            PeerCommand::Offer(desc) => self.on_offer(desc).await,
            PeerCommand::Answer(desc) => self.on_answer(desc).await,
            PeerCommand::Candidate(candidate) => self.on_candidate(candidate).await,
            PeerCommand::AddTrack { track, stream_id } => {
                match self.conn.add_track(track, &stream_id) {
                    Ok(()) => self.negotiate().await,
                    Err(e) => warn!(peer = %self.peer_id, error = %e, "Failed to attach track"),
                }
            }
            PeerCommand::RemoveTrack { track_id } => match self.conn.remove_track(&track_id) {
                Ok(()) => self.negotiate().await,
                Err(e) => warn!(peer = %self.peer_id, error = %e, "Failed to detach track"),
            },
            PeerCommand::Close => {}
        }
    }

    // -----------------------------------------------------------------------
    // Offer / answer
    // -----------------------------------------------------------------------

    async fn negotiate(&mut self) {
        if !self.state.is_stable() {
            debug!(peer = %self.peer_id, state = %self.state, "Negotiation queued until current round completes");
            self.renegotiate_pending = true;
            return;
        }
        self.retries = 0;
        self.send_offer().await;
    }

    async fn send_offer(&mut self) {
        self.round = huddle_common::new_correlation_id();
        let offer = match self.conn.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(peer = %self.peer_id, error = %e, "Failed to create offer");
                return;
            }
        };
        if let Err(e) = self.conn.set_local_description(offer.clone()).await {
            warn!(peer = %self.peer_id, error = %e, "Failed to apply local offer");
            return;
        }
        self.signaler
            .send(SignalKind::Offer, &self.peer_id, &offer)
            .await;
        self.offer_deadline = Some(Instant::now() + self.settings.timeout);
        self.transition(NegotiationState::HaveLocalOffer);
    }

    async fn on_offer(&mut self, desc: SessionDescription) {
        match self.state {
            NegotiationState::Idle | NegotiationState::Connected => {}
            NegotiationState::HaveLocalOffer if self.settings.tie_break && self.polite => {
                info!(peer = %self.peer_id, round = %self.round, "Offer glare, rolling back local offer");
                if let Err(e) = self.conn.rollback().await {
                    warn!(peer = %self.peer_id, error = %e, "Rollback failed");
                    return;
                }
                self.offer_deadline = None;
                self.renegotiate_pending = true;
                self.transition(self.stable_state());
            }
            state => {
                let err = SignalError::OutOfState {
                    kind: "offer",
                    state: state.as_str(),
                };
                debug!(peer = %self.peer_id, error = %err, "Dropping offer");
                return;
            }
        }
        self.accept_offer(desc).await;
    }

    async fn accept_offer(&mut self, desc: SessionDescription) {
        self.transition(NegotiationState::HaveRemoteOffer);
        if let Err(e) = self.conn.set_remote_description(desc).await {
            warn!(peer = %self.peer_id, error = %e, "Rejected remote offer");
            self.transition(self.stable_state());
            return;
        }
        self.remote_description_set = true;
        self.flush_candidates().await;

        let answer = match self.conn.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(peer = %self.peer_id, error = %e, "Failed to create answer");
                self.transition(self.stable_state());
                return;
            }
        };
        if let Err(e) = self.conn.set_local_description(answer.clone()).await {
            warn!(peer = %self.peer_id, error = %e, "Failed to apply local answer");
            self.transition(self.stable_state());
            return;
        }
        self.signaler
            .send(SignalKind::Answer, &self.peer_id, &answer)
            .await;
        self.mark_connected().await;
    }

    async fn on_answer(&mut self, desc: SessionDescription) {
        if self.state != NegotiationState::HaveLocalOffer {
            let err = SignalError::OutOfState {
                kind: "answer",
                state: self.state.as_str(),
            };
            debug!(peer = %self.peer_id, error = %err, "Dropping answer");
            return;
        }
        if let Err(e) = self.conn.set_remote_description(desc).await {
            warn!(peer = %self.peer_id, error = %e, "Rejected remote answer");
            return;
        }
        self.remote_description_set = true;
        self.flush_candidates().await;
        self.mark_connected().await;
    }

    async fn mark_connected(&mut self) {
        self.offer_deadline = None;
        self.was_connected = true;
        self.transition(NegotiationState::Connected);
        if self.renegotiate_pending {
            self.renegotiate_pending = false;
            self.retries = 0;
            self.send_offer().await;
        }
    }

    async fn on_offer_timeout(&mut self) {
        self.offer_deadline = None;
        if self.state != NegotiationState::HaveLocalOffer {
            return;
        }
        if let Err(e) = self.conn.rollback().await {
            warn!(peer = %self.peer_id, error = %e, "Rollback after timeout failed");
        }
        self.transition(self.stable_state());

        if self.retries >= self.settings.max_retries {
            warn!(
                peer = %self.peer_id,
                retries = self.retries,
                "Negotiation abandoned, waiting for the next trigger"
            );
            return;
        }
        self.retries += 1;
        info!(peer = %self.peer_id, attempt = self.retries, "Offer unanswered, re-sending");
        self.send_offer().await;
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    async fn on_candidate(&mut self, candidate: IceCandidate) {
        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            debug!(
                peer = %self.peer_id,
                buffered = self.pending_candidates.len(),
                "Buffered candidate until remote description"
            );
            return;
        }
        self.apply_candidate(candidate).await;
    }

    async fn flush_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        if let Err(e) = self.conn.add_ice_candidate(candidate).await {
            debug!(peer = %self.peer_id, error = %e, "Candidate rejected");
        }
    }

    // -----------------------------------------------------------------------
    // Engine events
    // -----------------------------------------------------------------------

    async fn handle_rtc_event(&mut self, event: RtcEvent) {
        match event {
            RtcEvent::LocalCandidate(candidate) => {
                self.signaler
                    .send(SignalKind::Candidate, &self.peer_id, &candidate)
                    .await;
            }
            RtcEvent::RemoteTrack { stream_id, track } => {
                self.remote_stream_id.get_or_insert(stream_id);
                if !self.remote_tracks.iter().any(|t| t.id() == track.id()) {
                    debug!(peer = %self.peer_id, track = %track.id(), kind = track.kind().as_str(), "Remote track added");
                    self.remote_tracks.push(track);
                    self.publish_remote_stream();
                }
            }
            RtcEvent::RemoteTrackEnded { track_id } => {
                let before = self.remote_tracks.len();
                self.remote_tracks.retain(|t| t.id() != track_id);
                if self.remote_tracks.len() != before {
                    debug!(peer = %self.peer_id, track = %track_id, "Remote track ended");
                    self.publish_remote_stream();
                }
            }
            RtcEvent::ConnectionState(state) => match state {
                RtcConnectionState::Failed => {
                    warn!(peer = %self.peer_id, "Media connection failed")
                }
                other => debug!(peer = %self.peer_id, state = ?other, "Media connection state"),
            },
            RtcEvent::Speaking(speaking) => self.update(PeerUpdateKind::Speaking(speaking)),
        }
    }

    fn publish_remote_stream(&self) {
        let stream = if self.remote_tracks.is_empty() {
            None
        } else {
            Some(MediaStream {
                id: self.remote_stream_id.clone().unwrap_or_default(),
                tracks: self.remote_tracks.clone(),
            })
        };
        self.update(PeerUpdateKind::RemoteStream(stream));
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn stable_state(&self) -> NegotiationState {
        if self.was_connected {
            NegotiationState::Connected
        } else {
            NegotiationState::Idle
        }
    }

    fn transition(&mut self, next: NegotiationState) {
        if self.state == next {
            return;
        }
        debug!(peer = %self.peer_id, from = %self.state, to = %next, round = %self.round, "Negotiation state");
        self.state = next;
        self.update(PeerUpdateKind::State(next));
    }

    fn update(&self, kind: PeerUpdateKind) {
        let _ = self.updates.send(PeerUpdate {
            peer_id: self.peer_id.clone(),
            epoch: self.epoch,
            kind,
        });
    }

    fn close(&mut self) {
        self.conn.close();
        for track in self.remote_tracks.drain(..) {
            track.stop();
        }
        self.transition(NegotiationState::Closed);
        debug!(peer = %self.peer_id, epoch = self.epoch, "Peer actor stopped");
    }
}
