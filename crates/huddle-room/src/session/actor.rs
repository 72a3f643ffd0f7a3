use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use huddle_common::{EventBus, SessionId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{RoomEvent, RoomSnapshot, RoomStatus, SessionConfig, SessionDeps};
use crate::ephemeral::{EphemeralBus, OverlayExpired, OverlayKind};
use crate::error::{RoomError, TransportError};
use crate::media::MediaStream;
use crate::moderation::ModerationController;
use crate::peer::{NegotiationSettings, PeerCommand, PeerManager, PeerUpdate, PeerUpdateKind, Signaler};
use crate::presence::{LinkState, PresenceDirectory};
use crate::protocol::{
    IceCandidate, ParticipantIdentity, PresenceRecord, Roster, SignalEnvelope, SignalKind,
};
use crate::transport::{SignalTransport, SubscriptionHandle, TransportEvent};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, RoomError>>;

pub(crate) enum Command {
    /// `None` toggles.
    SetMuted {
        muted: Option<bool>,
        reply: Reply<bool>,
    },
    ShareScreen {
        stream: MediaStream,
        reply: Reply<()>,
    },
    StopScreen {
        reply: Reply<()>,
    },
    React {
        emoji: String,
        reply: Reply<()>,
    },
    Say {
        text: String,
        reply: Reply<()>,
    },
    Moderate {
        kind: SignalKind,
        target: String,
        reply: Reply<()>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

/// Results of work spawned off the coordinator loop.
enum Internal {
    Verified {
        envelope: SignalEnvelope,
        outcome: Result<(), RoomError>,
    },
}

pub(super) struct Startup {
    pub config: SessionConfig,
    pub identity: ParticipantIdentity,
    pub session_id: SessionId,
    pub deps: SessionDeps,
    pub moderation: ModerationController,
    pub snapshots: watch::Sender<RoomSnapshot>,
    pub events: EventBus<RoomEvent>,
}

struct Inboxes {
    updates: mpsc::UnboundedReceiver<PeerUpdate>,
    expired: mpsc::UnboundedReceiver<OverlayExpired>,
    internal: mpsc::UnboundedReceiver<Internal>,
}

/// Session task entry point: acquire the microphone, subscribe, publish
/// presence, announce `ready`, then coordinate until the session ends.
pub(super) async fn run(startup: Startup, commands: mpsc::UnboundedReceiver<Command>) {
    let Startup {
        config,
        identity,
        session_id,
        deps,
        moderation,
        snapshots,
        events,
    } = startup;
    let room_id = config.room_id.clone();

    let mic = match deps.devices.acquire_microphone().await {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!(room_id = %room_id, error = %e, "Microphone unavailable, joining listen-only");
            events.publish(RoomEvent::MediaUnavailable(e));
            None
        }
    };

    let subscription = match deps.transport.subscribe(&room_id).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(room_id = %room_id, error = %e, "Subscribe failed");
            if let Some(mic) = &mic {
                mic.stop_all();
            }
            let status = RoomStatus::Error(e.to_string());
            snapshots.send_modify(|s| s.status = status.clone());
            events.publish(RoomEvent::StatusChanged(status));
            return;
        }
    };

    let (updates_tx, updates) = mpsc::unbounded_channel();
    let (expired_tx, expired) = mpsc::unbounded_channel();
    let (internal_tx, internal) = mpsc::unbounded_channel();
    let signaler = Signaler {
        transport: Arc::clone(&deps.transport),
        handle: subscription.handle.clone(),
        local_id: identity.id.clone(),
        session_id: session_id.to_string(),
    };
    let mut peers = PeerManager::new(
        signaler,
        Arc::clone(&deps.engine),
        config.ice_servers.clone(),
        NegotiationSettings {
            timeout: config.negotiation_timeout,
            max_retries: config.max_negotiation_retries,
            tie_break: config.deterministic_tie_break,
        },
        updates_tx,
    );
    if let Some(mic) = &mic {
        for track in &mic.tracks {
            peers.add_local_track(Arc::clone(track), &mic.id);
        }
    }
    let bus = EphemeralBus::new(
        config.reaction_ttl,
        config.message_ttl,
        config.max_message_len,
        expired_tx,
    );

    let mut actor = SessionActor {
        directory: PresenceDirectory::new(identity.id.as_str()),
        is_muted: mic.is_none(),
        transport: Arc::clone(&deps.transport),
        handle: subscription.handle,
        links: HashMap::new(),
        departed: HashSet::new(),
        reconciling: false,
        retrack_at: None,
        status: RoomStatus::Connecting,
        screen: None,
        reaction: None,
        message: None,
        closed: false,
        config,
        identity,
        session_id,
        moderation,
        peers,
        bus,
        mic,
        snapshots,
        events,
        internal_tx,
    };

    if let Err(e) = actor.track_presence().await {
        warn!(room_id = %room_id, error = %e, "Presence track failed");
        actor.teardown(RoomStatus::Error(e.to_string())).await;
        return;
    }
    actor.set_status(RoomStatus::Connected);

    if let Err(e) = actor.announce(None).await {
        warn!(room_id = %room_id, error = %e, "Ready broadcast failed");
        actor.teardown(RoomStatus::Error(e.to_string())).await;
        return;
    }
    info!(room_id = %room_id, listen_only = actor.mic.is_none(), "Joined room");

    actor
        .run(
            commands,
            subscription.events,
            Inboxes {
                updates,
                expired,
                internal,
            },
        )
        .await;
}

struct SessionActor {
    config: SessionConfig,
    identity: ParticipantIdentity,
    session_id: SessionId,
    transport: Arc<dyn SignalTransport>,
    handle: SubscriptionHandle,
    moderation: ModerationController,
    peers: PeerManager,
    directory: PresenceDirectory,
    /// Connection facts per peer, kept even before presence shows the peer.
    links: HashMap<String, LinkState>,
    /// Peers whose connection a presence leave tore down.
    departed: HashSet<String>,
    /// The next sync is authoritative: peers missing from it are gone.
    reconciling: bool,
    /// Pending re-publish of presence that could not be tracked.
    retrack_at: Option<Instant>,
    bus: EphemeralBus,
    status: RoomStatus,
    is_muted: bool,
    mic: Option<MediaStream>,
    screen: Option<MediaStream>,
    reaction: Option<String>,
    message: Option<String>,
    snapshots: watch::Sender<RoomSnapshot>,
    events: EventBus<RoomEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    closed: bool,
}

impl SessionActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        mut inboxes: Inboxes,
    ) {
        while !self.closed {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => self.teardown(RoomStatus::Left).await,
                },
                event = transport_events.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.teardown(RoomStatus::Error("transport closed".into())).await,
                },
                Some(update) = inboxes.updates.recv() => self.on_peer_update(update),
                Some(expired) = inboxes.expired.recv() => self.on_overlay_expired(expired),
                Some(internal) = inboxes.internal.recv() => self.on_internal(internal).await,
                _ = tokio::time::sleep_until(self.retrack_at.unwrap_or_else(Instant::now)),
                    if self.retrack_at.is_some() => self.retry_presence().await,
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetMuted { muted, reply } => {
                let result = self.set_muted(muted).await;
                let _ = reply.send(result);
            }
            Command::ShareScreen { stream, reply } => {
                let _ = reply.send(self.share_screen(stream));
            }
            Command::StopScreen { reply } => {
                self.stop_screen();
                let _ = reply.send(Ok(()));
            }
            Command::React { emoji, reply } => {
                let result = self.send_overlay(OverlayKind::Reaction, &emoji).await;
                let _ = reply.send(result);
            }
            Command::Say { text, reply } => {
                let result = self.send_overlay(OverlayKind::Message, &text).await;
                let _ = reply.send(result);
            }
            Command::Moderate {
                kind,
                target,
                reply,
            } => {
                let result = self.moderate(kind, &target).await;
                let _ = reply.send(result);
            }
            Command::Leave { reply } => {
                self.teardown(RoomStatus::Left).await;
                let _ = reply.send(());
            }
        }
    }

    /// Mute or unmute and publish it. If presence cannot be updated the
    /// change is undone.
    async fn set_muted(&mut self, muted: Option<bool>) -> Result<bool, RoomError> {
        let next = muted.unwrap_or(!self.is_muted);
        if self.mic.is_none() {
            if next {
                return Ok(true);
            }
            return Err(RoomError::InvalidInput(
                "no microphone available, session is listen-only".into(),
            ));
        }
        let previous = self.is_muted;
        if !self.apply_mute(next) {
            return Ok(next);
        }
        if let Err(e) = self.track_presence().await {
            warn!(room_id = %self.config.room_id, error = %e, "Presence track failed, reverting mute");
            self.apply_mute(previous);
            return Err(e.into());
        }
        self.retrack_at = None;
        Ok(next)
    }

    /// Set the microphone tracks and the local flag. Returns whether the
    /// flag changed.
    fn apply_mute(&mut self, muted: bool) -> bool {
        if let Some(mic) = &self.mic {
            for track in mic.audio_tracks() {
                track.set_enabled(!muted);
            }
        }
        if muted == self.is_muted {
            return false;
        }
        self.is_muted = muted;
        self.publish();
        debug!(room_id = %self.config.room_id, muted, "Mute changed");
        true
    }

    fn share_screen(&mut self, stream: MediaStream) -> Result<(), RoomError> {
        if self.screen.is_some() {
            return Err(RoomError::InvalidInput("screen share already active".into()));
        }
        if stream.tracks.is_empty() {
            return Err(RoomError::InvalidInput("screen stream has no tracks".into()));
        }
        for track in &stream.tracks {
            self.peers.add_local_track(Arc::clone(track), &stream.id);
        }
        info!(room_id = %self.config.room_id, peers = self.peers.len(), "Screen share started");
        self.screen = Some(stream);
        self.publish();
        Ok(())
    }

    fn stop_screen(&mut self) {
        let Some(stream) = self.screen.take() else {
            return;
        };
        for track in &stream.tracks {
            self.peers.remove_local_track(track.id());
        }
        stream.stop_all();
        info!(room_id = %self.config.room_id, "Screen share stopped");
        self.publish();
    }

    async fn send_overlay(&mut self, kind: OverlayKind, raw: &str) -> Result<(), RoomError> {
        let base = SignalEnvelope::new(signal_kind(kind), self.identity.id.as_str())
            .in_session(self.session_id.as_str());
        let envelope = match kind {
            OverlayKind::Reaction => {
                let emoji = self.bus.reaction(raw)?;
                self.reaction = Some(emoji.clone());
                base.with_emoji(emoji)
            }
            OverlayKind::Message => {
                let text = self.bus.message(raw)?;
                self.message = Some(text.clone());
                base.with_text(text)
            }
        };
        self.bus.show(&self.identity.id, kind);
        self.publish();
        if let Err(e) = self.transport.broadcast(&self.handle, &envelope).await {
            self.bus.cancel(&self.identity.id, kind);
            self.local_overlay(kind).take();
            self.publish();
            return Err(e.into());
        }
        Ok(())
    }

    fn local_overlay(&mut self, kind: OverlayKind) -> &mut Option<String> {
        match kind {
            OverlayKind::Reaction => &mut self.reaction,
            OverlayKind::Message => &mut self.message,
        }
    }

    async fn moderate(&mut self, kind: SignalKind, target: &str) -> Result<(), RoomError> {
        if target == self.identity.id {
            return Err(RoomError::InvalidInput(format!("cannot {kind} yourself")));
        }
        if !self.directory.contains(target) {
            return Err(RoomError::InvalidInput(format!("{target} is not in the room")));
        }
        let envelope = self
            .moderation
            .command(kind, target, self.session_id.as_str());
        self.transport.broadcast(&self.handle, &envelope).await?;
        info!(room_id = %self.config.room_id, target = %target, kind = %kind, "Moderation command sent");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PresenceSync(roster) => self.on_presence_sync(&roster).await,
            TransportEvent::PresenceLeave(id) => self.on_presence_leave(&id),
            TransportEvent::Broadcast(envelope) => self.on_envelope(envelope),
            TransportEvent::Reconnected => self.on_reconnected().await,
            TransportEvent::Closed(reason) => {
                warn!(room_id = %self.config.room_id, reason = %reason, "Room channel closed");
                self.teardown(RoomStatus::Error(reason)).await;
            }
        }
    }

    async fn on_presence_sync(&mut self, roster: &Roster) {
        if std::mem::take(&mut self.reconciling) {
            let missing: Vec<String> = self
                .directory
                .peers()
                .map(|p| p.participant_id.clone())
                .filter(|id| !roster.contains_key(id))
                .collect();
            for id in missing {
                self.on_presence_leave(&id);
            }
        }

        let outcome = self.directory.apply_sync(roster);
        let mut returned = Vec::new();
        for id in &outcome.joined {
            if let Some(link) = self.links.get(id) {
                self.directory.apply_link(id, link);
            }
            info!(room_id = %self.config.room_id, peer = %id, "Participant joined");
            self.events.publish(RoomEvent::PeerJoined(id.clone()));
            if self.departed.remove(id) {
                returned.push(id.clone());
            }
        }
        if outcome.changed {
            self.publish();
        }

        // Nobody else will offer to a peer whose connection we dropped.
        for id in returned {
            match self.announce(Some(&id)).await {
                Ok(()) => debug!(room_id = %self.config.room_id, peer = %id, "Re-announced to returning participant"),
                Err(e) => warn!(room_id = %self.config.room_id, peer = %id, error = %e, "Could not re-announce"),
            }
        }
    }

    /// The relay link recovered. Signals sent while it was down are lost;
    /// every connection is rebuilt from a fresh `ready`.
    async fn on_reconnected(&mut self) {
        let closed = self.peers.close_all();
        self.links.clear();
        let ids: Vec<String> = self
            .directory
            .peers()
            .map(|p| p.participant_id.clone())
            .collect();
        for id in &ids {
            self.directory.apply_link(id, &LinkState::default());
        }
        self.reconciling = true;
        self.publish();
        info!(room_id = %self.config.room_id, connections = closed, "Relay reconnected, rebuilding peer connections");

        self.retry_presence().await;
        if let Err(e) = self.announce(None).await {
            warn!(room_id = %self.config.room_id, error = %e, "Ready broadcast failed after reconnect");
        }
    }

    fn on_presence_leave(&mut self, id: &str) {
        if id == self.identity.id {
            return;
        }
        let known = self.directory.remove(id).is_some();
        self.links.remove(id);
        let connected = self.peers.teardown(id);
        if connected {
            self.departed.insert(id.to_string());
        }
        self.bus.forget(id);
        if known || connected {
            info!(room_id = %self.config.room_id, peer = %id, "Participant left");
            self.events.publish(RoomEvent::PeerLeft(id.to_string()));
            self.publish();
        }
    }

    fn on_envelope(&mut self, envelope: SignalEnvelope) {
        if !envelope.is_for(&self.identity.id) {
            return;
        }
        let from = envelope.from.as_str();
        let session = envelope.session.as_deref();
        match envelope.kind {
            SignalKind::Ready | SignalKind::Renegotiate => {
                if self.ensure_peer(from, session) {
                    self.peers.send(from, PeerCommand::Negotiate);
                }
            }
            SignalKind::Offer => match envelope.description() {
                Ok(desc) => {
                    if self.ensure_peer(from, session) {
                        self.peers.send(from, PeerCommand::Offer(desc));
                    }
                }
                Err(e) => debug!(peer = %from, error = %e, "Dropping offer"),
            },
            SignalKind::Answer => match envelope.description() {
                Ok(desc) => self.forward(from, PeerCommand::Answer(desc), "answer"),
                Err(e) => debug!(peer = %from, error = %e, "Dropping answer"),
            },
            SignalKind::Candidate => match envelope.candidate() {
                Ok(candidate) => self.forward_candidate(from, candidate),
                Err(e) => debug!(peer = %from, error = %e, "Dropping candidate"),
            },
            SignalKind::Reaction => {
                let emoji = envelope.emoji.clone();
                self.on_remote_overlay(&envelope.from, OverlayKind::Reaction, emoji.as_deref());
            }
            SignalKind::Message => {
                let text = envelope.text.clone();
                self.on_remote_overlay(&envelope.from, OverlayKind::Message, text.as_deref());
            }
            SignalKind::ForceMute | SignalKind::Kick => self.spawn_verification(envelope),
        }
    }

    /// Make sure a peer actor exists for `id`. Returns `false` if the
    /// connection could not be created.
    fn ensure_peer(&mut self, id: &str, session: Option<&str>) -> bool {
        match self.peers.create_or_get(id, session) {
            Ok(created) => {
                if created {
                    let link = LinkState::default();
                    if self.directory.apply_link(id, &link) {
                        self.publish();
                    }
                    self.links.insert(id.to_string(), link);
                }
                true
            }
            Err(e) => {
                warn!(room_id = %self.config.room_id, peer = %id, error = %e, "Could not create peer connection");
                false
            }
        }
    }

    fn forward(&self, from: &str, cmd: PeerCommand, what: &str) {
        if !self.peers.send(from, cmd) {
            debug!(peer = %from, kind = %what, "No connection for signal, dropping");
        }
    }

    fn forward_candidate(&self, from: &str, candidate: IceCandidate) {
        self.forward(from, PeerCommand::Candidate(candidate), "candidate");
    }

    fn on_remote_overlay(&mut self, from: &str, kind: OverlayKind, content: Option<&str>) {
        let parsed = match (kind, content) {
            (_, None) => {
                debug!(peer = %from, "Overlay without content, dropping");
                return;
            }
            (OverlayKind::Reaction, Some(raw)) => self.bus.reaction(raw),
            (OverlayKind::Message, Some(raw)) => self.bus.message(raw),
        };
        let text = match parsed {
            Ok(text) => text,
            Err(e) => {
                debug!(peer = %from, error = %e, "Dropping overlay");
                return;
            }
        };
        if self.directory.contains(from) {
            let changed = self.directory.set_overlay(from, kind, Some(text.clone()));
            self.bus.show(from, kind);
            if changed {
                self.publish();
            }
        }
        let event = match kind {
            OverlayKind::Reaction => RoomEvent::Reaction {
                from: from.to_string(),
                emoji: text,
            },
            OverlayKind::Message => RoomEvent::Message {
                from: from.to_string(),
                text,
            },
        };
        self.events.publish(event);
    }

    fn spawn_verification(&self, envelope: SignalEnvelope) {
        let moderation = self.moderation.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = moderation.verify(&envelope).await;
            let _ = tx.send(Internal::Verified { envelope, outcome });
        });
    }

    async fn on_internal(&mut self, internal: Internal) {
        let Internal::Verified { envelope, outcome } = internal;
        if self.closed {
            return;
        }
        if let Err(e) = outcome {
            self.events.publish(RoomEvent::ModerationRejected {
                from: envelope.from,
                kind: envelope.kind,
                reason: e.to_string(),
            });
            return;
        }
        match envelope.kind {
            SignalKind::ForceMute => {
                info!(room_id = %self.config.room_id, by = %envelope.from, "Force-muted");
                if self.apply_mute(true) {
                    if let Err(e) = self.track_presence().await {
                        warn!(room_id = %self.config.room_id, error = %e, "Could not publish forced mute, will retry");
                        self.schedule_retrack();
                    }
                }
                self.events.publish(RoomEvent::ForceMuted { by: envelope.from });
            }
            SignalKind::Kick => {
                warn!(room_id = %self.config.room_id, by = %envelope.from, "Kicked from room");
                self.events.publish(RoomEvent::Kicked { by: envelope.from });
                self.teardown(RoomStatus::Kicked).await;
            }
            _ => {}
        }
    }

    // -----------------------------------------------------------------------
    // Peers and overlays
    // -----------------------------------------------------------------------

    fn on_peer_update(&mut self, update: PeerUpdate) {
        if !self.peers.is_current(&update.peer_id, update.epoch) {
            debug!(peer = %update.peer_id, epoch = update.epoch, "Ignoring update from replaced connection");
            return;
        }
        let link = self.links.entry(update.peer_id.clone()).or_default();
        match update.kind {
            PeerUpdateKind::State(state) => link.state = state,
            PeerUpdateKind::RemoteStream(stream) => link.remote_stream = stream,
            PeerUpdateKind::Speaking(speaking) => link.is_speaking = speaking,
        }
        if self.directory.apply_link(&update.peer_id, link) {
            self.publish();
        }
    }

    fn on_overlay_expired(&mut self, expired: OverlayExpired) {
        if !self.bus.take_expired(&expired) {
            return;
        }
        let changed = if expired.owner == self.identity.id {
            self.local_overlay(expired.kind).take().is_some()
        } else {
            self.directory.set_overlay(&expired.owner, expired.kind, None)
        };
        if changed {
            self.publish();
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    async fn track_presence(&self) -> Result<(), TransportError> {
        let record = PresenceRecord::new(self.identity.clone(), self.is_muted);
        let mut attempt = 0;
        loop {
            match self.transport.track(&self.handle, &record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.track_retries => {
                    attempt += 1;
                    warn!(room_id = %self.config.room_id, attempt, error = %e, "Presence track failed, retrying");
                    tokio::time::sleep(self.config.track_retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn retry_presence(&mut self) {
        self.retrack_at = None;
        match self.track_presence().await {
            Ok(()) => debug!(room_id = %self.config.room_id, muted = self.is_muted, "Presence re-published"),
            Err(e) => {
                warn!(room_id = %self.config.room_id, error = %e, "Presence still stale, will retry");
                self.schedule_retrack();
            }
        }
    }

    fn schedule_retrack(&mut self) {
        self.retrack_at = Some(Instant::now() + self.config.presence_retry_interval);
    }

    /// Broadcast `ready`, or send it to one participant.
    async fn announce(&self, to: Option<&str>) -> Result<(), TransportError> {
        let mut ready = SignalEnvelope::new(SignalKind::Ready, self.identity.id.as_str())
            .in_session(self.session_id.as_str());
        if let Some(id) = to {
            ready = ready.to(id);
        }
        self.transport.broadcast(&self.handle, &ready).await
    }

    /// Release everything and enter `status`. Runs once; later calls are
    /// no-ops whichever path triggered them.
    async fn teardown(&mut self, status: RoomStatus) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.retrack_at = None;
        self.bus.cancel_all();
        self.peers.teardown_all().await;

        let mut stopped = 0;
        for stream in self.mic.take().into_iter().chain(self.screen.take()) {
            stopped += stream.stop_all();
        }
        if let Err(e) = self.transport.unsubscribe(&self.handle).await {
            warn!(room_id = %self.config.room_id, error = %e, "Unsubscribe failed");
        }
        self.directory.clear();
        self.links.clear();
        self.reaction = None;
        self.message = None;

        info!(
            room_id = %self.config.room_id,
            status = %status,
            tracks_stopped = stopped,
            "Room session closed"
        );
        self.set_status(status);
    }

    fn set_status(&mut self, status: RoomStatus) {
        if self.status == status {
            return;
        }
        self.status = status.clone();
        self.publish();
        self.events.publish(RoomEvent::StatusChanged(status));
    }

    fn publish(&self) {
        self.snapshots.send_replace(RoomSnapshot {
            status: self.status.clone(),
            local: self.identity.clone(),
            is_muted: self.is_muted,
            local_stream: self.mic.clone(),
            screen_stream: self.screen.clone(),
            reaction: self.reaction.clone(),
            message: self.message.clone(),
            peers: self.directory.peers().cloned().collect(),
        });
    }
}

fn signal_kind(kind: OverlayKind) -> SignalKind {
    match kind {
        OverlayKind::Reaction => SignalKind::Reaction,
        OverlayKind::Message => SignalKind::Message,
    }
}
