//! Room session: the public façade over presence, peers, overlays and
//! moderation.
//!
//! A [`RoomSession`] is a handle to one coordinator task. Commands go in
//! over a channel and are answered through oneshot replies; state comes
//! out as [`RoomSnapshot`]s on a watch channel plus discrete
//! [`RoomEvent`]s. Dropping the handle leaves the room.

mod actor;
mod config;

use std::sync::{Arc, Mutex};

use huddle_common::{EventBus, SessionId};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::info;

use crate::error::{MediaError, RoomError};
use crate::media::{MediaDevices, MediaStream};
use crate::moderation::{Directory, ModerationController};
use crate::presence::Peer;
use crate::protocol::{ParticipantIdentity, SignalKind};
use crate::rtc::RtcEngine;
use crate::transport::SignalTransport;

use actor::{Command, Reply};

pub use config::SessionConfig;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomStatus {
    Connecting,
    Connected,
    Error(String),
    Left,
    Kicked,
}

impl RoomStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Left | Self::Kicked)
    }

    fn as_error(&self) -> RoomError {
        match self {
            Self::Error(msg) => RoomError::ConnectFailed(msg.clone()),
            Self::Kicked => RoomError::Kicked,
            _ => RoomError::Closed,
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Left => f.write_str("left"),
            Self::Kicked => f.write_str("kicked"),
        }
    }
}

/// Everything an observer needs to render the room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub status: RoomStatus,
    pub local: ParticipantIdentity,
    pub is_muted: bool,
    /// Outbound microphone. `None` when listen-only.
    pub local_stream: Option<MediaStream>,
    pub screen_stream: Option<MediaStream>,
    /// Local overlays, shown optimistically.
    pub reaction: Option<String>,
    pub message: Option<String>,
    /// Other participants ordered by id.
    pub peers: Vec<Peer>,
}

impl RoomSnapshot {
    fn connecting(local: ParticipantIdentity) -> Self {
        Self {
            status: RoomStatus::Connecting,
            local,
            is_muted: false,
            local_stream: None,
            screen_stream: None,
            reaction: None,
            message: None,
            peers: Vec::new(),
        }
    }

    pub fn peer(&self, id: &str) -> Option<&Peer> {
        self.peers.iter().find(|p| p.participant_id == id)
    }

    pub fn peer_ids(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.participant_id.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub enum RoomEvent {
    PeerJoined(String),
    PeerLeft(String),
    /// Microphone could not be acquired; the session is listen-only.
    MediaUnavailable(MediaError),
    ForceMuted { by: String },
    Kicked { by: String },
    StatusChanged(RoomStatus),
    /// An incoming moderation command failed re-validation.
    ModerationRejected {
        from: String,
        kind: SignalKind,
        reason: String,
    },
    Reaction { from: String, emoji: String },
    Message { from: String, text: String },
}

/// External collaborators a session runs against.
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn SignalTransport>,
    pub directory: Arc<dyn Directory>,
    pub devices: Arc<dyn MediaDevices>,
    pub engine: Arc<dyn RtcEngine>,
}

pub struct RoomSession {
    room_id: String,
    identity: ParticipantIdentity,
    session_id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<RoomSnapshot>,
    events: EventBus<RoomEvent>,
    /// Receiver opened before the coordinator started, handed to the
    /// first `subscribe` call so startup events are not lost.
    early_events: Mutex<Option<broadcast::Receiver<RoomEvent>>>,
    devices: Arc<dyn MediaDevices>,
    moderation: ModerationController,
}

impl RoomSession {
    /// Start joining `config.room_id` and return immediately.
    ///
    /// Only the directory lookup happens here; microphone acquisition,
    /// subscribe and presence tracking run on the session task. Use
    /// [`wait_connected`](Self::wait_connected) to await the outcome.
    pub async fn connect(config: SessionConfig, deps: SessionDeps) -> Result<Self, RoomError> {
        let identity = deps.directory.current_identity().await?;
        let session_id = SessionId::new();
        let moderation =
            ModerationController::new(Arc::clone(&deps.directory), &config.room_id, &identity.id);

        let (snapshot_tx, snapshots) = watch::channel(RoomSnapshot::connecting(identity.clone()));
        let events = EventBus::new(EVENT_CAPACITY);
        let early_events = events.subscribe();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        info!(
            room_id = %config.room_id,
            participant = %identity.id,
            session = %session_id,
            "Joining room"
        );
        let room_id = config.room_id.clone();
        let devices = Arc::clone(&deps.devices);
        tokio::spawn(actor::run(
            actor::Startup {
                config,
                identity: identity.clone(),
                session_id: session_id.clone(),
                deps,
                moderation: moderation.clone(),
                snapshots: snapshot_tx,
                events: events.clone(),
            },
            commands_rx,
        ));

        Ok(Self {
            room_id,
            identity,
            session_id,
            commands,
            snapshots,
            events,
            early_events: Mutex::new(Some(early_events)),
            devices,
            moderation,
        })
    }

    /// Wait until the session leaves `connecting`.
    pub async fn wait_connected(&self) -> Result<(), RoomError> {
        let mut rx = self.snapshots.clone();
        let status = rx
            .wait_for(|s| s.status != RoomStatus::Connecting)
            .await
            .map_err(|_| RoomError::Closed)?
            .status
            .clone();
        match status {
            RoomStatus::Connected => Ok(()),
            other => Err(other.as_error()),
        }
    }

    /// Connect and wait for the room to be joined.
    pub async fn join(config: SessionConfig, deps: SessionDeps) -> Result<Self, RoomError> {
        let session = Self::connect(config, deps).await?;
        session.wait_connected().await?;
        Ok(session)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn status(&self) -> RoomStatus {
        self.snapshots.borrow().status.clone()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to room events. The first call also sees events emitted
    /// since [`connect`](Self::connect).
    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        let early = self.early_events.lock().ok().and_then(|mut slot| slot.take());
        early.unwrap_or_else(|| self.events.subscribe())
    }

    /// Flip the local mute flag. Returns the new value.
    pub async fn toggle_mute(&self) -> Result<bool, RoomError> {
        self.request(|reply| Command::SetMuted { muted: None, reply })
            .await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), RoomError> {
        self.request(|reply| Command::SetMuted {
            muted: Some(muted),
            reply,
        })
        .await
        .map(|_| ())
    }

    /// Acquire the screen and renegotiate with every peer.
    pub async fn start_screen_share(&self) -> Result<(), RoomError> {
        self.ensure_active()?;
        let stream = self.devices.acquire_screen().await?;
        let attached = stream.clone();
        match self
            .request(|reply| Command::ShareScreen {
                stream: attached,
                reply,
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                stream.stop_all();
                Err(e)
            }
        }
    }

    pub async fn stop_screen_share(&self) -> Result<(), RoomError> {
        self.request(|reply| Command::StopScreen { reply }).await
    }

    pub async fn send_reaction(&self, emoji: &str) -> Result<(), RoomError> {
        let emoji = emoji.to_string();
        self.request(|reply| Command::React { emoji, reply }).await
    }

    pub async fn send_message(&self, text: &str) -> Result<(), RoomError> {
        let text = text.to_string();
        self.request(|reply| Command::Say { text, reply }).await
    }

    /// Force-mute another participant. Requires a moderator role.
    pub async fn mute_user(&self, target: &str) -> Result<(), RoomError> {
        self.moderate(SignalKind::ForceMute, target).await
    }

    /// Remove another participant from the room. Requires a moderator role.
    pub async fn kick_user(&self, target: &str) -> Result<(), RoomError> {
        self.moderate(SignalKind::Kick, target).await
    }

    /// Leave the room and release every resource. Safe to call twice.
    pub async fn leave(&self) -> Result<(), RoomError> {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Leave { reply }).is_ok() {
            let _ = done.await;
        }
        Ok(())
    }

    async fn moderate(&self, kind: SignalKind, target: &str) -> Result<(), RoomError> {
        self.ensure_active()?;
        self.moderation.authorize(kind).await?;
        let target = target.to_string();
        self.request(|reply| Command::Moderate {
            kind,
            target,
            reply,
        })
        .await
    }

    fn ensure_active(&self) -> Result<(), RoomError> {
        let status = self.status();
        if status.is_terminal() {
            return Err(status.as_error());
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RoomError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(command(reply)).is_err() {
            return Err(self.status().as_error());
        }
        match response.await {
            Ok(result) => result,
            Err(_) => Err(self.status().as_error()),
        }
    }
}
