//! Media engine seam.
//!
//! The room core never touches codecs or sockets. It drives one
//! [`RtcConnection`] per remote participant through an [`RtcEngine`] and
//! listens to the [`RtcEvent`]s each connection reports.

mod headless;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RtcError;
use crate::media::MediaTrack;
use crate::protocol::{IceCandidate, IceServer, SessionDescription};

pub use headless::{ConnectionStats, HeadlessEngine};

/// Transport-level connectivity as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone)]
pub enum RtcEvent {
    /// A locally gathered candidate to trickle to the remote side.
    LocalCandidate(IceCandidate),
    /// The remote side started sending a track.
    RemoteTrack {
        stream_id: String,
        track: Arc<MediaTrack>,
    },
    RemoteTrackEnded { track_id: String },
    ConnectionState(RtcConnectionState),
    /// Voice activity on the remote audio.
    Speaking(bool),
}

/// One negotiated connection to a single remote participant.
#[async_trait]
pub trait RtcConnection: Send {
    fn add_track(&mut self, track: Arc<MediaTrack>, stream_id: &str) -> Result<(), RtcError>;
    fn remove_track(&mut self, track_id: &str) -> Result<(), RtcError>;
    async fn create_offer(&mut self) -> Result<SessionDescription, RtcError>;
    async fn create_answer(&mut self) -> Result<SessionDescription, RtcError>;
    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), RtcError>;
    async fn set_remote_description(&mut self, desc: SessionDescription)
        -> Result<(), RtcError>;
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), RtcError>;
    /// Discard a local offer that has not been answered.
    async fn rollback(&mut self) -> Result<(), RtcError>;
    fn close(&mut self);
}

pub trait RtcEngine: Send + Sync {
    fn create_connection(
        &self,
        peer_id: &str,
        ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<RtcEvent>,
    ) -> Result<Box<dyn RtcConnection>, RtcError>;
}
