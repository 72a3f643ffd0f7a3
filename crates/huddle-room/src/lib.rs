//! Voice room coordination core.
//!
//! Lets N participants in a named room find each other through a
//! presence/signaling relay and hold a full mesh of peer connections:
//! - Presence directory built from full-roster syncs
//! - One negotiation actor per remote participant (offer/answer/ICE,
//!   glare tie-break, unanswered-offer retry)
//! - Short-lived reactions and chat bubbles
//! - Force-mute and kick, re-validated by the receiver
//!
//! [`RoomSession`] is the entry point. The relay, the media engine and
//! the user directory are traits so any of them can be swapped.

pub mod ephemeral;
pub mod error;
pub mod media;
pub mod moderation;
pub mod peer;
pub mod presence;
pub mod protocol;
pub mod rtc;
pub mod session;
pub mod transport;

pub use ephemeral::OverlayKind;
pub use error::{DirectoryError, MediaError, RoomError, RtcError, SignalError, TransportError};
pub use media::{DeviceMode, HeadlessDevices, MediaDevices, MediaStream, MediaTrack, TrackKind};
pub use moderation::{Directory, StaticDirectory};
pub use peer::NegotiationState;
pub use presence::Peer;
pub use protocol::{
    IceCandidate, IceServer, ParticipantIdentity, PresenceRecord, Role, Roster,
    SessionDescription, SignalEnvelope, SignalKind,
};
pub use rtc::{HeadlessEngine, RtcConnection, RtcEngine, RtcEvent};
pub use session::{RoomEvent, RoomSession, RoomSnapshot, RoomStatus, SessionConfig, SessionDeps};
pub use transport::{FailPoint, MemoryHub, RealtimeTransport, SignalTransport, TransportEvent};
