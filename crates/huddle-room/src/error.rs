//! Error taxonomy for the room core.
//!
//! Media and signaling errors are recoverable and mostly end up in logs.
//! Transport and directory errors abort the operation that hit them.

/// Local device acquisition failed. The session continues listen-only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media permission denied: {0}")]
    PermissionDenied(String),

    #[error("unsupported media device: {0}")]
    UnsupportedDevice(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("presence track failed: {0}")]
    Track(String),

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("transport closed")]
    Closed,
}

/// A signaling message that could not be applied. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("{kind} not accepted in state {state}")]
    OutOfState {
        kind: &'static str,
        state: &'static str,
    },

    #[error("malformed signal: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Failure reported by the media engine behind a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RtcError {
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    #[error("remote description not set")]
    NoRemoteDescription,

    #[error("invalid ice candidate: {0}")]
    InvalidCandidate(String),

    #[error("no local offer to roll back")]
    NothingToRollBack,

    #[error("connection closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to connect: {0}")]
    ConnectFailed(String),

    #[error("kicked from room")]
    Kicked,

    #[error("session closed")]
    Closed,
}
