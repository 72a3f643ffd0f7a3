//! Local and remote media tracks plus the device-acquisition seam.
//!
//! Tracks are shared by `Arc` between the session and every peer
//! connection. Stopping a track releases the device and happens once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::with_id(huddle_common::new_id(), kind, label)
    }

    pub fn with_id(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Mute or unmute without releasing the device.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Release the underlying device. Returns `true` only for the call
    /// that actually stopped the track.
    pub fn stop(&self) -> bool {
        let first = !self.stopped.swap(true, Ordering::AcqRel);
        if first {
            debug!(track = %self.id, kind = self.kind.as_str(), "Track stopped");
        }
        first
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// An ordered group of tracks sharing one stream id.
#[derive(Debug, Clone)]
pub struct MediaStream {
    pub id: String,
    pub tracks: Vec<Arc<MediaTrack>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<MediaTrack>>) -> Self {
        Self {
            id: huddle_common::new_id(),
            tracks,
        }
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    /// Stop every track, returning how many were stopped by this call.
    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

/// Acquires local capture devices.
///
/// Acquisition may wait on an OS permission prompt, so callers never
/// invoke it from the session coordinator.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire_microphone(&self) -> Result<MediaStream, MediaError>;
    async fn acquire_screen(&self) -> Result<MediaStream, MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceMode {
    #[default]
    Available,
    Denied,
    Unsupported,
}

/// Synthetic devices for headless participants and tests.
///
/// Every track handed out is remembered so callers can verify that
/// nothing leaked after a session ends.
#[derive(Default)]
pub struct HeadlessDevices {
    microphone: DeviceMode,
    screen: DeviceMode,
    acquired: Mutex<Vec<Arc<MediaTrack>>>,
}

impl HeadlessDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn microphone(mut self, mode: DeviceMode) -> Self {
        self.microphone = mode;
        self
    }

    pub fn screen(mut self, mode: DeviceMode) -> Self {
        self.screen = mode;
        self
    }

    /// All tracks handed out so far.
    pub async fn acquired_tracks(&self) -> Vec<Arc<MediaTrack>> {
        self.acquired.lock().await.clone()
    }

    async fn acquire(
        &self,
        mode: DeviceMode,
        kind: TrackKind,
        label: &str,
    ) -> Result<MediaStream, MediaError> {
        match mode {
            DeviceMode::Denied => Err(MediaError::PermissionDenied(label.to_string())),
            DeviceMode::Unsupported => Err(MediaError::UnsupportedDevice(label.to_string())),
            DeviceMode::Available => {
                let track = Arc::new(MediaTrack::new(kind, label));
                self.acquired.lock().await.push(Arc::clone(&track));
                Ok(MediaStream::new(vec![track]))
            }
        }
    }
}

#[async_trait]
impl MediaDevices for HeadlessDevices {
    async fn acquire_microphone(&self) -> Result<MediaStream, MediaError> {
        self.acquire(self.microphone, TrackKind::Audio, "microphone")
            .await
    }

    async fn acquire_screen(&self) -> Result<MediaStream, MediaError> {
        self.acquire(self.screen, TrackKind::Video, "screen").await
    }
}
