//! In-process media engine.
//!
//! Produces real-looking SDP listing the attached tracks, trickles one
//! host candidate per media section and reports remote tracks parsed from
//! the remote description. A peer counts as speaking while it sends at
//! least one live audio track. No packets are ever sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::{RtcConnection, RtcConnectionState, RtcEngine, RtcEvent};
use crate::error::RtcError;
use crate::media::{MediaTrack, TrackKind};
use crate::protocol::{IceCandidate, IceServer, SdpType, SessionDescription};

/// Counters kept per remote peer across connection lifetimes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub created: usize,
    pub closed: usize,
    pub candidates_applied: usize,
}

#[derive(Clone, Default)]
pub struct HeadlessEngine {
    stats: Arc<Mutex<HashMap<String, ConnectionStats>>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self, peer_id: &str) -> Option<ConnectionStats> {
        self.stats
            .lock()
            .ok()
            .and_then(|map| map.get(peer_id).cloned())
    }

    fn record(&self, peer_id: &str, f: impl FnOnce(&mut ConnectionStats)) {
        record(&self.stats, peer_id, f);
    }
}

fn record(
    stats: &Mutex<HashMap<String, ConnectionStats>>,
    peer_id: &str,
    f: impl FnOnce(&mut ConnectionStats),
) {
    if let Ok(mut map) = stats.lock() {
        f(map.entry(peer_id.to_string()).or_default());
    }
}

impl RtcEngine for HeadlessEngine {
    fn create_connection(
        &self,
        peer_id: &str,
        ice_servers: &[IceServer],
        events: mpsc::UnboundedSender<RtcEvent>,
    ) -> Result<Box<dyn RtcConnection>, RtcError> {
        debug!(peer = %peer_id, ice_servers = ice_servers.len(), "Creating headless connection");
        self.record(peer_id, |s| s.created += 1);
        Ok(Box::new(HeadlessConnection {
            peer_id: peer_id.to_string(),
            session_id: (uuid::Uuid::new_v4().as_u128() >> 65) as u64,
            version: 0,
            local_tracks: Vec::new(),
            local: None,
            stable_local: None,
            remote: None,
            have_local_offer: false,
            have_remote_offer: false,
            remote_tracks: HashMap::new(),
            state: RtcConnectionState::New,
            events,
            stats: Arc::clone(&self.stats),
            closed: false,
        }))
    }
}

struct HeadlessConnection {
    peer_id: String,
    session_id: u64,
    version: u64,
    local_tracks: Vec<(String, Arc<MediaTrack>)>,
    local: Option<SessionDescription>,
    stable_local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    have_local_offer: bool,
    have_remote_offer: bool,
    remote_tracks: HashMap<String, Arc<MediaTrack>>,
    state: RtcConnectionState,
    events: mpsc::UnboundedSender<RtcEvent>,
    stats: Arc<Mutex<HashMap<String, ConnectionStats>>>,
    closed: bool,
}

impl HeadlessConnection {
    fn ensure_open(&self) -> Result<(), RtcError> {
        if self.closed {
            Err(RtcError::Closed)
        } else {
            Ok(())
        }
    }

    fn write_sdp(&mut self, kind: SdpType) -> SessionDescription {
        self.version += 1;
        let mut sdp = format!(
            "v=0\r\no=- {} {} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n",
            self.session_id, self.version
        );
        for (mid, (stream_id, track)) in self.local_tracks.iter().enumerate() {
            let payload = match track.kind() {
                TrackKind::Audio => 111,
                TrackKind::Video => 96,
            };
            sdp.push_str(&format!(
                "m={} 9 UDP/TLS/RTP/SAVPF {payload}\r\na=mid:{mid}\r\na=msid:{stream_id} {}\r\na=sendrecv\r\n",
                track.kind().as_str(),
                track.id()
            ));
        }
        SessionDescription { kind, sdp }
    }

    fn set_state(&mut self, state: RtcConnectionState) {
        if self.state != state {
            self.state = state;
            let _ = self.events.send(RtcEvent::ConnectionState(state));
        }
    }

    fn check_connected(&mut self) {
        if self.local.is_some() && self.remote.is_some() && !self.have_local_offer {
            self.set_state(RtcConnectionState::Connected);
        } else if self.state == RtcConnectionState::New {
            self.set_state(RtcConnectionState::Connecting);
        }
    }

    fn trickle(&self, desc: &SessionDescription) {
        let sections = desc.sdp.lines().filter(|l| l.starts_with("m=")).count();
        for index in 0..sections {
            let candidate = IceCandidate {
                candidate: format!(
                    "candidate:{index} 1 udp 2122260223 127.0.0.1 {} typ host",
                    50000 + index
                ),
                sdp_mid: Some(index.to_string()),
                sdp_m_line_index: u16::try_from(index).ok(),
            };
            let _ = self.events.send(RtcEvent::LocalCandidate(candidate));
        }
    }

    fn has_remote_audio(&self) -> bool {
        self.remote_tracks
            .values()
            .any(|t| t.kind() == TrackKind::Audio)
    }

    fn apply_remote_tracks(&mut self, sections: Vec<RemoteSection>) {
        let was_speaking = self.has_remote_audio();
        let mut seen = Vec::with_capacity(sections.len());
        for section in sections {
            seen.push(section.track_id.clone());
            if self.remote_tracks.contains_key(&section.track_id) {
                continue;
            }
            let track = Arc::new(MediaTrack::with_id(
                section.track_id.clone(),
                section.kind,
                format!("remote {}", section.kind.as_str()),
            ));
            self.remote_tracks
                .insert(section.track_id, Arc::clone(&track));
            let _ = self.events.send(RtcEvent::RemoteTrack {
                stream_id: section.stream_id,
                track,
            });
        }

        let ended: Vec<String> = self
            .remote_tracks
            .keys()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();
        for track_id in ended {
            if let Some(track) = self.remote_tracks.remove(&track_id) {
                track.stop();
            }
            let _ = self.events.send(RtcEvent::RemoteTrackEnded { track_id });
        }

        let speaking = self.has_remote_audio();
        if speaking != was_speaking {
            let _ = self.events.send(RtcEvent::Speaking(speaking));
        }
    }
}

struct RemoteSection {
    kind: TrackKind,
    stream_id: String,
    track_id: String,
}

fn parse_sdp(sdp: &str) -> Result<Vec<RemoteSection>, RtcError> {
    let mut lines = sdp.lines();
    if lines.next().map(str::trim) != Some("v=0") {
        return Err(RtcError::InvalidDescription("missing v=0".into()));
    }

    let mut sections = Vec::new();
    let mut kind = None;
    for line in lines.map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            let name = media.split_whitespace().next().unwrap_or("");
            kind = Some(TrackKind::parse(name).ok_or_else(|| {
                RtcError::InvalidDescription(format!("unknown media section {name:?}"))
            })?);
        } else if let Some(msid) = line.strip_prefix("a=msid:") {
            let mut parts = msid.split_whitespace();
            let (Some(stream_id), Some(track_id), Some(kind)) = (parts.next(), parts.next(), kind)
            else {
                return Err(RtcError::InvalidDescription(format!("bad msid line {line:?}")));
            };
            sections.push(RemoteSection {
                kind,
                stream_id: stream_id.to_string(),
                track_id: track_id.to_string(),
            });
        }
    }
    Ok(sections)
}

#[async_trait]
impl RtcConnection for HeadlessConnection {
    fn add_track(&mut self, track: Arc<MediaTrack>, stream_id: &str) -> Result<(), RtcError> {
        self.ensure_open()?;
        if !self.local_tracks.iter().any(|(_, t)| t.id() == track.id()) {
            self.local_tracks.push((stream_id.to_string(), track));
        }
        Ok(())
    }

    fn remove_track(&mut self, track_id: &str) -> Result<(), RtcError> {
        self.ensure_open()?;
        self.local_tracks.retain(|(_, t)| t.id() != track_id);
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, RtcError> {
        self.ensure_open()?;
        Ok(self.write_sdp(SdpType::Offer))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, RtcError> {
        self.ensure_open()?;
        if !self.have_remote_offer {
            return Err(RtcError::InvalidDescription(
                "no remote offer to answer".into(),
            ));
        }
        Ok(self.write_sdp(SdpType::Answer))
    }

    async fn set_local_description(&mut self, desc: SessionDescription) -> Result<(), RtcError> {
        self.ensure_open()?;
        match desc.kind {
            SdpType::Offer => {
                if self.have_remote_offer {
                    return Err(RtcError::InvalidDescription(
                        "local offer while a remote offer is pending".into(),
                    ));
                }
                self.have_local_offer = true;
            }
            SdpType::Answer => {
                if !self.have_remote_offer {
                    return Err(RtcError::InvalidDescription(
                        "local answer without a remote offer".into(),
                    ));
                }
                self.have_remote_offer = false;
            }
        }
        self.trickle(&desc);
        if desc.kind == SdpType::Answer {
            self.stable_local = Some(desc.clone());
        }
        self.local = Some(desc);
        self.check_connected();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        desc: SessionDescription,
    ) -> Result<(), RtcError> {
        self.ensure_open()?;
        let sections = parse_sdp(&desc.sdp)?;
        match desc.kind {
            SdpType::Offer => {
                if self.have_local_offer {
                    return Err(RtcError::InvalidDescription(
                        "remote offer while a local offer is pending".into(),
                    ));
                }
                self.have_remote_offer = true;
            }
            SdpType::Answer => {
                if !self.have_local_offer {
                    return Err(RtcError::InvalidDescription(
                        "remote answer without a local offer".into(),
                    ));
                }
                self.have_local_offer = false;
                self.stable_local = self.local.clone();
            }
        }
        self.apply_remote_tracks(sections);
        self.remote = Some(desc);
        self.check_connected();
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), RtcError> {
        self.ensure_open()?;
        if self.remote.is_none() {
            return Err(RtcError::NoRemoteDescription);
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(RtcError::InvalidCandidate(candidate.candidate));
        }
        record(&self.stats, &self.peer_id, |s| s.candidates_applied += 1);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), RtcError> {
        self.ensure_open()?;
        if !self.have_local_offer {
            return Err(RtcError::NothingToRollBack);
        }
        self.have_local_offer = false;
        self.local = self.stable_local.clone();
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let was_speaking = self.has_remote_audio();
        for track in self.remote_tracks.values() {
            track.stop();
        }
        self.remote_tracks.clear();
        if was_speaking {
            let _ = self.events.send(RtcEvent::Speaking(false));
        }
        self.set_state(RtcConnectionState::Closed);
        record(&self.stats, &self.peer_id, |s| s.closed += 1);
    }
}
