//! Wire types for the voice room.
//!
//! Presence records are what each participant `track`s on the room
//! channel. Every other message rides as a [`SignalEnvelope`] inside a
//! relay broadcast named [`SIGNAL_EVENT`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SignalError;

/// Broadcast event name carrying signal envelopes.
pub const SIGNAL_EVENT: &str = "signal";

// ---------------------------------------------------------------------------
// Identity & presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    #[default]
    Member,
    Moderator,
    Owner,
}

impl Role {
    /// Roles allowed to force-mute and kick.
    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Moderator | Self::Owner)
    }
}

/// Who a participant is. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantIdentity {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(
        rename = "avatarURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
}

impl ParticipantIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: None,
            role: Role::Member,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Public state a participant tracks on the room channel.
///
/// Replaced wholesale on every track; never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    #[serde(rename = "user")]
    pub identity: ParticipantIdentity,
    #[serde(rename = "isMuted", default)]
    pub is_muted: bool,
    #[serde(rename = "online_at", default)]
    pub updated_at: String,
}

impl PresenceRecord {
    pub fn new(identity: ParticipantIdentity, is_muted: bool) -> Self {
        Self {
            identity,
            is_muted,
            updated_at: huddle_common::now_iso8601(),
        }
    }
}

/// Full room roster keyed by participant id.
pub type Roster = HashMap<String, PresenceRecord>;

// ---------------------------------------------------------------------------
// Negotiation payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpType,
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

/// STUN/TURN server handed to every peer connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

// ---------------------------------------------------------------------------
// Signal envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Ready,
    Offer,
    Answer,
    Candidate,
    Renegotiate,
    Reaction,
    Message,
    ForceMute,
    Kick,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Renegotiate => "renegotiate",
            Self::Reaction => "reaction",
            Self::Message => "message",
            Self::ForceMute => "force-mute",
            Self::Kick => "kick",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of all non-presence communication.
///
/// `to = None` addresses the whole room. `session` identifies the
/// sender's join instance so a rejoin can be told apart from a
/// retransmission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SignalEnvelope {
    pub fn new(kind: SignalKind, from: impl Into<String>) -> Self {
        Self {
            kind,
            from: from.into(),
            to: None,
            session: None,
            data: None,
            emoji: None,
            text: None,
        }
    }

    pub fn to(mut self, target: impl Into<String>) -> Self {
        self.to = Some(target.into());
        self
    }

    pub fn in_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach a serializable payload under `data`.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }

    /// Whether this envelope should be processed by `local_id`.
    pub fn is_for(&self, local_id: &str) -> bool {
        self.from != local_id && self.to.as_deref().map_or(true, |to| to == local_id)
    }

    /// Decode `data` as an offer or answer description.
    pub fn description(&self) -> Result<SessionDescription, SignalError> {
        let desc: SessionDescription = self.decode_data()?;
        let expected = match self.kind {
            SignalKind::Offer => SdpType::Offer,
            SignalKind::Answer => SdpType::Answer,
            other => {
                return Err(SignalError::Malformed(format!(
                    "{other} carries no session description"
                )))
            }
        };
        if desc.kind != expected {
            return Err(SignalError::Malformed(format!(
                "{} envelope carries a {:?} description",
                self.kind, desc.kind
            )));
        }
        Ok(desc)
    }

    /// Decode `data` as an ICE candidate.
    pub fn candidate(&self) -> Result<IceCandidate, SignalError> {
        self.decode_data()
    }

    fn decode_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, SignalError> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| SignalError::Malformed(format!("{} without data", self.kind)))?;
        serde_json::from_value(data).map_err(|e| SignalError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn force_mute_serializes_kebab_case() {
        let env = SignalEnvelope::new(SignalKind::ForceMute, "alice").to("bob");
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "force-mute");
        assert_eq!(json["from"], "alice");
        assert_eq!(json["to"], "bob");
        assert!(json.get("data").is_none());
        assert!(json.get("emoji").is_none());
    }

    #[test]
    fn parses_browser_candidate_envelope() {
        let raw = r#"{
            "type": "candidate",
            "from": "bob",
            "to": "alice",
            "data": {"candidate": "candidate:1 1 udp 1 10.0.0.2 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0}
        }"#;
        let env: SignalEnvelope = serde_json::from_str(raw).unwrap();
        let cand = env.candidate().unwrap();
        assert_eq!(cand.sdp_mid.as_deref(), Some("0"));
        assert_eq!(cand.sdp_m_line_index, Some(0));
    }

    #[test]
    fn description_rejects_mismatched_type() {
        let desc = SessionDescription {
            kind: SdpType::Answer,
            sdp: "v=0".into(),
        };
        let env = SignalEnvelope::new(SignalKind::Offer, "bob").with_data(&desc);
        assert!(matches!(env.description(), Err(SignalError::Malformed(_))));
    }

    #[test]
    fn description_without_data_is_malformed() {
        let env = SignalEnvelope::new(SignalKind::Answer, "bob");
        assert!(matches!(env.description(), Err(SignalError::Malformed(_))));
    }

    #[test]
    fn is_for_filters_self_and_other_targets() {
        let broadcast = SignalEnvelope::new(SignalKind::Ready, "bob");
        assert!(broadcast.is_for("alice"));
        assert!(!broadcast.is_for("bob"));

        let direct = SignalEnvelope::new(SignalKind::Kick, "bob").to("carol");
        assert!(direct.is_for("carol"));
        assert!(!direct.is_for("alice"));
    }

    #[test]
    fn presence_record_uses_wire_names() {
        let identity = ParticipantIdentity::new("alice", "Alice").with_role(Role::Owner);
        let record = PresenceRecord::new(identity, true);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["user"]["displayName"], "Alice");
        assert_eq!(json["user"]["role"], "owner");
        assert_eq!(json["isMuted"], true);
        assert!(json["online_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn privileged_roles() {
        assert!(Role::Owner.is_privileged());
        assert!(Role::Moderator.is_privileged());
        assert!(!Role::Member.is_privileged());
        assert!(!Role::Guest.is_privileged());
    }
}
