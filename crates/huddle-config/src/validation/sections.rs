//! Validation for identity, room, realtime and relay sections.

use crate::schema::HuddleConfig;

use super::helpers::{validate_range, validate_scheme};

/// Validate identity constraints.
pub(crate) fn validate_identity(errors: &mut Vec<String>, config: &HuddleConfig) {
    if config.identity.display_name.chars().count() > 64 {
        errors.push("identity.display_name must be at most 64 characters".into());
    }
    if let Some(url) = &config.identity.avatar_url {
        validate_scheme(errors, "identity.avatar_url", url, &["http://", "https://"]);
    }
}

/// Validate room constraints.
pub(crate) fn validate_room(errors: &mut Vec<String>, config: &HuddleConfig) {
    let room = &config.room;
    validate_range(errors, "room.reaction_ttl_ms", room.reaction_ttl_ms, 500, 60_000);
    validate_range(errors, "room.message_ttl_ms", room.message_ttl_ms, 500, 60_000);
    validate_range(errors, "room.max_message_len", room.max_message_len, 1, 2000);
    validate_range(
        errors,
        "room.negotiation_timeout_secs",
        room.negotiation_timeout_secs,
        1,
        120,
    );
    validate_range(
        errors,
        "room.max_negotiation_retries",
        room.max_negotiation_retries,
        0,
        10,
    );
    if room.default_space.trim().is_empty() {
        errors.push("room.default_space must not be empty".into());
    }

    for (i, server) in room.ice_servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("room.ice_servers[{i}].urls must not be empty"));
        }
        for url in &server.urls {
            validate_scheme(
                errors,
                &format!("room.ice_servers[{i}].urls"),
                url,
                &["stun:", "stuns:", "turn:", "turns:"],
            );
            if url.starts_with("turn") && (server.username.is_none() || server.credential.is_none())
            {
                errors.push(format!(
                    "room.ice_servers[{i}] TURN server requires username and credential"
                ));
            }
        }
    }
}

/// Validate realtime relay connection constraints.
pub(crate) fn validate_realtime(errors: &mut Vec<String>, config: &HuddleConfig) {
    let rt = &config.realtime;
    if rt.url.is_empty() && rt.project_ref.is_empty() {
        errors.push("realtime.url or realtime.project_ref must be set".into());
    }
    if !rt.url.is_empty() {
        validate_scheme(errors, "realtime.url", &rt.url, &["ws://", "wss://"]);
    }
    validate_range(errors, "realtime.heartbeat_interval", rt.heartbeat_interval, 5, 300);
    validate_range(errors, "realtime.join_timeout", rt.join_timeout, 1, 120);
    if rt.reconnect_delay == 0 || rt.reconnect_delay > rt.max_reconnect_delay {
        errors.push(format!(
            "realtime.reconnect_delay = {} must be in [1, max_reconnect_delay = {}]",
            rt.reconnect_delay, rt.max_reconnect_delay
        ));
    }
}

/// Validate self-hosted relay constraints.
pub(crate) fn validate_relay(errors: &mut Vec<String>, config: &HuddleConfig) {
    validate_range(errors, "relay.port", config.relay.port, 1, 65535);
    validate_range(errors, "relay.idle_timeout", config.relay.idle_timeout, 10, 3600);
}
