//! Line commands typed while in a room.

use std::fmt::Write as _;

use huddle_room::{RoomEvent, RoomSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    ToggleMute,
    Share,
    Unshare,
    React(String),
    Say(String),
    ForceMute(String),
    Kick(String),
    Peers,
    Help,
    Leave,
}

pub const HELP: &str = "\
/mute              toggle your microphone
/share, /unshare   start or stop screen sharing
/react <emoji>     show a reaction
/say <text>        show a chat bubble (plain text works too)
/force-mute <id>   mute a participant (moderators)
/kick <id>         remove a participant (moderators)
/peers             list participants
/leave             leave the room";

/// Parse one input line. Returns `None` for blank lines.
pub fn parse(line: &str) -> Option<Result<ConsoleCommand, String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Ok(ConsoleCommand::Say(line.to_string())));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let needs_arg = |build: fn(String) -> ConsoleCommand| {
        if arg.is_empty() {
            Err(format!("/{name} needs an argument"))
        } else {
            Ok(build(arg.to_string()))
        }
    };
    let command = match name {
        "mute" => Ok(ConsoleCommand::ToggleMute),
        "share" => Ok(ConsoleCommand::Share),
        "unshare" => Ok(ConsoleCommand::Unshare),
        "react" => needs_arg(ConsoleCommand::React),
        "say" => needs_arg(ConsoleCommand::Say),
        "force-mute" => needs_arg(ConsoleCommand::ForceMute),
        "kick" => needs_arg(ConsoleCommand::Kick),
        "peers" => Ok(ConsoleCommand::Peers),
        "help" | "?" => Ok(ConsoleCommand::Help),
        "leave" | "quit" => Ok(ConsoleCommand::Leave),
        other => Err(format!("unknown command /{other}, try /help")),
    };
    Some(command)
}

pub fn describe_event(event: &RoomEvent) -> String {
    match event {
        RoomEvent::PeerJoined(id) => format!("+ {id} joined"),
        RoomEvent::PeerLeft(id) => format!("- {id} left"),
        RoomEvent::MediaUnavailable(e) => format!("! microphone unavailable ({e}), listen-only"),
        RoomEvent::ForceMuted { by } => format!("! muted by {by}"),
        RoomEvent::Kicked { by } => format!("! removed from the room by {by}"),
        RoomEvent::StatusChanged(status) => format!("* {status}"),
        RoomEvent::ModerationRejected { from, kind, reason } => {
            format!("! ignored {kind:?} from {from}: {reason}")
        }
        RoomEvent::Reaction { from, emoji } => format!("{from} {emoji}"),
        RoomEvent::Message { from, text } => format!("{from}: {text}"),
    }
}

pub fn describe_peers(snapshot: &RoomSnapshot) -> String {
    let mut out = format!(
        "{} (you){}",
        snapshot.local.display_name,
        if snapshot.is_muted { " [muted]" } else { "" }
    );
    for peer in &snapshot.peers {
        let _ = write!(
            out,
            "\n{} <{}> {}{}{}",
            peer.identity.display_name,
            peer.participant_id,
            peer.connection_state,
            if peer.is_muted { " [muted]" } else { "" },
            if peer
                .remote_stream
                .as_ref()
                .is_some_and(|s| s.video_tracks().next().is_some())
            {
                " [sharing]"
            } else {
                ""
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            parse("hello there"),
            Some(Ok(ConsoleCommand::Say("hello there".into())))
        );
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(parse("/react 🎉"), Some(Ok(ConsoleCommand::React("🎉".into()))));
        assert_eq!(parse("/kick  u2 "), Some(Ok(ConsoleCommand::Kick("u2".into()))));
        assert_eq!(parse("/mute"), Some(Ok(ConsoleCommand::ToggleMute)));
        assert_eq!(parse("/quit"), Some(Ok(ConsoleCommand::Leave)));
    }

    #[test]
    fn missing_argument_and_unknown_command() {
        assert!(matches!(parse("/force-mute"), Some(Err(_))));
        assert!(matches!(parse("/dance"), Some(Err(msg)) if msg.contains("/help")));
    }

    #[test]
    fn events_render_as_single_lines() {
        let line = describe_event(&RoomEvent::Message {
            from: "u2".into(),
            text: "hi".into(),
        });
        assert_eq!(line, "u2: hi");
        assert_eq!(describe_event(&RoomEvent::PeerLeft("u3".into())), "- u3 left");
    }
}
