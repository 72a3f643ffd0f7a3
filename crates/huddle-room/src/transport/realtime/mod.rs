//! Phoenix Channels v1 client and the room transport built on it.
//!
//! Works against Supabase Realtime or the self-hosted `huddle-relay`.
//! The client handles heartbeats, channel join/leave, broadcast, presence
//! tracking and auto-reconnect with backoff. [`RealtimeTransport`] folds
//! presence state and diffs into full rosters per room.

mod adapter;
mod client;
mod connection;
mod handler;
mod types;

pub use adapter::RealtimeTransport;
pub use client::RealtimeClient;
pub use types::{
    BroadcastConfig, ChannelConfig, PhoenixMessage, PresenceConfig, RealtimeConfig, RealtimeEvent,
};
