//! Public handle for interacting with the realtime connection.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::connection::connection_loop;
use super::types::{ChannelConfig, RealtimeCommand, RealtimeConfig, RealtimeEvent};
use crate::error::TransportError;

/// Handle to the background connection task.
///
/// Methods queue commands and return once the connection task has
/// accepted them. Clones share the same connection.
#[derive(Clone)]
pub struct RealtimeClient {
    command_tx: mpsc::Sender<RealtimeCommand>,
    connected: Arc<RwLock<bool>>,
}

impl RealtimeClient {
    /// Create a new client and start the background connection.
    /// Returns `(client, event_receiver)`.
    pub fn connect(config: RealtimeConfig) -> (Self, mpsc::Receiver<RealtimeEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::channel(64);
        let connected = Arc::new(RwLock::new(false));

        let client = Self {
            command_tx,
            connected: Arc::clone(&connected),
        };

        tokio::spawn(connection_loop(config, connected, event_tx, command_rx));

        (client, event_rx)
    }

    async fn send(&self, cmd: RealtimeCommand) -> Result<(), TransportError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn join_channel(
        &self,
        topic: &str,
        config: ChannelConfig,
    ) -> Result<(), TransportError> {
        self.send(RealtimeCommand::JoinChannel {
            topic: topic.to_string(),
            config,
        })
        .await
    }

    pub async fn leave_channel(&self, topic: &str) -> Result<(), TransportError> {
        self.send(RealtimeCommand::LeaveChannel {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn broadcast(
        &self,
        topic: &str,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send(RealtimeCommand::Broadcast {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
        })
        .await
    }

    /// Track presence on a channel. Re-sent automatically after reconnects.
    pub async fn presence_track(
        &self,
        topic: &str,
        payload: serde_json::Value,
    ) -> Result<(), TransportError> {
        self.send(RealtimeCommand::PresenceTrack {
            topic: topic.to_string(),
            payload,
        })
        .await
    }

    pub async fn presence_untrack(&self, topic: &str) -> Result<(), TransportError> {
        self.send(RealtimeCommand::PresenceUntrack {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn is_connected(&self) -> bool {
        *self.connected.read().await
    }

    /// Leave every channel and stop reconnecting.
    pub async fn disconnect(&self) {
        let _ = self.send(RealtimeCommand::Disconnect).await;
    }
}
