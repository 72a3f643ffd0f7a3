//! Background WebSocket connection loop with auto-reconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::handle_phoenix_message;
use super::types::{ChannelConfig, PhoenixMessage, RealtimeCommand, RealtimeConfig, RealtimeEvent};

/// A channel to (re)join on every connect.
#[derive(Clone)]
pub(crate) struct JoinedChannel {
    pub(crate) config: ChannelConfig,
    /// Ref of the most recent phx_join, used to match its reply.
    pub(crate) join_ref: Option<String>,
    pub(crate) presence_payload: Option<serde_json::Value>,
}

pub(crate) type ChannelMap = Arc<RwLock<HashMap<String, JoinedChannel>>>;

enum ForwarderExit {
    /// `disconnect()` was called.
    Disconnect,
    /// Every client handle was dropped.
    ClientGone,
}

enum SocketExit {
    Lost,
    Shutdown,
}

/// Serialize and write one message. Returns `false` once the socket is gone.
async fn send_message<S>(writer: &Mutex<S>, msg: &PhoenixMessage) -> bool
where
    S: Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(msg) {
        Ok(json) => writer
            .lock()
            .await
            .send(WsMessage::Text(json.into()))
            .await
            .is_ok(),
        Err(e) => {
            error!(error = %e, "Failed to serialize Phoenix message");
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

pub(crate) async fn connection_loop(
    config: RealtimeConfig,
    connected: Arc<RwLock<bool>>,
    event_tx: mpsc::Sender<RealtimeEvent>,
    command_rx: mpsc::Receiver<RealtimeCommand>,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let channels: ChannelMap = Arc::new(RwLock::new(HashMap::new()));
    let mut reconnect_delay = config.reconnect_delay_secs;
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);

    loop {
        let url = config.ws_url();
        info!(url = %url.split('?').next().unwrap_or(""), "Connecting to realtime relay");

        match tokio::time::timeout(connect_timeout, tokio_tungstenite::connect_async(&url)).await {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;
                *connected.write().await = true;
                let _ = event_tx.send(RealtimeEvent::Connected).await;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                rejoin_channels(&ws_write, &channels, config.access_token.as_deref()).await;

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let mut cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&channels),
                    config.access_token.clone(),
                ));

                let exit = loop {
                    tokio::select! {
                        msg = ws_read.next() => match msg {
                            Some(Ok(WsMessage::Text(text))) => {
                                match serde_json::from_str::<PhoenixMessage>(&text) {
                                    Ok(phoenix_msg) => {
                                        handle_phoenix_message(&phoenix_msg, &channels, &event_tx).await;
                                    }
                                    Err(_) => debug!(text = %text, "Unrecognized message from relay"),
                                }
                            }
                            Some(Ok(WsMessage::Close(_))) | None => {
                                info!("Realtime relay closed connection");
                                break SocketExit::Lost;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "WebSocket error");
                                break SocketExit::Lost;
                            }
                            Some(Ok(_)) => {}
                        },
                        exit = &mut cmd_handle => {
                            break match exit {
                                Ok(ForwarderExit::Disconnect | ForwarderExit::ClientGone) => {
                                    SocketExit::Shutdown
                                }
                                Err(_) => SocketExit::Lost,
                            };
                        }
                    }
                };

                heartbeat_handle.abort();
                cmd_handle.abort();
                *connected.write().await = false;
                let _ = event_tx.send(RealtimeEvent::Disconnected).await;

                if matches!(exit, SocketExit::Shutdown) {
                    info!("Realtime client shut down");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to realtime relay");
                let _ = event_tx
                    .send(RealtimeEvent::Error(format!("Connection failed: {e}")))
                    .await;
            }
            Err(_elapsed) => {
                error!(timeout_secs = config.connect_timeout_secs, "WebSocket connection timed out");
                let _ = event_tx
                    .send(RealtimeEvent::Error("Connection timed out".to_string()))
                    .await;
            }
        }

        info!(delay = reconnect_delay, "Reconnecting in {} seconds", reconnect_delay);
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }
}

/// Rejoin every known channel and restore its presence.
async fn rejoin_channels<S>(writer: &Mutex<S>, channels: &ChannelMap, access_token: Option<&str>)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut channels = channels.write().await;
    for (topic, channel) in channels.iter_mut() {
        let join = PhoenixMessage::channel(
            topic,
            "phx_join",
            channel.config.to_join_payload(access_token),
        );
        channel.join_ref = join.msg_ref.clone();
        send_message(writer, &join).await;

        if let Some(payload) = &channel.presence_payload {
            debug!(topic = %topic, "Re-tracking presence after reconnect");
            send_message(writer, &presence_track(topic, payload.clone())).await;
        }
    }
}

fn presence_track(topic: &str, payload: serde_json::Value) -> PhoenixMessage {
    PhoenixMessage::channel(
        topic,
        "presence",
        serde_json::json!({
            "type": "presence",
            "event": "track",
            "payload": payload
        }),
    )
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        interval.tick().await;
        if !send_message(&ws_write, &PhoenixMessage::heartbeat()).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<RealtimeCommand>>>,
    writer: Arc<Mutex<S>>,
    channels: ChannelMap,
    access_token: Option<String>,
) -> ForwarderExit
where
    S: Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RealtimeCommand::JoinChannel { topic, config } => {
                let join = PhoenixMessage::channel(
                    &topic,
                    "phx_join",
                    config.to_join_payload(access_token.as_deref()),
                );
                channels.write().await.insert(
                    topic,
                    JoinedChannel {
                        config,
                        join_ref: join.msg_ref.clone(),
                        presence_payload: None,
                    },
                );
                send_message(&writer, &join).await;
            }
            RealtimeCommand::LeaveChannel { topic } => {
                channels.write().await.remove(&topic);
                let leave = PhoenixMessage::channel(&topic, "phx_leave", serde_json::json!({}));
                send_message(&writer, &leave).await;
            }
            RealtimeCommand::Broadcast {
                topic,
                event,
                payload,
            } => {
                let msg = PhoenixMessage::channel(
                    &topic,
                    "broadcast",
                    serde_json::json!({
                        "type": "broadcast",
                        "event": event,
                        "payload": payload
                    }),
                );
                send_message(&writer, &msg).await;
            }
            RealtimeCommand::PresenceTrack { topic, payload } => {
                send_message(&writer, &presence_track(&topic, payload.clone())).await;
                if let Some(ch) = channels.write().await.get_mut(&topic) {
                    ch.presence_payload = Some(payload);
                }
            }
            RealtimeCommand::PresenceUntrack { topic } => {
                let msg = PhoenixMessage::channel(
                    &topic,
                    "presence",
                    serde_json::json!({
                        "type": "presence",
                        "event": "untrack"
                    }),
                );
                send_message(&writer, &msg).await;
                if let Some(ch) = channels.write().await.get_mut(&topic) {
                    ch.presence_payload = None;
                }
            }
            RealtimeCommand::Disconnect => {
                let topics: Vec<String> = channels.write().await.drain().map(|(t, _)| t).collect();
                for topic in topics {
                    let leave = PhoenixMessage::channel(&topic, "phx_leave", serde_json::json!({}));
                    send_message(&writer, &leave).await;
                }
                let _ = writer.lock().await.send(WsMessage::Close(None)).await;
                return ForwarderExit::Disconnect;
            }
        }
    }
    ForwarderExit::ClientGone
}
