//! huddle-relay: self-hosted presence and broadcast relay for voice rooms.
//!
//! Speaks the subset of Phoenix Channels v1 (JSON) that room clients use:
//! channel join/leave, presence track/untrack with state and diffs, and
//! broadcast fan-out. Payloads are relayed untouched.

mod connection;
mod protocol;
mod rooms;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use huddle_config::{HuddleConfig, RelaySettings};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;
use crate::rooms::RoomStore;

#[derive(Parser)]
#[command(name = "huddle-relay", about = "Presence and broadcast relay for huddle rooms")]
struct Args {
    /// Config file. Defaults to the platform config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Seconds without client traffic before the connection is dropped.
    #[arg(long)]
    idle_timeout: Option<u64>,
}

fn load(args: &Args) -> Result<HuddleConfig, huddle_common::ConfigError> {
    match &args.config {
        Some(path) => {
            let config = huddle_config::toml_loader::load_from_path(path)?;
            huddle_config::validation::validate(&config)?;
            Ok(config)
        }
        None => huddle_config::load_config(),
    }
}

fn listen_addr(settings: &RelaySettings, args: &Args) -> String {
    let bind = args.bind.as_deref().unwrap_or(&settings.bind);
    let port = args.port.map_or(settings.port, u32::from);
    format!("{bind}:{port}")
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("huddle-relay: {e}");
            std::process::exit(2);
        }
    };

    let default_filter = format!("huddle_relay={}", config.logging.level.as_directive());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let store = RoomStore::new();
    let idle_timeout = Duration::from_secs(
        args.idle_timeout
            .unwrap_or(u64::from(config.relay.idle_timeout)),
    );

    let addr = listen_addr(&config.relay, &args);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };

    tracing::info!("huddle-relay listening on {}", addr);

    // Spawn stale member reaper.
    let reaper_store = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let reaped = reaper_store.reap_stale().await;
            let topics = reaper_store.topic_count().await;
            tracing::debug!(topics, reaped, "Reaper tick");
        }
    });

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store, idle_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
