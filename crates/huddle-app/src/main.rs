mod cli;
mod console;
mod identity;

use std::sync::Arc;

use huddle_config::HuddleConfig;
use huddle_room::transport::realtime::RealtimeConfig;
use huddle_room::{
    HeadlessDevices, HeadlessEngine, RealtimeTransport, RoomError, RoomSession, SessionConfig,
    SessionDeps, StaticDirectory,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use crate::cli::Command;
use crate::console::ConsoleCommand;

fn init_logging(args: &cli::Args, config: &HuddleConfig) {
    let fallback = format!("huddle={0},huddle_room={0}", config.logging.level.as_directive());
    let directive = args.log_level.clone().unwrap_or(fallback);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .unwrap_or_else(|_| EnvFilter::new("huddle=info"));
    // Logs go to stderr so they do not interleave with room output.
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

fn load(args: &cli::Args) -> Result<HuddleConfig, huddle_common::ConfigError> {
    match &args.config {
        Some(path) => {
            let config = huddle_config::toml_loader::load_from_path(std::path::Path::new(path))?;
            huddle_config::validation::validate(&config)?;
            Ok(config)
        }
        None => huddle_config::load_config(),
    }
}

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("huddle: config load failed, using defaults: {e}");
            HuddleConfig::default()
        }
    };
    init_logging(&args, &config);
    tracing::info!("Huddle v{} starting...", env!("CARGO_PKG_VERSION"));

    let (space, name, id) = match args.command {
        Some(Command::Config) => {
            println!("{}", huddle_config::config_to_json(&config));
            return;
        }
        Some(Command::Join { space, name, id }) => (space, name, id),
        None => (None, None, None),
    };
    let space = space.unwrap_or_else(|| config.room.default_space.clone());
    if let Err(e) = run_room(&config, &space, name, id).await {
        tracing::error!(error = %e, "Room session failed");
        eprintln!("huddle: {e}");
        std::process::exit(1);
    }
    tracing::info!("Shutdown complete");
}

async fn run_room(
    config: &HuddleConfig,
    space: &str,
    name: Option<String>,
    id: Option<String>,
) -> Result<(), RoomError> {
    let identity = identity::resolve(&config.identity, name, id);
    let room_id = huddle_common::room_key(space);

    let transport = Arc::new(RealtimeTransport::connect(
        RealtimeConfig::from_settings(&config.realtime),
        identity.id.clone(),
    ));
    let directory = StaticDirectory::new(identity.clone())
        .with_moderators(config.directory.moderators.iter().cloned());
    let deps = SessionDeps {
        transport: transport.clone(),
        directory: Arc::new(directory),
        devices: Arc::new(HeadlessDevices::new()),
        engine: Arc::new(HeadlessEngine::new()),
    };

    let session = RoomSession::connect(SessionConfig::from_settings(&room_id, &config.room), deps)
        .await?;
    let mut events = session.subscribe();
    let result = session.wait_connected().await;
    if let Err(e) = result {
        transport.shutdown().await;
        return Err(e);
    }

    println!(
        "Joined {room_id} as {} <{}>. Type /help for commands.",
        identity.display_name, identity.id
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshots = session.snapshots();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                };
                match console::parse(&line) {
                    None => {}
                    Some(Err(msg)) => println!("{msg}"),
                    Some(Ok(ConsoleCommand::Leave)) => break,
                    Some(Ok(command)) => {
                        if let Err(e) = execute(&session, command).await {
                            println!("! {e}");
                        }
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => println!("{}", console::describe_event(&event)),
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event receiver lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() || snapshots.borrow().status.is_terminal() {
                    break;
                }
            }
        }
    }

    let status = session.status();
    if !status.is_terminal() {
        session.leave().await?;
    }
    println!("* {}", session.status());
    transport.shutdown().await;
    Ok(())
}

async fn execute(session: &RoomSession, command: ConsoleCommand) -> Result<(), RoomError> {
    match command {
        ConsoleCommand::ToggleMute => {
            let muted = session.toggle_mute().await?;
            println!("{}", if muted { "* muted" } else { "* unmuted" });
        }
        ConsoleCommand::Share => session.start_screen_share().await?,
        ConsoleCommand::Unshare => session.stop_screen_share().await?,
        ConsoleCommand::React(emoji) => session.send_reaction(&emoji).await?,
        ConsoleCommand::Say(text) => session.send_message(&text).await?,
        ConsoleCommand::ForceMute(target) => session.mute_user(&target).await?,
        ConsoleCommand::Kick(target) => session.kick_user(&target).await?,
        ConsoleCommand::Peers => println!("{}", console::describe_peers(&session.snapshot())),
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Leave => session.leave().await?,
    }
    Ok(())
}
