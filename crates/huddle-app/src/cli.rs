use clap::{Parser, Subcommand};

/// Huddle: join a voice room from the terminal.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join a space's voice room. Uses `room.default_space` when omitted.
    Join {
        space: Option<String>,

        /// Display name for this run.
        #[arg(long)]
        name: Option<String>,

        /// Participant id for this run.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print the effective configuration as JSON.
    Config,
}

pub fn parse() -> Args {
    Args::parse()
}
