//! CLI entry and dispatch.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tagstream_core::SessionMode;
use tagstream_core::config;

mod commands;
mod logging;
mod render;

#[derive(Parser)]
#[command(name = "tagstream")]
#[command(version = "0.1")]
#[command(about = "Watch agent sessions and parse tagged responses")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Connect to an agent backend and print the live response
    Watch {
        /// Event stream URL (overrides config)
        #[arg(long, value_name = "URL")]
        events: Option<String>,

        /// WebSocket URL (overrides config)
        #[arg(long, value_name = "URL")]
        socket: Option<String>,

        /// Channels the session needs: events, socket or dual
        #[arg(long, value_name = "MODE", env = "TAGSTREAM_MODE")]
        mode: Option<String>,

        /// Print every snapshot as one JSON line
        #[arg(long)]
        json: bool,

        /// Exit after the first completed turn
        #[arg(long)]
        once: bool,
    },

    /// Parse a tagged response from a file or stdin
    Parse {
        /// Input file (reads stdin when omitted or "-")
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Feed the input in chunks of N characters, as a stream would
        #[arg(long, value_name = "N")]
        chunk_size: Option<usize>,

        /// Print the parsed response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print the effective configuration
    Show,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    let result = rt.block_on(async move { dispatch(cli).await });
    // A pending stdin read must not hold the process open.
    rt.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    // config commands work even when the current file does not parse
    if let Commands::Config { command } = &cli.command {
        return match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Show => commands::config::show(),
        };
    }

    let config = config::Config::load().context("load config")?;
    let _log_guard = logging::init(&config.log)?;

    match cli.command {
        Commands::Watch {
            events,
            socket,
            mode,
            json,
            once,
        } => {
            let mode = mode
                .as_deref()
                .map(str::parse::<SessionMode>)
                .transpose()
                .context("parse --mode")?;
            commands::watch::run(commands::watch::WatchOptions {
                config: &config,
                events_url: events.as_deref(),
                socket_url: socket.as_deref(),
                mode,
                json,
                once,
            })
            .await
        }
        Commands::Parse {
            file,
            chunk_size,
            json,
        } => commands::parse::run(&config, file.as_deref(), chunk_size, json),
        Commands::Config { .. } => Ok(()),
    }
}
