use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{
    auth::{AuthUrlCommand, WhoAmICommand},
    calendar::{CheckCommand, EventsCommand},
    Command, CommandContext,
};
use freebusy_companion::Config;

#[derive(Parser)]
#[command(name = "freebusy-companion")]
#[command(about = "Sign in with Google and check whether a time slot is free")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Google sign-in URL
    AuthUrl,
    /// Show the identity carried by a sign-in redirect
    Whoami {
        /// Redirect URL (or its query string) after signing in
        #[arg(long)]
        callback: String,
    },
    /// List calendar events
    Events {
        /// Redirect URL (or its query string) after signing in
        #[arg(long)]
        callback: String,
        /// Hide events that have already started
        #[arg(long)]
        upcoming: bool,
    },
    /// Check whether a local time slot is free
    Check {
        /// Redirect URL (or its query string) after signing in
        #[arg(long)]
        callback: String,
        /// Date as YYYY-MM-DD
        #[arg(long)]
        date: String,
        /// Start time as HH:MM
        #[arg(long)]
        start: String,
        /// End time as HH:MM
        #[arg(long)]
        end: String,
        /// IANA timezone the times are in (defaults to the configured zone)
        #[arg(long)]
        zone: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging is configured from the file, so load it first
    let config = match &cli.config {
        Some(path) => Config::load_from(path).await,
        None => Config::load().await,
    }
    .context("Failed to load application configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter(cli.debug).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Free/busy companion starting up");
    debug!("Gateway: {:?} at {}", config.gateway.kind, config.gateway.base_url);

    let context = CommandContext::new(config, cli.debug);

    let mut command: Box<dyn Command> = match cli.command {
        Commands::AuthUrl => Box::new(AuthUrlCommand),
        Commands::Whoami { callback } => Box::new(WhoAmICommand { callback }),
        Commands::Events { callback, upcoming } => Box::new(EventsCommand {
            callback,
            upcoming_only: upcoming,
        }),
        Commands::Check {
            callback,
            date,
            start,
            end,
            zone,
        } => Box::new(CheckCommand {
            callback,
            date,
            start,
            end,
            zone,
        }),
    };

    command.execute(&context).await.context("Failed to execute command")?;

    Ok(())
}
