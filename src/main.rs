// SPDX-License-Identifier: GPL-3.0-only
mod commands;
mod config;
mod downloader;
mod error;
mod logging;
mod notify;
mod registry;
mod resolver;
mod storage;
mod sync;
mod utils;

#[cfg(test)]
mod test_helpers;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::Config;
use logging::setup_logging;
use sync::SyncOptions;

#[derive(Parser, Debug)]
#[command(
    name = "manifest-mirror",
    version,
    about = "Mirror package manifests into blob storage and announce new versions"
)]
struct Cli {
    /// TOML configuration file (defaults to $MIRROR_CONFIG, then mirror.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check tracked applications upstream and mirror new manifests
    Sync(SyncArgs),

    /// Manage the tracked application list
    Apps {
        #[command(subcommand)]
        action: AppsCommand,
    },
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Only sync this application (repeatable)
    #[arg(long = "app", value_name = "ID")]
    apps: Vec<String>,

    /// Report decisions without downloading or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Only sync applications with winget pull requests merged in the last N hours
    #[arg(long, value_name = "N")]
    since_hours: Option<u64>,

    /// Repeat the pass every SECS seconds until Ctrl+C
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum AppsCommand {
    /// List tracked applications and their last-known state
    List,

    /// Start tracking an application
    Add {
        id: String,

        /// Upstream location to record for the application
        #[arg(long, value_name = "URL")]
        source_url: Option<String>,
    },

    /// Stop tracking an application
    Remove { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    setup_logging(&config.log_level, config.log_format)?;

    config.validate()?;

    info!("Starting manifest-mirror v{}", env!("CARGO_PKG_VERSION"));

    let registry = registry::from_config(&config).await?;

    match cli.command {
        Command::Sync(args) => {
            let runner = commands::build_runner(&config, registry)?;
            let options = SyncOptions {
                apps: args.apps,
                dry_run: args.dry_run,
                since_hours: args.since_hours,
            };
            match args.interval {
                Some(secs) => commands::sync_every(&runner, &options, secs, args.json).await,
                None => commands::sync_once(&runner, &options, args.json).await,
            }
        }
        Command::Apps { action } => match action {
            AppsCommand::List => commands::apps_list(registry.as_ref()).await,
            AppsCommand::Add { id, source_url } => commands::apps_add(registry.as_ref(), &id, source_url).await,
            AppsCommand::Remove { id } => commands::apps_remove(registry.as_ref(), &id).await,
        },
    }
}
