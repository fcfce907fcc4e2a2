//! Shipyard - cache-aware application image builds
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use shipyard::cli::{Cli, Commands};
use shipyard::config::ConfigManager;
use shipyard::error::{ShipyardError, ShipyardResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ShipyardResult<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir()
        .map_err(|e| ShipyardError::io("getting current directory", e))?;
    let config_manager = ConfigManager::discover(cli.config.clone(), &cwd);
    let config = config_manager.load().await?;

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("shipyard=warn"),
        1 => EnvFilter::new("shipyard=info"),
        _ => EnvFilter::new("shipyard=debug"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time();
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    debug!("Using config: {}", config_manager.path().display());

    match cli.command {
        Commands::Build(args) => shipyard::cli::commands::build(args, &config).await,
        Commands::Plan(args) => shipyard::cli::commands::plan(args, &config).await,
        Commands::Config(args) => {
            shipyard::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Cache(args) => shipyard::cli::commands::cache(args, &config).await,
    }
}
