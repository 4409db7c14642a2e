//! Roundgate CLI — the main entry point.
//!
//! Commands:
//! - `serve`  — Start the HTTP gateway
//! - `round`  — Run a single round and print the result
//! - `config` — Show, locate or validate configuration
//! - `cache`  — Inspect or clear the result cache

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "roundgate",
    about = "Roundgate — admission, caching and accounting for expensive agent rounds",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ~/.roundgate/config.toml)
    #[arg(short, long, global = true, env = "ROUNDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run one round through the full pipeline and print the result
    Round {
        /// What the round should find
        description: String,

        /// Item id to anchor on (repeatable)
        #[arg(short, long = "anchor")]
        anchors: Vec<String>,

        /// Operation mode: infer, fast or diligent
        #[arg(short, long, value_parser = commands::round::parse_mode)]
        mode: Option<roundgate_core::OperationMode>,

        /// Ignore any stored result and run the round again
        #[arg(long)]
        no_cache: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Result cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default configuration file location
    Path,
    /// Print a configuration file with every default filled in
    Default,
    /// Check the configuration for errors
    Validate,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show where results are stored and how many there are
    Stats,
    /// Remove every stored result
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Round {
            description,
            anchors,
            mode,
            no_cache,
        } => commands::round::run(config_path, description, anchors, mode, no_cache).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Default => commands::config_cmd::print_default(),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::cache::stats(config_path).await?,
            CacheAction::Clear => commands::cache::clear(config_path).await?,
        },
    }

    Ok(())
}
