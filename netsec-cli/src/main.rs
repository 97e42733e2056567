//! netsec CLI — operator entry point for the network-security training pipeline.
//!
//! Runs the full pipeline, seeds the document store from CSV and manages the
//! workspace configuration.

mod commands;

use chrono::Local;
use clap::Parser;
use netsec_ml::config::{PipelineConfig, load_config};
use netsec_ml::layout::TIMESTAMP_FORMAT;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// netsec: batch retraining for the phishing-site classifier
#[derive(Parser, Debug)]
#[command(name = "netsec", version, about, long_about = None)]
struct Cli {
    /// Workspace directory; relative paths in the configuration resolve here
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (defaults to netsec.toml in the workspace)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run ingestion, validation, transformation and model selection
    Train,
    /// Insert the rows of a CSV file into the document store
    Push {
        /// CSV file to upload
        file: PathBuf,
        /// Target database (defaults to ingestion.database)
        #[arg(long)]
        database: Option<String>,
        /// Target collection (defaults to ingestion.collection)
        #[arg(long)]
        collection: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default netsec.toml into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

/// Rebase every relative configured path on the workspace.
fn anchor_paths(config: &mut PipelineConfig, workspace: &Path) {
    config.pipeline.artifacts_dir = workspace.join(&config.pipeline.artifacts_dir);
    config.pipeline.logs_dir = workspace.join(&config.pipeline.logs_dir);
    config.validation.schema_path = workspace.join(&config.validation.schema_path);
    config.store.path = workspace.join(&config.store.path);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    // Load .env file if present
    let _ = dotenvy::from_path(workspace.join(".env"));

    let mut config = load_config(&workspace, cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;
    anchor_paths(&mut config, &workspace);

    let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let _ = std::fs::create_dir_all(&config.pipeline.logs_dir);
    let file_appender =
        tracing_appender::rolling::never(&config.pipeline.logs_dir, format!("{timestamp}.log"));
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    commands::handle_command(cli.command, config, &workspace, &timestamp)
}
