//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use netsec_ml::config::{CONFIG_FILE_NAME, PipelineConfig};
use netsec_ml::context::{Credentials, PipelineContext};
use netsec_ml::data::DataSeeder;
use netsec_ml::data::store::SqliteDocumentStore;
use netsec_ml::layout::RunContext;
use netsec_ml::TrainingPipeline;
use std::path::Path;
use tracing::error;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    config: PipelineConfig,
    workspace: &Path,
    timestamp: &str,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, &config, workspace),
        Commands::Train => {
            let ctx = context(config, timestamp);
            handle_train(&ctx)
        }
        Commands::Push {
            file,
            database,
            collection,
        } => {
            let ctx = context(config, timestamp);
            handle_push(&ctx, &file, database, collection)
        }
    }
}

fn context(config: PipelineConfig, timestamp: &str) -> PipelineContext {
    let credentials = Credentials::from_lookup(|key| std::env::var(key).ok());
    let run = RunContext::with_timestamp(
        &config.pipeline.artifacts_dir,
        &config.pipeline.name,
        timestamp,
    );
    PipelineContext::with_run(config, credentials, run)
}

fn handle_train(ctx: &PipelineContext) -> anyhow::Result<()> {
    let store = SqliteDocumentStore::open(&ctx.store_path())
        .map_err(|e| anyhow::anyhow!("Failed to open document store: {e}"))?;
    let result = TrainingPipeline::new(ctx, &store).run_with(|artifact| println!("{artifact}"));
    match result {
        Ok(model) => {
            println!(
                "Best model: {} (score {:.4}) saved to {}",
                model.best_model_name,
                model.best_model_score,
                model.trained_model_path.display()
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "training pipeline failed");
            Err(anyhow::anyhow!(e))
        }
    }
}

fn handle_push(
    ctx: &PipelineContext,
    file: &Path,
    database: Option<String>,
    collection: Option<String>,
) -> anyhow::Result<()> {
    let database = database.unwrap_or_else(|| ctx.config.ingestion.database.clone());
    let collection = collection.unwrap_or_else(|| ctx.config.ingestion.collection.clone());
    let mut store = SqliteDocumentStore::open(&ctx.store_path())
        .map_err(|e| anyhow::anyhow!("Failed to open document store: {e}"))?;
    let inserted = DataSeeder::new(ctx, &mut store).push(file, &database, &collection)?;
    println!("Inserted {inserted} records into {database}.{collection}");
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    config: &PipelineConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{toml_str}");
            Ok(())
        }
    }
}
