//! Configuration types for the netsec training pipeline.
//!
//! Uses `figment` for layered configuration: defaults -> `netsec.toml` -> environment.
//! Environment variables are prefixed with `NETSEC_` and use `__` between
//! section and key, e.g. `NETSEC_INGESTION__SPLIT_RATIO=0.25`.

use crate::algorithms::Weights;
use crate::error::{PipelineError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level config file.
pub const CONFIG_FILE_NAME: &str = "netsec.toml";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: RunConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub transformation: TransformationConfig,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Run-wide settings shared by every stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Pipeline name, used as the prefix of each run directory.
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    /// Directory under which timestamped run directories are created.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Directory for JSON log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: PathBuf,
    /// Binary label column.
    #[serde(default = "default_target_column")]
    pub target_column: String,
    /// File name of the raw feature-store snapshot.
    #[serde(default = "default_feature_store_file")]
    pub feature_store_file: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            artifacts_dir: default_artifacts_dir(),
            logs_dir: default_logs_dir(),
            target_column: default_target_column(),
            feature_store_file: default_feature_store_file(),
        }
    }
}

fn default_pipeline_name() -> String {
    "network_security_pipeline".to_string()
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_target_column() -> String {
    "Result".to_string()
}

fn default_feature_store_file() -> String {
    "phisingData.csv".to_string()
}

/// Data ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Fraction of rows held out as the test split.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Literal that the document store uses for a missing value.
    #[serde(default = "default_missing_marker")]
    pub missing_marker: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            collection: default_collection(),
            split_ratio: default_split_ratio(),
            seed: default_seed(),
            missing_marker: default_missing_marker(),
        }
    }
}

fn default_database() -> String {
    "network_security".to_string()
}

fn default_collection() -> String {
    "network_data".to_string()
}

fn default_split_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_missing_marker() -> String {
    "na".to_string()
}

/// Data validation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// p-value below which a column is reported as drifted.
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            drift_threshold: default_drift_threshold(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("data_schema").join("schema.yaml")
}

fn default_drift_threshold() -> f64 {
    0.5
}

/// KNN imputer hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationConfig {
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    #[serde(default)]
    pub weights: Weights,
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            weights: Weights::Uniform,
        }
    }
}

fn default_n_neighbors() -> usize {
    3
}

/// Which classifier catalog the trainer searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// Every model family with its full hyperparameter grid.
    #[default]
    Standard,
    /// Every model family with a handful of grid points each.
    Compact,
}

/// Model selection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default)]
    pub catalog: CatalogKind,
    /// Seed for the randomized estimators (forests, random splitters, subsampling).
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            cv_folds: default_cv_folds(),
            catalog: CatalogKind::Standard,
            seed: default_seed(),
        }
    }
}

fn default_cv_folds() -> usize {
    3
}

/// Document store location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file holding the document collections.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("network_data.db")
}

/// Experiment-tracking backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingBackend {
    #[default]
    None,
    File,
    Mlflow,
}

/// Experiment-tracking configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default)]
    pub backend: TrackingBackend,
    /// MLflow server URL, or the run-registry path for the file backend.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default = "default_experiment")]
    pub experiment: String,
    /// Abort model training when the tracking backend fails.
    #[serde(default = "default_true")]
    pub fail_on_error: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            backend: TrackingBackend::None,
            uri: None,
            experiment: default_experiment(),
            fail_on_error: true,
        }
    }
}

fn default_experiment() -> String {
    "network_security".to_string()
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<()> {
        let ratio = self.ingestion.split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::config(format!(
                "ingestion.split_ratio must be in (0, 1), got {ratio}"
            )));
        }
        let threshold = self.validation.drift_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::config(format!(
                "validation.drift_threshold must be in [0, 1], got {threshold}"
            )));
        }
        if self.transformation.n_neighbors == 0 {
            return Err(PipelineError::config(
                "transformation.n_neighbors must be at least 1",
            ));
        }
        if self.trainer.cv_folds < 2 {
            return Err(PipelineError::config("trainer.cv_folds must be at least 2"));
        }
        if self.pipeline.target_column.is_empty() {
            return Err(PipelineError::config("pipeline.target_column is empty"));
        }
        Ok(())
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `NETSEC_`)
/// 2. Explicit config file, or `netsec.toml` in the workspace
/// 3. Built-in defaults
pub fn load_config(workspace: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(PipelineError::not_found(format!(
                    "config file {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        None => {
            let ws_config = workspace.join(CONFIG_FILE_NAME);
            if ws_config.exists() {
                figment = figment.merge(Toml::file(&ws_config));
            }
        }
    }

    figment = figment.merge(Env::prefixed("NETSEC_").split("__"));

    let config: PipelineConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
