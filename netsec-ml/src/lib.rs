//! # netsec-ml — batch training pipeline for the network-security classifier
//!
//! Records flow through four stages, each handing a typed artifact to the next:
//!
//! 1. **Ingestion** — document store -> feature-store snapshot -> train/test split
//! 2. **Validation** — schema and numeric-type checks, per-column KS drift report
//! 3. **Transformation** — target recoding and KNN imputation fitted on train only
//! 4. **Model selection** — grid search over a classifier catalog, best model
//!    bundled with its preprocessor
//!
//! Every stage borrows a [`PipelineContext`] holding configuration, credentials,
//! the run layout and the run's tracing span.

pub mod algorithms;
pub mod artifact;
pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod layout;
pub mod lineage;
pub mod pipeline;
pub mod storage;
pub mod training;

pub use artifact::{
    ClassificationMetrics, IngestionArtifact, ModelArtifact, TransformationArtifact,
    ValidationArtifact,
};
pub use config::{PipelineConfig, load_config};
pub use context::{Credentials, PipelineContext};
pub use error::{PipelineError, Result, Stage};
pub use layout::RunContext;
pub use lineage::RunLineage;
pub use pipeline::{StageArtifact, TrainingPipeline};
pub use training::{NetworkModel, Predictor};
