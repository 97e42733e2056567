//! Per-invocation context handed to every stage.

use crate::config::PipelineConfig;
use crate::error::Stage;
use crate::layout::RunContext;
use std::path::PathBuf;
use tracing::{Span, info_span};

/// Environment variable holding the document-store location.
pub const STORE_URI_VAR: &str = "NETSEC_STORE_URI";
/// Environment variable holding the MLflow bearer token.
pub const TRACKING_TOKEN_VAR: &str = "MLFLOW_TRACKING_TOKEN";

/// Secrets supplied by the caller. The library never reads the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub store_uri: Option<String>,
    pub tracking_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("store_uri", &self.store_uri)
            .field("tracking_token", &self.tracking_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Collect credentials through `lookup`, e.g. `|k| std::env::var(k).ok()`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            store_uri: non_empty(STORE_URI_VAR),
            tracking_token: non_empty(TRACKING_TOKEN_VAR),
        }
    }
}

/// Configuration, credentials, run layout and the run's root span.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub credentials: Credentials,
    pub run: RunContext,
    pub span: Span,
}

impl PipelineContext {
    /// Context for a run starting now.
    pub fn new(config: PipelineConfig, credentials: Credentials) -> Self {
        let run = RunContext::new(&config.pipeline.artifacts_dir, &config.pipeline.name);
        Self::with_run(config, credentials, run)
    }

    pub fn with_run(config: PipelineConfig, credentials: Credentials, run: RunContext) -> Self {
        let span = info_span!(
            "pipeline_run",
            pipeline = %run.pipeline_name,
            timestamp = %run.timestamp,
        );
        Self {
            config,
            credentials,
            run,
            span,
        }
    }

    /// Document-store location: the credential wins over the configured path.
    pub fn store_path(&self) -> PathBuf {
        match &self.credentials.store_uri {
            Some(uri) => PathBuf::from(uri.strip_prefix("sqlite://").unwrap_or(uri)),
            None => self.config.store.path.clone(),
        }
    }

    /// Span for one stage, parented on the run span.
    pub fn stage_span(&self, stage: Stage) -> Span {
        match stage {
            Stage::Ingestion => info_span!(parent: &self.span, "data_ingestion"),
            Stage::Validation => info_span!(parent: &self.span, "data_validation"),
            Stage::Transformation => info_span!(parent: &self.span, "data_transformation"),
            Stage::ModelTrainer => info_span!(parent: &self.span, "model_trainer"),
            Stage::Lineage => info_span!(parent: &self.span, "run_lineage"),
            Stage::Seeding => info_span!(parent: &self.span, "data_seeding"),
        }
    }
}
