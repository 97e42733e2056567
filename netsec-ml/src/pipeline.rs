//! End-to-end training pipeline: ingestion through model selection.

use crate::artifact::{
    IngestionArtifact, ModelArtifact, TransformationArtifact, ValidationArtifact,
};
use crate::context::PipelineContext;
use crate::data::ingest::DataIngestion;
use crate::data::store::DocumentStore;
use crate::data::transform::DataTransformation;
use crate::data::validate::DataValidation;
use crate::error::{Result, Stage, StageResultExt};
use crate::lineage::RunLineage;
use crate::training::trainer::ModelTrainer;
use serde::Serialize;
use std::fmt;
use tracing::info;

/// A stage's output, as reported while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", content = "artifact", rename_all = "snake_case")]
pub enum StageArtifact {
    Ingestion(IngestionArtifact),
    Validation(ValidationArtifact),
    Transformation(TransformationArtifact),
    ModelTrainer(ModelArtifact),
}

impl StageArtifact {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Ingestion(_) => Stage::Ingestion,
            Self::Validation(_) => Stage::Validation,
            Self::Transformation(_) => Stage::Transformation,
            Self::ModelTrainer(_) => Stage::ModelTrainer,
        }
    }
}

impl fmt::Display for StageArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

pub struct TrainingPipeline<'a> {
    ctx: &'a PipelineContext,
    store: &'a dyn DocumentStore,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(ctx: &'a PipelineContext, store: &'a dyn DocumentStore) -> Self {
        Self { ctx, store }
    }

    pub fn run(&self) -> Result<ModelArtifact> {
        self.run_with(|_| {})
    }

    /// Run every stage in order, handing each artifact to `on_artifact` as
    /// soon as its stage completes, then write the run lineage.
    pub fn run_with(&self, mut on_artifact: impl FnMut(&StageArtifact)) -> Result<ModelArtifact> {
        let _run = self.ctx.span.enter();
        info!(root = %self.ctx.run.artifact_root.display(), "starting training pipeline");

        let ingestion = DataIngestion::new(self.ctx, self.store).run()?;
        on_artifact(&StageArtifact::Ingestion(ingestion.clone()));

        let validation = DataValidation::new(self.ctx)?.run(&ingestion)?;
        on_artifact(&StageArtifact::Validation(validation.clone()));

        let transformation = DataTransformation::new(self.ctx).run(&validation)?;
        on_artifact(&StageArtifact::Transformation(transformation.clone()));

        let model = ModelTrainer::new(self.ctx)?.run(&transformation)?;
        on_artifact(&StageArtifact::ModelTrainer(model.clone()));

        let lineage = {
            let _span = self.ctx.stage_span(Stage::Lineage).entered();
            self.lineage(&ingestion, &validation, &transformation, &model)
                .and_then(|lineage| {
                    lineage.save(&self.ctx.run.lineage_file())?;
                    Ok(lineage)
                })
                .stage(Stage::Lineage)?
        };
        info!(
            artifacts = lineage.artifacts.len(),
            model = %model.best_model_name,
            "training pipeline finished"
        );
        Ok(model)
    }

    fn lineage(
        &self,
        ingestion: &IngestionArtifact,
        validation: &ValidationArtifact,
        transformation: &TransformationArtifact,
        model: &ModelArtifact,
    ) -> Result<RunLineage> {
        let run = &self.ctx.run;
        let feature_store = run
            .ingestion(&self.ctx.config.pipeline.feature_store_file)
            .feature_store_file;
        let files = [
            (Stage::Ingestion, feature_store.as_path()),
            (Stage::Ingestion, ingestion.train_path.as_path()),
            (Stage::Ingestion, ingestion.test_path.as_path()),
            (Stage::Validation, validation.valid_train_path.as_path()),
            (Stage::Validation, validation.valid_test_path.as_path()),
            (Stage::Validation, validation.drift_report_path.as_path()),
            (Stage::Transformation, transformation.transformed_train_path.as_path()),
            (Stage::Transformation, transformation.transformed_test_path.as_path()),
            (Stage::Transformation, transformation.transformed_object_path.as_path()),
            (Stage::ModelTrainer, model.trained_model_path.as_path()),
        ];
        let mut lineage = RunLineage::new(&run.pipeline_name, &run.timestamp);
        for (stage, path) in files {
            lineage.record(stage.as_str(), path)?;
        }
        Ok(lineage)
    }
}
