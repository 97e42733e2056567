//! Model selection: grid-search every catalog family, keep the best on the
//! held-out split, report metrics and persist the bundle.

use crate::algorithms::evaluation::CrossValidation;
use crate::algorithms::estimator::format_params;
use crate::algorithms::metrics::{classification_score, r2_score};
use crate::algorithms::{Estimator, GridSearchCv, Matrix, Params};
use crate::artifact::{ClassificationMetrics, ModelArtifact, TransformationArtifact};
use crate::context::PipelineContext;
use crate::data::transform::Preprocessor;
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::layout::TrainerPaths;
use crate::storage;
use crate::training::bundle::NetworkModel;
use crate::training::catalog::ModelCatalog;
use crate::training::tracking::{ExperimentTracker, tracker_from_config};
use tracing::{info, warn};

/// Outcome of searching one catalog family.
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    pub name: String,
    pub best_params: Params,
    pub cv_score: f64,
    pub test_score: f64,
    /// Refit on the full training split with `best_params`.
    pub model: Estimator,
}

/// Model name -> held-out score, in catalog order.
pub fn score_report(evaluations: &[ModelEvaluation]) -> Vec<(String, f64)> {
    evaluations
        .iter()
        .map(|e| (e.name.clone(), e.test_score))
        .collect()
}

/// Name with the highest score; the earliest entry wins a tie. NaN scores
/// never win.
pub fn select_best(report: &[(String, f64)]) -> Option<&str> {
    let mut best: Option<&(String, f64)> = None;
    for entry in report {
        if entry.1.is_nan() {
            continue;
        }
        if best.is_none_or(|b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    best.map(|(name, _)| name.as_str())
}

pub struct ModelTrainer<'a> {
    ctx: &'a PipelineContext,
    catalog: ModelCatalog,
    tracker: Box<dyn ExperimentTracker>,
    paths: TrainerPaths,
}

impl<'a> ModelTrainer<'a> {
    /// Trainer with the configured catalog and tracking backend.
    pub fn new(ctx: &'a PipelineContext) -> Result<Self> {
        let cfg = &ctx.config;
        let catalog = ModelCatalog::from_kind(cfg.trainer.catalog, cfg.trainer.seed);
        let tracker = tracker_from_config(
            &cfg.tracking,
            ctx.credentials.tracking_token.as_deref(),
            &ctx.run.tracking_file(),
        )
        .stage(Stage::ModelTrainer)?;
        Ok(Self::with_parts(ctx, catalog, tracker))
    }

    pub fn with_parts(
        ctx: &'a PipelineContext,
        catalog: ModelCatalog,
        tracker: Box<dyn ExperimentTracker>,
    ) -> Self {
        Self {
            ctx,
            catalog,
            tracker,
            paths: ctx.run.model_trainer(),
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Grid-search every family, refit the winner of each search on the full
    /// training split and score it on the test split with R².
    ///
    /// A family whose every grid candidate fails is skipped with a warning.
    pub fn evaluate(
        &self,
        x_train: &Matrix,
        y_train: &[f64],
        x_test: &Matrix,
        y_test: &[f64],
    ) -> Result<Vec<ModelEvaluation>> {
        let cv = CrossValidation::new(self.ctx.config.trainer.cv_folds);
        let mut evaluations = Vec::with_capacity(self.catalog.len());
        for entry in self.catalog.entries() {
            info!(
                model = %entry.name,
                candidates = entry.grid.len(),
                "running grid search"
            );
            let search = GridSearchCv::new(entry.estimator.clone(), entry.grid.clone(), cv.clone());
            let result = match search.fit(x_train, y_train) {
                Ok(r) => r,
                Err(e) => {
                    warn!(model = %entry.name, error = %e, "skipping model family");
                    continue;
                }
            };
            let y_pred = result.best_estimator.predict(x_test)?;
            let test_score = r2_score(y_test, &y_pred)?;
            info!(
                model = %entry.name,
                params = %format_params(result.best_params()),
                cv_accuracy = result.best_score(),
                test_r2 = test_score,
                "model evaluated"
            );
            evaluations.push(ModelEvaluation {
                name: entry.name.clone(),
                best_params: result.best_params().clone(),
                cv_score: result.best_score(),
                test_score,
                model: result.best_estimator,
            });
        }
        Ok(evaluations)
    }

    fn log_run(&mut self, metrics: &ClassificationMetrics, model: &Estimator) -> Result<()> {
        self.tracker.log_metric("f1_score", metrics.f1_score)?;
        self.tracker.log_metric("precision", metrics.precision)?;
        self.tracker.log_metric("recall", metrics.recall)?;
        self.tracker.log_model("model", model)
    }

    /// One tracked run holding a metric set and the model.
    fn track(&mut self, run: &str, metrics: &ClassificationMetrics, model: &Estimator) -> Result<()> {
        self.tracker.start_run(run)?;
        let logged = self.log_run(metrics, model);
        let ended = self.tracker.end_run();
        logged.and(ended)
    }

    fn track_or_warn(&mut self, run: &str, metrics: &ClassificationMetrics, model: &Estimator) -> Result<()> {
        match self.track(run, metrics, model) {
            Err(e) if !self.ctx.config.tracking.fail_on_error => {
                warn!(run, error = %e, "experiment tracking failed; continuing");
                Ok(())
            }
            other => other,
        }
    }

    pub fn train_model(
        &mut self,
        x_train: &Matrix,
        y_train: &[f64],
        x_test: &Matrix,
        y_test: &[f64],
        preprocessor_path: &std::path::Path,
    ) -> Result<ModelArtifact> {
        let evaluations = self.evaluate(x_train, y_train, x_test, y_test)?;
        let report = score_report(&evaluations);
        let best_name = select_best(&report)
            .ok_or_else(|| PipelineError::model("no model family could be trained"))?
            .to_string();
        let Some(best) = evaluations.into_iter().find(|e| e.name == best_name) else {
            return Err(PipelineError::model(format!("model '{best_name}' vanished")));
        };
        info!(
            model = %best.name,
            score = best.test_score,
            params = %format_params(&best.best_params),
            "selected best model"
        );

        let train_metrics = classification_score(y_train, &best.model.predict(x_train)?)?;
        self.track_or_warn("train", &train_metrics, &best.model)?;
        let test_metrics = classification_score(y_test, &best.model.predict(x_test)?)?;
        self.track_or_warn("test", &test_metrics, &best.model)?;

        let preprocessor: Preprocessor = storage::load_object(preprocessor_path)?;
        let bundle = NetworkModel::new(best.name.clone(), preprocessor, best.model)?;
        bundle.save(&self.paths.trained_model_file)?;
        info!(
            path = %self.paths.trained_model_file.display(),
            ?train_metrics,
            ?test_metrics,
            "saved model bundle"
        );

        Ok(ModelArtifact {
            trained_model_path: self.paths.trained_model_file.clone(),
            best_model_name: best.name,
            best_model_score: best.test_score,
            train_metrics,
            test_metrics,
        })
    }

    pub fn run(&mut self, transformation: &TransformationArtifact) -> Result<ModelArtifact> {
        let _span = self.ctx.stage_span(Stage::ModelTrainer).entered();
        self.run_inner(transformation).stage(Stage::ModelTrainer)
    }

    fn run_inner(&mut self, transformation: &TransformationArtifact) -> Result<ModelArtifact> {
        let train = storage::load_array(&transformation.transformed_train_path)?;
        let test = storage::load_array(&transformation.transformed_test_path)?;
        let (x_train, y_train) = train.split_last_column()?;
        let (x_test, y_test) = test.split_last_column()?;
        self.train_model(
            &x_train,
            &y_train,
            &x_test,
            &y_test,
            &transformation.transformed_object_path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{KnnImputer, ParamGrid, ParamValue};
    use crate::algorithms::tree::DecisionTreeClassifier;
    use crate::config::PipelineConfig;
    use crate::context::Credentials;
    use crate::data::table::{Column, Table};
    use crate::layout::RunContext;
    use crate::training::tracking::{FileTracker, NoopTracker, RunRegistry};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    struct FailingTracker;

    impl ExperimentTracker for FailingTracker {
        fn start_run(&mut self, _name: &str) -> Result<()> {
            Err(PipelineError::tracking("backend unavailable"))
        }
        fn log_metric(&mut self, _key: &str, _value: f64) -> Result<()> {
            Ok(())
        }
        fn log_model(&mut self, _artifact_path: &str, _model: &Estimator) -> Result<()> {
            Ok(())
        }
        fn end_run(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn context(dir: &TempDir, fail_on_error: bool) -> PipelineContext {
        let mut config = PipelineConfig::default();
        config.tracking.fail_on_error = fail_on_error;
        let run = RunContext::with_timestamp(dir.path(), "p", "t");
        PipelineContext::with_run(config, Credentials::default(), run)
    }

    /// Two features, label 1 when the first exceeds 14.
    fn dataset(n: usize, offset: usize) -> (Matrix, Vec<f64>) {
        let rows = (0..n)
            .map(|i| {
                let v = ((i * 29 + offset) % n) as f64;
                vec![v, (i % 4) as f64]
            })
            .collect::<Vec<_>>();
        let y = rows.iter().map(|r| if r[0] > 14.0 { 1.0 } else { 0.0 }).collect();
        (Matrix::from_rows(rows).unwrap(), y)
    }

    fn tree_catalog(names: &[&str]) -> ModelCatalog {
        let mut catalog = ModelCatalog::new();
        for name in names {
            catalog.push(
                *name,
                Estimator::DecisionTree(DecisionTreeClassifier::default()),
                ParamGrid::new().with("criterion", vec![ParamValue::str("gini")]),
            );
        }
        catalog
    }

    fn save_preprocessor(dir: &TempDir) -> std::path::PathBuf {
        let features = Table::new(vec![
            Column::numeric("f1", vec![Some(0.0), Some(20.0), Some(29.0)]),
            Column::numeric("f2", vec![Some(1.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap();
        let mut pre = Preprocessor::new(KnnImputer::new(2, Default::default()));
        pre.fit(&features).unwrap();
        let path = dir.path().join("pre.bin");
        storage::save_object(&path, &pre).unwrap();
        path
    }

    #[test]
    fn test_select_best_prefers_first_on_tie() {
        let report = vec![
            ("a".to_string(), 0.5),
            ("b".to_string(), 0.9),
            ("c".to_string(), 0.9),
            ("d".to_string(), f64::NAN),
        ];
        assert_eq!(select_best(&report), Some("b"));
        assert_eq!(select_best(&[]), None);
        assert_eq!(select_best(&[("x".to_string(), f64::NAN)]), None);
    }

    #[test]
    fn test_identical_models_resolve_to_catalog_order() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, true);
        let trainer = ModelTrainer::with_parts(&ctx, tree_catalog(&["first", "second"]), Box::new(NoopTracker));
        let (x, y) = dataset(30, 0);
        let (xt, yt) = dataset(12, 5);
        let evaluations = trainer.evaluate(&x, &y, &xt, &yt).unwrap();
        let report = score_report(&evaluations);
        assert_eq!(report[0].1, report[1].1);
        assert_eq!(select_best(&report), Some("first"));
    }

    #[test]
    fn test_train_model_tracks_both_splits() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, true);
        let tracker = FileTracker::open(ctx.run.tracking_file(), "netsec").unwrap();
        let mut trainer = ModelTrainer::with_parts(&ctx, tree_catalog(&["tree"]), Box::new(tracker));
        let (x, y) = dataset(30, 0);
        let (xt, yt) = dataset(12, 5);
        let artifact = trainer
            .train_model(&x, &y, &xt, &yt, &save_preprocessor(&dir))
            .unwrap();

        assert_eq!(artifact.best_model_name, "tree");
        assert_eq!(artifact.train_metrics.f1_score, 1.0);
        assert!(artifact.trained_model_path.exists());
        let registry = RunRegistry::load(&ctx.run.tracking_file()).unwrap();
        let names: Vec<&str> = registry.runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["train", "test"]);
        assert_eq!(registry.runs[0].metrics["precision"], 1.0);
        let mut keys: Vec<&str> = registry.runs[1].metrics.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["f1_score", "precision", "recall"]);

        let bundle = NetworkModel::load(&artifact.trained_model_path).unwrap();
        assert_eq!(bundle.preprocessor.feature_names(), &["f1", "f2"]);
    }

    #[test]
    fn test_tracking_failure_is_fatal_by_default() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, true);
        let mut trainer = ModelTrainer::with_parts(&ctx, tree_catalog(&["tree"]), Box::new(FailingTracker));
        let (x, y) = dataset(30, 0);
        let err = trainer
            .train_model(&x, &y, &x, &y, &save_preprocessor(&dir))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Tracking(_)));
        assert!(!ctx.run.model_trainer().trained_model_file.exists());
    }

    #[test]
    fn test_tracking_failure_can_be_downgraded() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, false);
        let mut trainer = ModelTrainer::with_parts(&ctx, tree_catalog(&["tree"]), Box::new(FailingTracker));
        let (x, y) = dataset(30, 0);
        let artifact = trainer
            .train_model(&x, &y, &x, &y, &save_preprocessor(&dir))
            .unwrap();
        assert!(artifact.trained_model_path.exists());
    }

    #[test]
    fn test_run_wraps_missing_arrays() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, true);
        let mut trainer = ModelTrainer::with_parts(&ctx, tree_catalog(&["tree"]), Box::new(NoopTracker));
        let err = trainer
            .run(&TransformationArtifact {
                transformed_train_path: dir.path().join("missing/train.bin"),
                transformed_test_path: dir.path().join("missing/test.bin"),
                transformed_object_path: dir.path().join("missing/pre.bin"),
            })
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::ModelTrainer));
        assert!(matches!(err.root(), PipelineError::NotFound(_)));
    }
}
