//! Data transformation: target recoding and KNN imputation of the features.

use crate::algorithms::{KnnImputer, Matrix};
use crate::artifact::{TransformationArtifact, ValidationArtifact};
use crate::context::PipelineContext;
use crate::data::table::Table;
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::layout::TransformationPaths;
use crate::storage;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fitted feature preprocessing: column order plus the KNN imputer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    feature_names: Vec<String>,
    imputer: KnnImputer,
}

impl Preprocessor {
    pub fn new(imputer: KnnImputer) -> Self {
        Self {
            feature_names: Vec::new(),
            imputer,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn is_fitted(&self) -> bool {
        self.imputer.is_fitted()
    }

    /// Fit on a feature table; its column order becomes the expected order.
    pub fn fit(&mut self, features: &Table) -> Result<()> {
        self.feature_names = features.column_names().iter().map(|s| s.to_string()).collect();
        self.imputer.fit(&features.to_matrix()?)
    }

    /// Impute a feature matrix laid out in `feature_names` order.
    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        self.imputer.transform(x)
    }

    /// Reorder a feature table to the fitted layout and impute it.
    pub fn transform_table(&self, features: &Table) -> Result<Matrix> {
        let names: Vec<&str> = self.feature_names.iter().map(String::as_str).collect();
        let ordered = features
            .select(&names)
            .map_err(|e| PipelineError::transformation(e.to_string()))?;
        self.transform(&ordered.to_matrix()?)
    }
}

/// Map the `-1` label to `0`; every other label passes through unchanged.
pub fn recode_target(values: &[Option<f64>]) -> Result<Vec<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if *x == -1.0 => Ok(0.0),
            Some(x) => Ok(*x),
            None => Err(PipelineError::transformation(format!(
                "target is missing in row {row}"
            ))),
        })
        .collect()
}

pub struct DataTransformation<'a> {
    ctx: &'a PipelineContext,
    paths: TransformationPaths,
}

impl<'a> DataTransformation<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self {
            ctx,
            paths: ctx.run.transformation(),
        }
    }

    /// Unfitted single-step preprocessor with the configured imputer settings.
    pub fn build_preprocessor(&self) -> Preprocessor {
        let cfg = &self.ctx.config.transformation;
        info!(
            n_neighbors = cfg.n_neighbors,
            weights = ?cfg.weights,
            "building KNN imputer"
        );
        Preprocessor::new(KnnImputer::new(cfg.n_neighbors, cfg.weights))
    }

    /// Split off and recode the target column.
    fn split_target(&self, mut table: Table) -> Result<(Table, Vec<f64>)> {
        let target = &self.ctx.config.pipeline.target_column;
        let column = table.drop_column(target).ok_or_else(|| {
            PipelineError::transformation(format!("target column '{target}' is missing"))
        })?;
        let values = column.as_numeric().ok_or_else(|| {
            PipelineError::transformation(format!("target column '{target}' is not numeric"))
        })?;
        Ok((table, recode_target(values)?))
    }

    pub fn run(&self, validation: &ValidationArtifact) -> Result<TransformationArtifact> {
        let _span = self.ctx.stage_span(Stage::Transformation).entered();
        self.run_inner(validation).stage(Stage::Transformation)
    }

    fn run_inner(&self, validation: &ValidationArtifact) -> Result<TransformationArtifact> {
        let (train_features, train_target) =
            self.split_target(storage::read_table(&validation.valid_train_path)?)?;
        let (test_features, test_target) =
            self.split_target(storage::read_table(&validation.valid_test_path)?)?;

        let mut preprocessor = self.build_preprocessor();
        preprocessor.fit(&train_features)?;
        let train = preprocessor
            .transform_table(&train_features)?
            .with_column(&train_target)?;
        let test = preprocessor
            .transform_table(&test_features)?
            .with_column(&test_target)?;

        storage::save_array(&self.paths.transformed_train_file, &train)?;
        storage::save_array(&self.paths.transformed_test_file, &test)?;
        storage::save_object(&self.paths.transformed_object_file, &preprocessor)?;
        info!(
            train_shape = ?(train.nrows(), train.ncols()),
            test_shape = ?(test.nrows(), test.ncols()),
            "saved transformed arrays and preprocessor"
        );

        Ok(TransformationArtifact {
            transformed_train_path: self.paths.transformed_train_file.clone(),
            transformed_test_path: self.paths.transformed_test_file.clone(),
            transformed_object_path: self.paths.transformed_object_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::context::Credentials;
    use crate::data::table::Column;
    use crate::layout::RunContext;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_recode_target_maps_only_minus_one() {
        let out = recode_target(&[Some(-1.0), Some(1.0), Some(0.0), Some(2.0)]).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 0.0, 2.0]);
        assert!(recode_target(&[None]).is_err());
    }

    #[test]
    fn test_preprocessor_reorders_columns() {
        let train = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0)]),
            Column::numeric("b", vec![Some(10.0), Some(20.0)]),
        ])
        .unwrap();
        let mut pre = Preprocessor::new(KnnImputer::new(1, Default::default()));
        pre.fit(&train).unwrap();
        let swapped = Table::new(vec![
            Column::numeric("b", vec![Some(30.0)]),
            Column::numeric("a", vec![Some(3.0)]),
        ])
        .unwrap();
        assert_eq!(pre.transform_table(&swapped).unwrap().row(0), &[3.0, 30.0]);
    }

    #[test]
    fn test_run_imputes_and_appends_target() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig::default();
        let run = RunContext::with_timestamp(dir.path(), "p", "t");
        let ctx = PipelineContext::with_run(config, Credentials::default(), run);

        let train = Table::new(vec![
            Column::numeric("f1", vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            Column::numeric("Result", vec![Some(-1.0), Some(1.0), Some(1.0), Some(-1.0)]),
        ])
        .unwrap();
        let test = Table::new(vec![
            Column::numeric("f1", vec![None, Some(5.0)]),
            Column::numeric("Result", vec![Some(1.0), Some(-1.0)]),
        ])
        .unwrap();
        let train_path = dir.path().join("v/train.csv");
        let test_path = dir.path().join("v/test.csv");
        storage::write_table(&train_path, &train).unwrap();
        storage::write_table(&test_path, &test).unwrap();

        let artifact = DataTransformation::new(&ctx)
            .run(&ValidationArtifact {
                status: true,
                valid_train_path: train_path,
                valid_test_path: test_path,
                invalid_train_path: None,
                invalid_test_path: None,
                drift_report_path: dir.path().join("r.yaml"),
            })
            .unwrap();

        let train = storage::load_array(&artifact.transformed_train_path).unwrap();
        assert_eq!(train.ncols(), 2);
        assert!(!train.has_nan());
        assert_eq!(train.column(1), vec![0.0, 1.0, 1.0, 0.0]);
        let test = storage::load_array(&artifact.transformed_test_path).unwrap();
        assert_eq!(test.column(1), vec![1.0, 0.0]);
        // a row with no observed feature falls back to the column mean
        assert!((test.get(0, 0) - 7.0 / 3.0).abs() < 1e-12);

        let pre: Preprocessor = storage::load_object(&artifact.transformed_object_path).unwrap();
        assert!(pre.is_fitted());
    }
}
