//! Data validation: schema conformance, numeric typing and train/test drift.

use crate::algorithms::ks::ks_2samp;
use crate::artifact::{IngestionArtifact, ValidationArtifact};
use crate::context::PipelineContext;
use crate::data::schema::Schema;
use crate::data::table::Table;
use crate::error::{PipelineError, Result, Stage, StageResultExt};
use crate::layout::ValidationPaths;
use crate::storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Drift verdict for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrift {
    pub p_value: f64,
    pub same_distribution: bool,
}

/// Column name -> drift verdict, as written to the drift report.
pub type DriftReport = BTreeMap<String, ColumnDrift>;

pub struct DataValidation<'a> {
    ctx: &'a PipelineContext,
    schema: Schema,
    paths: ValidationPaths,
}

impl<'a> DataValidation<'a> {
    /// Validation against the schema file named in the configuration.
    pub fn new(ctx: &'a PipelineContext) -> Result<Self> {
        let schema = Schema::load(&ctx.config.validation.schema_path)
            .stage(Stage::Validation)?;
        Ok(Self::with_schema(ctx, schema))
    }

    pub fn with_schema(ctx: &'a PipelineContext, schema: Schema) -> Self {
        Self {
            ctx,
            schema,
            paths: ctx.run.validation(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// True when the table has exactly as many columns as the schema and
    /// every schema column among them.
    pub fn validate_columns(&self, table: &Table) -> bool {
        let expected = self.schema.columns.len();
        info!(
            required = expected,
            actual = table.n_cols(),
            "checking column count"
        );
        let missing: Vec<&str> = self
            .schema
            .columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        for column in &missing {
            warn!(column, "required column is missing");
        }
        missing.is_empty() && table.n_cols() == expected
    }

    /// True when every declared numeric column exists and holds numbers.
    pub fn validate_numeric_types(&self, table: &Table) -> bool {
        let mut ok = true;
        for name in &self.schema.numeric_features {
            match table.column(name) {
                None => {
                    warn!(column = %name, "numeric column is missing");
                    ok = false;
                }
                Some(col) if !col.is_numeric() => {
                    warn!(column = %name, "column is not numeric");
                    ok = false;
                }
                Some(_) => {}
            }
        }
        ok
    }

    /// Compare every shared numeric column with a two-sample KS test and
    /// write the per-column report. True when no column drifted.
    pub fn detect_drift(&self, base: &Table, current: &Table, threshold: f64) -> Result<bool> {
        let mut report = DriftReport::new();
        for column in base.columns() {
            let Some(other) = current.column(&column.name) else {
                continue;
            };
            let (Some(a), Some(b)) = (column.present_numeric(), other.present_numeric()) else {
                warn!(column = %column.name, "skipping drift check on non-numeric column");
                continue;
            };
            let Some(result) = ks_2samp(&a, &b) else {
                warn!(column = %column.name, "skipping drift check on empty column");
                continue;
            };
            let same_distribution = result.pvalue >= threshold;
            debug!(
                column = %column.name,
                statistic = result.statistic,
                p_value = result.pvalue,
                same_distribution,
                "drift checked"
            );
            report.insert(
                column.name.clone(),
                ColumnDrift {
                    p_value: result.pvalue,
                    same_distribution,
                },
            );
        }

        let status = report.values().all(|d| d.same_distribution);
        storage::write_structured_config(&self.paths.drift_report_file, &report, true)?;
        info!(
            path = %self.paths.drift_report_file.display(),
            columns = report.len(),
            status,
            "wrote drift report"
        );
        Ok(status)
    }

    pub fn run(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact> {
        let _span = self.ctx.stage_span(Stage::Validation).entered();
        self.run_inner(ingestion).stage(Stage::Validation)
    }

    fn run_inner(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact> {
        let train = storage::read_table(&ingestion.train_path)?;
        let test = storage::read_table(&ingestion.test_path)?;

        if !self.validate_columns(&train) {
            return Err(PipelineError::SchemaValidation(
                "train dataframe does not contain all columns".to_string(),
            ));
        }
        if !self.validate_columns(&test) {
            return Err(PipelineError::SchemaValidation(
                "test dataframe does not contain all columns".to_string(),
            ));
        }
        if !self.validate_numeric_types(&train) {
            return Err(PipelineError::TypeValidation(
                "train dataframe has non-numeric values in numeric columns".to_string(),
            ));
        }
        if !self.validate_numeric_types(&test) {
            return Err(PipelineError::TypeValidation(
                "test dataframe has non-numeric values in numeric columns".to_string(),
            ));
        }

        let status = self.detect_drift(&train, &test, self.ctx.config.validation.drift_threshold)?;
        if !status {
            warn!("drift detected between train and test splits; continuing");
        }

        storage::write_table(&self.paths.valid_train_file, &train)?;
        storage::write_table(&self.paths.valid_test_file, &test)?;

        Ok(ValidationArtifact {
            status,
            valid_train_path: self.paths.valid_train_file.clone(),
            valid_test_path: self.paths.valid_test_file.clone(),
            invalid_train_path: None,
            invalid_test_path: None,
            drift_report_path: self.paths.drift_report_file.clone(),
        })
    }
}
