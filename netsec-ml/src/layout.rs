//! Run layout — timestamped artifact root and the fixed per-stage paths under it.
//!
//! Pure path arithmetic; nothing here touches the filesystem.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Timestamp format of run directories (whole-second precision).
pub const TIMESTAMP_FORMAT: &str = "%m-%d-%Y_%H-%M-%S";

pub const TRAIN_FILE_NAME: &str = "train.csv";
pub const TEST_FILE_NAME: &str = "test.csv";

pub const DATA_INGESTION_DIR_NAME: &str = "data_ingestion";
pub const DATA_INGESTION_FEATURE_STORE_DIR_NAME: &str = "feature_store";
pub const DATA_INGESTION_INGESTED_DIR: &str = "ingested";

pub const DATA_VALIDATION_DIR_NAME: &str = "data_validation";
pub const DATA_VALIDATION_VALID_DIR: &str = "validated";
pub const DATA_VALIDATION_INVALID_DIR: &str = "invalid";
pub const DATA_VALIDATION_DRIFT_REPORT_DIR: &str = "drift_report";
pub const DATA_VALIDATION_DRIFT_REPORT_FILE_NAME: &str = "report.yaml";

pub const DATA_TRANSFORMATION_DIR_NAME: &str = "data_transformation";
pub const DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR: &str = "transformed";
pub const DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR: &str = "transformed_object";
pub const TRANSFORMED_TRAIN_FILE_NAME: &str = "train.bin";
pub const TRANSFORMED_TEST_FILE_NAME: &str = "test.bin";
pub const PREPROCESSING_OBJECT_FILE_NAME: &str = "preprocessing.bin";

pub const MODEL_TRAINER_DIR_NAME: &str = "model_trainer";
pub const MODEL_TRAINER_TRAINED_MODEL_DIR: &str = "trained_model";
pub const MODEL_FILE_NAME: &str = "model.bin";

pub const LINEAGE_FILE_NAME: &str = "lineage.json";
pub const TRACKING_FILE_NAME: &str = "tracking.json";

/// Identity of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub pipeline_name: String,
    pub timestamp: String,
    pub artifact_root: PathBuf,
}

impl RunContext {
    /// Run rooted at `{artifacts_dir}/{pipeline_name}_{now}`.
    pub fn new(artifacts_dir: &Path, pipeline_name: &str) -> Self {
        Self::at(artifacts_dir, pipeline_name, Local::now())
    }

    /// Run rooted at an explicit instant.
    pub fn at(artifacts_dir: &Path, pipeline_name: &str, when: DateTime<Local>) -> Self {
        Self::with_timestamp(
            artifacts_dir,
            pipeline_name,
            &when.format(TIMESTAMP_FORMAT).to_string(),
        )
    }

    pub fn with_timestamp(artifacts_dir: &Path, pipeline_name: &str, timestamp: &str) -> Self {
        Self {
            pipeline_name: pipeline_name.to_string(),
            timestamp: timestamp.to_string(),
            artifact_root: artifacts_dir.join(format!("{pipeline_name}_{timestamp}")),
        }
    }

    pub fn ingestion(&self, feature_store_file: &str) -> IngestionPaths {
        let dir = self.artifact_root.join(DATA_INGESTION_DIR_NAME);
        IngestionPaths {
            feature_store_file: dir
                .join(DATA_INGESTION_FEATURE_STORE_DIR_NAME)
                .join(feature_store_file),
            train_file: dir.join(DATA_INGESTION_INGESTED_DIR).join(TRAIN_FILE_NAME),
            test_file: dir.join(DATA_INGESTION_INGESTED_DIR).join(TEST_FILE_NAME),
            dir,
        }
    }

    pub fn validation(&self) -> ValidationPaths {
        let dir = self.artifact_root.join(DATA_VALIDATION_DIR_NAME);
        ValidationPaths {
            valid_train_file: dir.join(DATA_VALIDATION_VALID_DIR).join(TRAIN_FILE_NAME),
            valid_test_file: dir.join(DATA_VALIDATION_VALID_DIR).join(TEST_FILE_NAME),
            invalid_train_file: dir.join(DATA_VALIDATION_INVALID_DIR).join(TRAIN_FILE_NAME),
            invalid_test_file: dir.join(DATA_VALIDATION_INVALID_DIR).join(TEST_FILE_NAME),
            drift_report_file: dir
                .join(DATA_VALIDATION_DRIFT_REPORT_DIR)
                .join(DATA_VALIDATION_DRIFT_REPORT_FILE_NAME),
            dir,
        }
    }

    pub fn transformation(&self) -> TransformationPaths {
        let dir = self.artifact_root.join(DATA_TRANSFORMATION_DIR_NAME);
        let data_dir = dir.join(DATA_TRANSFORMATION_TRANSFORMED_DATA_DIR);
        TransformationPaths {
            transformed_train_file: data_dir.join(TRANSFORMED_TRAIN_FILE_NAME),
            transformed_test_file: data_dir.join(TRANSFORMED_TEST_FILE_NAME),
            transformed_object_file: dir
                .join(DATA_TRANSFORMATION_TRANSFORMED_OBJECT_DIR)
                .join(PREPROCESSING_OBJECT_FILE_NAME),
            dir,
        }
    }

    pub fn model_trainer(&self) -> TrainerPaths {
        let dir = self.artifact_root.join(MODEL_TRAINER_DIR_NAME);
        TrainerPaths {
            trained_model_file: dir.join(MODEL_TRAINER_TRAINED_MODEL_DIR).join(MODEL_FILE_NAME),
            dir,
        }
    }

    pub fn lineage_file(&self) -> PathBuf {
        self.artifact_root.join(LINEAGE_FILE_NAME)
    }

    pub fn tracking_file(&self) -> PathBuf {
        self.artifact_root.join(TRACKING_FILE_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionPaths {
    pub dir: PathBuf,
    pub feature_store_file: PathBuf,
    pub train_file: PathBuf,
    pub test_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPaths {
    pub dir: PathBuf,
    pub valid_train_file: PathBuf,
    pub valid_test_file: PathBuf,
    pub invalid_train_file: PathBuf,
    pub invalid_test_file: PathBuf,
    pub drift_report_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformationPaths {
    pub dir: PathBuf,
    pub transformed_train_file: PathBuf,
    pub transformed_test_file: PathBuf,
    pub transformed_object_file: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerPaths {
    pub dir: PathBuf,
    pub trained_model_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_run() -> RunContext {
        let when = Local.with_ymd_and_hms(2025, 3, 7, 14, 5, 9).unwrap();
        RunContext::at(Path::new("artifacts"), "network_security_pipeline", when)
    }

    #[test]
    fn test_artifact_root_uses_second_precision_timestamp() {
        let run = fixed_run();
        assert_eq!(run.timestamp, "03-07-2025_14-05-09");
        assert_eq!(
            run.artifact_root,
            PathBuf::from("artifacts/network_security_pipeline_03-07-2025_14-05-09")
        );
    }

    #[test]
    fn test_stage_paths_are_rooted_under_artifact_root() {
        let run = fixed_run();
        let ingestion = run.ingestion("phisingData.csv");
        assert_eq!(
            ingestion.feature_store_file,
            run.artifact_root
                .join("data_ingestion/feature_store/phisingData.csv")
        );
        assert_eq!(
            ingestion.train_file,
            run.artifact_root.join("data_ingestion/ingested/train.csv")
        );
        let validation = run.validation();
        assert_eq!(
            validation.drift_report_file,
            run.artifact_root
                .join("data_validation/drift_report/report.yaml")
        );
        let transformation = run.transformation();
        assert!(
            transformation
                .transformed_object_file
                .starts_with(&run.artifact_root)
        );
        assert_eq!(
            run.model_trainer().trained_model_file,
            run.artifact_root.join("model_trainer/trained_model/model.bin")
        );
    }

    #[test]
    fn test_same_second_runs_collide() {
        let a = fixed_run();
        let b = fixed_run();
        assert_eq!(a.artifact_root, b.artifact_root);
    }
}
