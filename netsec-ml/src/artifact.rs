//! Typed artifacts handed from one stage to the next.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of data ingestion: the two split files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

/// Output of data validation.
///
/// `status` is false when drift was detected in any column. Downstream stages
/// do not branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub status: bool,
    pub valid_train_path: PathBuf,
    pub valid_test_path: PathBuf,
    pub invalid_train_path: Option<PathBuf>,
    pub invalid_test_path: Option<PathBuf>,
    pub drift_report_path: PathBuf,
}

/// Output of data transformation: dense arrays whose last column is the
/// target, plus the fitted preprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub transformed_object_path: PathBuf,
}

/// Binary classification scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Terminal artifact: the persisted {preprocessor, model} bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub trained_model_path: PathBuf,
    pub best_model_name: String,
    pub best_model_score: f64,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: ClassificationMetrics,
}
