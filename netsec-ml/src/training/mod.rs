//! Model selection, experiment tracking and the persisted model bundle.

pub mod bundle;
pub mod catalog;
pub mod tracking;
pub mod trainer;

pub use bundle::{NetworkModel, Predictor};
pub use catalog::{CatalogEntry, ModelCatalog};
pub use tracking::{ExperimentTracker, FileTracker, MlflowTracker, NoopTracker, tracker_from_config};
pub use trainer::{ModelEvaluation, ModelTrainer, score_report, select_best};
