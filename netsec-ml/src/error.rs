//! Error types for the netsec-ml crate.

use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Pipeline stage that wrapped an error on its way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingestion,
    Validation,
    Transformation,
    ModelTrainer,
    Lineage,
    Seeding,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "data_ingestion",
            Self::Validation => "data_validation",
            Self::Transformation => "data_transformation",
            Self::ModelTrainer => "model_trainer",
            Self::Lineage => "run_lineage",
            Self::Seeding => "data_seeding",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Document store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("Type validation failed: {0}")]
    TypeValidation(String),

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Error occurred in stage [{stage}] at [{location}] with message: [{source}]")]
    Stage {
        stage: Stage,
        location: &'static Location<'static>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn transformation(msg: impl Into<String>) -> Self {
        Self::Transformation(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn tracking(msg: impl Into<String>) -> Self {
        Self::Tracking(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Wrap this error with the stage it escaped from.
    ///
    /// An error that already carries a stage is returned unchanged so the
    /// innermost location survives.
    #[track_caller]
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                location: Location::caller(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with every stage wrapper peeled off.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage this error escaped from, if it was wrapped.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Attach stage context to a fallible result.
pub trait StageResultExt<T> {
    fn stage(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T, E: Into<PipelineError>> StageResultExt<T> for Result<T, E> {
    #[track_caller]
    fn stage(self, stage: Stage) -> Result<T, PipelineError> {
        match self {
            Ok(value) => Ok(value),
            Err(e) => Err(e.into().in_stage(stage)),
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for PipelineError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl From<bincode::error::DecodeError> for PipelineError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        Self::Tracking(e.to_string())
    }
}

impl From<figment::Error> for PipelineError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failing() -> Result<()> {
        Err(PipelineError::SchemaValidation("missing column: f2".into()))
    }

    #[test]
    fn test_stage_wrap_records_location() {
        let err = failing().stage(Stage::Validation).unwrap_err();
        match &err {
            PipelineError::Stage {
                stage, location, ..
            } => {
                assert_eq!(*stage, Stage::Validation);
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("expected stage wrapper, got {other:?}"),
        }
        assert!(matches!(err.root(), PipelineError::SchemaValidation(_)));
        let msg = err.to_string();
        assert!(msg.contains("data_validation"));
        assert!(msg.contains("missing column: f2"));
    }

    #[test]
    fn test_stage_wrap_is_idempotent() {
        let inner = failing().stage(Stage::Validation).unwrap_err();
        let inner_line = match &inner {
            PipelineError::Stage { location, .. } => location.line(),
            _ => unreachable!(),
        };
        let outer = inner.in_stage(Stage::ModelTrainer);
        assert_eq!(outer.stage(), Some(Stage::Validation));
        match outer {
            PipelineError::Stage { location, .. } => assert_eq!(location.line(), inner_line),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Result<()> = Err(io).stage(Stage::Ingestion);
        assert!(matches!(err.unwrap_err().root(), PipelineError::Io(_)));
    }
}
