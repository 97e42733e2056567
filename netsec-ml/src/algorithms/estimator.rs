//! The classifier families the trainer can select from.

use crate::algorithms::Matrix;
use crate::algorithms::ensemble::{
    AdaBoostClassifier, BoostingLoss, GradientBoostingClassifier, RandomForestClassifier,
};
use crate::algorithms::linear::LogisticRegression;
use crate::algorithms::neighbors::{Algorithm, KNeighborsClassifier, Weights};
use crate::algorithms::tree::{Criterion, DecisionTreeClassifier, MaxFeatures, Splitter};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
    None,
}

impl ParamValue {
    pub fn str(s: &str) -> Self {
        Self::Str(s.to_string())
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn as_usize(&self) -> Option<usize> {
        match self {
            Self::Int(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::None => write!(f, "None"),
        }
    }
}

/// One concrete hyperparameter assignment.
pub type Params = BTreeMap<String, ParamValue>;

pub fn format_params(params: &Params) -> String {
    let body: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", body.join(", "))
}

/// Classifier families (sklearn-compatible parameter names).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    KNeighbors(KNeighborsClassifier),
    DecisionTree(DecisionTreeClassifier),
    RandomForest(RandomForestClassifier),
    GradientBoosting(GradientBoostingClassifier),
    AdaBoost(AdaBoostClassifier),
}

fn invalid(model: &str, name: &str, value: &ParamValue) -> PipelineError {
    PipelineError::model(format!("invalid value {value} for parameter {name} of {model}"))
}

impl Estimator {
    pub fn sklearn_class(&self) -> &'static str {
        match self {
            Self::LogisticRegression(_) => "sklearn.linear_model.LogisticRegression",
            Self::KNeighbors(_) => "sklearn.neighbors.KNeighborsClassifier",
            Self::DecisionTree(_) => "sklearn.tree.DecisionTreeClassifier",
            Self::RandomForest(_) => "sklearn.ensemble.RandomForestClassifier",
            Self::GradientBoosting(_) => "sklearn.ensemble.GradientBoostingClassifier",
            Self::AdaBoost(_) => "sklearn.ensemble.AdaBoostClassifier",
        }
    }

    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(PipelineError::model(format!(
                "found {} feature rows and {} targets",
                x.nrows(),
                y.len()
            )));
        }
        match self {
            Self::LogisticRegression(m) => m.fit(x, y),
            Self::KNeighbors(m) => m.fit(x, y),
            Self::DecisionTree(m) => m.fit(x, y),
            Self::RandomForest(m) => m.fit(x, y),
            Self::GradientBoosting(m) => m.fit(x, y),
            Self::AdaBoost(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        match self {
            Self::LogisticRegression(m) => m.predict(x),
            Self::KNeighbors(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::RandomForest(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
            Self::AdaBoost(m) => m.predict(x),
        }
    }

    /// Copy of this estimator with `params` applied.
    pub fn with_params(&self, params: &Params) -> Result<Self> {
        let mut out = self.clone();
        for (name, value) in params {
            out.set_param(name, value)?;
        }
        Ok(out)
    }

    pub fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let class = self.sklearn_class();
        let bad = || invalid(class, name, value);
        match self {
            Self::LogisticRegression(m) => match name {
                "C" => m.c = value.as_f64().ok_or_else(bad)?,
                "max_iter" => m.max_iter = value.as_usize().ok_or_else(bad)?,
                "tol" => m.tol = value.as_f64().ok_or_else(bad)?,
                _ => return Err(unknown(class, name)),
            },
            Self::KNeighbors(m) => match name {
                "n_neighbors" => m.n_neighbors = value.as_usize().ok_or_else(bad)?,
                "weights" => {
                    m.weights = value.as_str().and_then(Weights::parse).ok_or_else(bad)?
                }
                "algorithm" => {
                    m.algorithm = value.as_str().and_then(Algorithm::parse).ok_or_else(bad)?
                }
                _ => return Err(unknown(class, name)),
            },
            Self::DecisionTree(m) => match name {
                "criterion" => m.params.criterion = classification_criterion(value).ok_or_else(bad)?,
                "splitter" => {
                    m.params.splitter = value.as_str().and_then(Splitter::parse).ok_or_else(bad)?
                }
                "max_features" => m.params.max_features = max_features(value).ok_or_else(bad)?,
                "max_depth" => m.params.max_depth = optional_usize(value).ok_or_else(bad)?,
                "random_state" => m.random_state = value.as_usize().ok_or_else(bad)? as u64,
                _ => return Err(unknown(class, name)),
            },
            Self::RandomForest(m) => match name {
                "criterion" => m.criterion = classification_criterion(value).ok_or_else(bad)?,
                "max_features" => m.max_features = max_features(value).ok_or_else(bad)?,
                "n_estimators" => m.n_estimators = value.as_usize().ok_or_else(bad)?,
                "random_state" => m.random_state = value.as_usize().ok_or_else(bad)? as u64,
                _ => return Err(unknown(class, name)),
            },
            Self::GradientBoosting(m) => match name {
                "loss" => m.loss = value.as_str().and_then(BoostingLoss::parse).ok_or_else(bad)?,
                "learning_rate" => m.learning_rate = value.as_f64().ok_or_else(bad)?,
                "subsample" => m.subsample = value.as_f64().ok_or_else(bad)?,
                "criterion" => {
                    m.criterion = value
                        .as_str()
                        .and_then(Criterion::parse)
                        .filter(|c| matches!(c, Criterion::FriedmanMse | Criterion::SquaredError))
                        .ok_or_else(bad)?
                }
                "max_features" => m.max_features = max_features(value).ok_or_else(bad)?,
                "max_depth" => m.max_depth = value.as_usize().ok_or_else(bad)?,
                "n_estimators" => m.n_estimators = value.as_usize().ok_or_else(bad)?,
                "random_state" => m.random_state = value.as_usize().ok_or_else(bad)? as u64,
                _ => return Err(unknown(class, name)),
            },
            Self::AdaBoost(m) => match name {
                "learning_rate" => m.learning_rate = value.as_f64().ok_or_else(bad)?,
                "n_estimators" => m.n_estimators = value.as_usize().ok_or_else(bad)?,
                "random_state" => m.random_state = value.as_usize().ok_or_else(bad)? as u64,
                _ => return Err(unknown(class, name)),
            },
        }
        Ok(())
    }
}

fn unknown(class: &str, name: &str) -> PipelineError {
    PipelineError::model(format!("invalid parameter {name} for estimator {class}"))
}

fn classification_criterion(value: &ParamValue) -> Option<Criterion> {
    value
        .as_str()
        .and_then(Criterion::parse)
        .filter(|c| matches!(c, Criterion::Gini | Criterion::Entropy | Criterion::LogLoss))
}

fn max_features(value: &ParamValue) -> Option<MaxFeatures> {
    match value {
        ParamValue::None => Some(MaxFeatures::All),
        other => other.as_str().and_then(MaxFeatures::parse),
    }
}

fn optional_usize(value: &ParamValue) -> Option<Option<usize>> {
    match value {
        ParamValue::None => Some(None),
        other => other.as_usize().map(Some),
    }
}
