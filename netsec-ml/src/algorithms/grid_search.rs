//! Exhaustive cross-validated hyperparameter search.

use crate::algorithms::Matrix;
use crate::algorithms::estimator::{Estimator, ParamValue, Params, format_params};
use crate::algorithms::evaluation::{CrossValidation, CrossValidationResult};
use crate::algorithms::metrics::accuracy_score;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Candidate values per parameter name. Keys iterate in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, values: Vec<ParamValue>) -> Self {
        self.params.insert(name.to_string(), values);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of assignments `expand` yields.
    pub fn len(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    /// Cartesian product of the grid; the first key varies slowest. An empty
    /// grid yields a single empty assignment.
    pub fn expand(&self) -> Vec<Params> {
        let mut configs = vec![Params::new()];
        for (key, values) in &self.params {
            let mut new_configs = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    let mut c = config.clone();
                    c.insert(key.clone(), value.clone());
                    new_configs.push(c);
                }
            }
            configs = new_configs;
        }
        configs
    }
}

/// Outcome of a search: every candidate's fold scores plus the winner.
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub candidates: Vec<(Params, CrossValidationResult)>,
    pub best_index: usize,
    pub best_estimator: Estimator,
}

impl GridSearchResult {
    pub fn best_params(&self) -> &Params {
        &self.candidates[self.best_index].0
    }

    pub fn best_score(&self) -> f64 {
        self.candidates[self.best_index].1.mean_score
    }
}

pub struct GridSearchCv {
    pub estimator: Estimator,
    pub grid: ParamGrid,
    pub cv: CrossValidation,
}

impl GridSearchCv {
    pub fn new(estimator: Estimator, grid: ParamGrid, cv: CrossValidation) -> Self {
        Self { estimator, grid, cv }
    }

    /// Score every candidate by mean fold accuracy, then refit the best one
    /// (first on ties) on all of `x`. A candidate whose fit fails scores NaN.
    pub fn fit(&self, x: &Matrix, y: &[f64]) -> Result<GridSearchResult> {
        let folds = self.cv.split(y)?;
        let mut candidates = Vec::new();
        for params in self.grid.expand() {
            let estimator = self.estimator.with_params(&params)?;
            let mut scores = Vec::with_capacity(folds.len());
            for (train, test) in &folds {
                let mut model = estimator.clone();
                let y_train: Vec<f64> = train.iter().map(|&i| y[i]).collect();
                let y_test: Vec<f64> = test.iter().map(|&i| y[i]).collect();
                let score = model
                    .fit(&x.select_rows(train), &y_train)
                    .and_then(|()| model.predict(&x.select_rows(test)))
                    .and_then(|pred| accuracy_score(&y_test, &pred));
                match score {
                    Ok(s) => scores.push(s),
                    Err(e) => {
                        warn!(params = %format_params(&params), error = %e, "candidate fit failed");
                        scores.push(f64::NAN);
                    }
                }
            }
            let result = CrossValidationResult::from_scores(scores, "accuracy");
            debug!(
                estimator = self.estimator.sklearn_class(),
                params = %format_params(&params),
                mean = result.mean_score,
                "grid candidate scored"
            );
            candidates.push((params, result));
        }

        let mut best_index: Option<usize> = None;
        for (i, (_, r)) in candidates.iter().enumerate() {
            if r.mean_score.is_nan() {
                continue;
            }
            if best_index.is_none_or(|b| r.mean_score > candidates[b].1.mean_score) {
                best_index = Some(i);
            }
        }
        let best_index = best_index.ok_or_else(|| {
            PipelineError::model(format!(
                "every grid candidate failed for {}",
                self.estimator.sklearn_class()
            ))
        })?;

        let mut best_estimator = self.estimator.with_params(&candidates[best_index].0)?;
        best_estimator.fit(x, y)?;
        Ok(GridSearchResult {
            candidates,
            best_index,
            best_estimator,
        })
    }
}
