//! K-nearest-neighbour imputation of missing (NaN) values.

use crate::algorithms::Matrix;
use crate::algorithms::neighbors::{Weights, k_smallest, nan_euclidean};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Fills each missing cell with the (weighted) mean of that column among the
/// `n_neighbors` nearest fitted rows that have the column present.
///
/// Columns with no observed value in the fitting data are dropped from the
/// transformed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnImputer {
    pub n_neighbors: usize,
    pub weights: Weights,
    fit_x: Option<Matrix>,
    valid_columns: Vec<bool>,
    column_means: Vec<f64>,
}

impl KnnImputer {
    pub fn new(n_neighbors: usize, weights: Weights) -> Self {
        Self {
            n_neighbors,
            weights,
            fit_x: None,
            valid_columns: Vec::new(),
            column_means: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fit_x.is_some()
    }

    /// Number of columns the transform emits.
    pub fn n_features_out(&self) -> usize {
        self.valid_columns.iter().filter(|v| **v).count()
    }

    pub fn fit(&mut self, x: &Matrix) -> Result<()> {
        if self.n_neighbors == 0 {
            return Err(PipelineError::transformation("n_neighbors must be at least 1"));
        }
        if x.nrows() == 0 {
            return Err(PipelineError::transformation(
                "cannot fit the imputer on an empty matrix",
            ));
        }
        let mut valid = Vec::with_capacity(x.ncols());
        let mut means = Vec::with_capacity(x.ncols());
        for c in 0..x.ncols() {
            let present: Vec<f64> = x.column(c).into_iter().filter(|v| !v.is_nan()).collect();
            valid.push(!present.is_empty());
            means.push(if present.is_empty() {
                f64::NAN
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            });
        }
        self.fit_x = Some(x.clone());
        self.valid_columns = valid;
        self.column_means = means;
        Ok(())
    }

    pub fn transform(&self, x: &Matrix) -> Result<Matrix> {
        let fit_x = self
            .fit_x
            .as_ref()
            .ok_or_else(|| PipelineError::transformation("KnnImputer is not fitted"))?;
        if x.ncols() != fit_x.ncols() {
            return Err(PipelineError::transformation(format!(
                "imputer was fitted on {} features, got {}",
                fit_x.ncols(),
                x.ncols()
            )));
        }

        let mut out = x.clone();
        for r in 0..x.nrows() {
            let row = x.row(r);
            let missing: Vec<usize> = (0..x.ncols())
                .filter(|&c| self.valid_columns[c] && row[c].is_nan())
                .collect();
            if missing.is_empty() {
                continue;
            }
            let distances: Vec<f64> = fit_x.rows().map(|f| nan_euclidean(row, f)).collect();

            for c in missing {
                let donors: Vec<usize> = (0..fit_x.nrows())
                    .filter(|&i| !fit_x.get(i, c).is_nan())
                    .collect();
                let donor_dist: Vec<f64> = donors.iter().map(|&i| distances[i]).collect();

                if donor_dist.iter().all(|d| d.is_nan()) {
                    out.set(r, c, self.column_means[c]);
                    continue;
                }

                let k = self.n_neighbors.min(donors.len());
                let nearest = k_smallest(&donor_dist, k);
                let near_dist: Vec<f64> = nearest.iter().map(|&i| donor_dist[i]).collect();
                let weights = self.weights.for_distances(&near_dist);
                let total: f64 = weights.iter().sum();
                let value = if total > 0.0 {
                    nearest
                        .iter()
                        .zip(&weights)
                        .map(|(&i, w)| fit_x.get(donors[i], c) * w)
                        .sum::<f64>()
                        / total
                } else {
                    self.column_means[c]
                };
                out.set(r, c, value);
            }
        }

        let keep: Vec<usize> = (0..x.ncols()).filter(|&c| self.valid_columns[c]).collect();
        if keep.len() == x.ncols() {
            Ok(out)
        } else {
            Ok(out.select_columns(&keep))
        }
    }

    pub fn fit_transform(&mut self, x: &Matrix) -> Result<Matrix> {
        self.fit(x)?;
        self.transform(x)
    }
}
