//! L2-regularised logistic regression fitted by Newton iterations.

use crate::algorithms::Matrix;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Sorted distinct labels of a target vector.
pub fn unique_labels(y: &[f64]) -> Vec<f64> {
    let mut labels = y.to_vec();
    labels.sort_by(f64::total_cmp);
    labels.dedup();
    labels
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Solve `a * x = b` in place by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Binary logistic regression minimising `0.5 * |w|^2 + C * sum(log_loss)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    coef: Vec<f64>,
    intercept: f64,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 100,
            tol: 1e-6,
            coef: Vec::new(),
            intercept: 0.0,
            classes: Vec::new(),
        }
    }
}

impl LogisticRegression {
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        let classes = unique_labels(y);
        if classes.len() != 2 {
            return Err(PipelineError::model(format!(
                "logistic regression needs exactly 2 classes, got {}",
                classes.len()
            )));
        }
        let n_features = x.ncols();
        let dim = n_features + 1;
        let target: Vec<f64> = y
            .iter()
            .map(|&v| if v == classes[1] { 1.0 } else { 0.0 })
            .collect();

        // params = [w_0 .. w_{d-1}, b]
        let mut params = vec![0.0; dim];
        for _ in 0..self.max_iter {
            let mut grad = vec![0.0; dim];
            let mut hess = vec![vec![0.0; dim]; dim];
            for j in 0..n_features {
                grad[j] = params[j];
                hess[j][j] = 1.0;
            }
            hess[n_features][n_features] = 1e-8;

            for (i, row) in x.rows().enumerate() {
                let z = row.iter().zip(&params).map(|(a, w)| a * w).sum::<f64>()
                    + params[n_features];
                let p = sigmoid(z);
                let g = self.c * (p - target[i]);
                let h = self.c * (p * (1.0 - p)).max(1e-12);
                for j in 0..dim {
                    let xj = if j == n_features { 1.0 } else { row[j] };
                    grad[j] += g * xj;
                    for k in j..dim {
                        let xk = if k == n_features { 1.0 } else { row[k] };
                        hess[j][k] += h * xj * xk;
                    }
                }
            }
            for j in 0..dim {
                for k in 0..j {
                    hess[j][k] = hess[k][j];
                }
            }

            let step = solve(hess, grad).ok_or_else(|| {
                PipelineError::model("logistic regression Hessian is singular")
            })?;
            let mut max_step: f64 = 0.0;
            for (p, s) in params.iter_mut().zip(&step) {
                *p -= s;
                max_step = max_step.max(s.abs());
            }
            if max_step < self.tol {
                break;
            }
        }

        self.intercept = params[n_features];
        params.truncate(n_features);
        self.coef = params;
        self.classes = classes;
        Ok(())
    }

    pub fn decision_function(&self, x: &Matrix) -> Result<Vec<f64>> {
        if self.classes.is_empty() {
            return Err(PipelineError::model("LogisticRegression is not fitted"));
        }
        if x.ncols() != self.coef.len() {
            return Err(PipelineError::model(format!(
                "LogisticRegression expects {} features, got {}",
                self.coef.len(),
                x.ncols()
            )));
        }
        Ok(x.rows()
            .map(|row| row.iter().zip(&self.coef).map(|(a, w)| a * w).sum::<f64>() + self.intercept)
            .collect())
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|z| if z > 0.0 { self.classes[1] } else { self.classes[0] })
            .collect())
    }
}
