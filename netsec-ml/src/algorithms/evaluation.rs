//! Cross-validation folds and fold-score summaries.

use crate::error::{PipelineError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Cross-validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidation {
    pub n_folds: usize,
    pub stratified: bool,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            n_folds: 3,
            stratified: true,
            shuffle: false,
            random_state: None,
        }
    }
}

/// Row indices of one fold: `(train, test)`.
pub type Fold = (Vec<usize>, Vec<usize>);

impl CrossValidation {
    pub fn new(n_folds: usize) -> Self {
        Self {
            n_folds,
            ..Default::default()
        }
    }

    /// Partition `0..y.len()` into train/test folds. Every row lands in
    /// exactly one test fold.
    pub fn split(&self, y: &[f64]) -> Result<Vec<Fold>> {
        let n = y.len();
        if self.n_folds < 2 {
            return Err(PipelineError::model(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.n_folds
            )));
        }
        if self.n_folds > n {
            return Err(PipelineError::model(format!(
                "cannot split {n} samples into {} folds",
                self.n_folds
            )));
        }
        let assignment = if self.stratified {
            self.stratified_assignment(y)?
        } else {
            self.plain_assignment(n)
        };
        Ok((0..self.n_folds)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) =
                    (0..n).partition(|&i| assignment[i] == fold);
                (train, test)
            })
            .collect())
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.random_state.unwrap_or(0))
    }

    fn plain_assignment(&self, n: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng());
        }
        let mut assignment = vec![0; n];
        let (base, extra) = (n / self.n_folds, n % self.n_folds);
        let mut pos = 0;
        for fold in 0..self.n_folds {
            let size = base + usize::from(fold < extra);
            for &i in &order[pos..pos + size] {
                assignment[i] = fold;
            }
            pos += size;
        }
        assignment
    }

    /// Classes are ordered by first appearance; the sorted class sequence is
    /// dealt round-robin into folds, and each class's rows take its fold
    /// quota in row order.
    fn stratified_assignment(&self, y: &[f64]) -> Result<Vec<usize>> {
        let mut classes: Vec<f64> = Vec::new();
        let encoded: Vec<usize> = y
            .iter()
            .map(|v| match classes.iter().position(|c| c == v) {
                Some(k) => k,
                None => {
                    classes.push(*v);
                    classes.len() - 1
                }
            })
            .collect();
        let mut counts = vec![0usize; classes.len()];
        for &k in &encoded {
            counts[k] += 1;
        }
        if counts.iter().all(|&c| self.n_folds > c) {
            return Err(PipelineError::model(format!(
                "n_folds={} cannot be greater than the number of members in each class",
                self.n_folds
            )));
        }
        if counts.iter().any(|&c| self.n_folds > c) {
            warn!(
                n_folds = self.n_folds,
                "the least populated class has fewer members than n_folds"
            );
        }

        let mut sorted = encoded.clone();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; classes.len()]; self.n_folds];
        for (pos, &k) in sorted.iter().enumerate() {
            allocation[pos % self.n_folds][k] += 1;
        }

        let mut rng = self.rng();
        let mut assignment = vec![0; y.len()];
        for k in 0..classes.len() {
            let mut folds_for_class: Vec<usize> = (0..self.n_folds)
                .flat_map(|fold| std::iter::repeat_n(fold, allocation[fold][k]))
                .collect();
            if self.shuffle {
                folds_for_class.shuffle(&mut rng);
            }
            let rows = encoded.iter().enumerate().filter(|&(_, &c)| c == k).map(|(i, _)| i);
            for (row, fold) in rows.zip(folds_for_class) {
                assignment[row] = fold;
            }
        }
        Ok(assignment)
    }
}

/// Cross-validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stratified_folds_keep_class_balance() {
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0, 0.0];
        let folds = CrossValidation::new(3).split(&y).unwrap();
        assert_eq!(folds.len(), 3);
        let mut seen = Vec::new();
        for (train, test) in &folds {
            assert_eq!(train.len() + test.len(), y.len());
            let ones = test.iter().filter(|&&i| y[i] == 1.0).count();
            assert!((1..=2).contains(&ones));
            seen.extend(test.iter().copied());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..y.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_stratified_assignment_matches_row_order() {
        let y = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let folds = CrossValidation::new(3).split(&y).unwrap();
        assert_eq!(folds[0].1, vec![0, 1]);
        assert_eq!(folds[1].1, vec![2, 3]);
        assert_eq!(folds[2].1, vec![4, 5]);
    }

    #[test]
    fn test_plain_folds_are_contiguous() {
        let cv = CrossValidation {
            stratified: false,
            ..CrossValidation::new(3)
        };
        let folds = cv.split(&[0.0; 7]).unwrap();
        assert_eq!(folds[0].1, vec![0, 1, 2]);
        assert_eq!(folds[1].1, vec![3, 4]);
        assert_eq!(folds[2].1, vec![5, 6]);
    }

    #[test]
    fn test_too_many_folds_rejected() {
        assert!(CrossValidation::new(3).split(&[0.0, 1.0]).is_err());
        assert!(CrossValidation::new(3).split(&[0.0, 1.0, 0.0, 1.0]).is_err());
        assert!(CrossValidation::new(1).split(&[0.0, 1.0]).is_err());
    }

    #[test]
    fn test_result_summary() {
        let r = CrossValidationResult::from_scores(vec![0.5, 1.0], "accuracy");
        assert_eq!(r.mean_score, 0.75);
        assert_eq!(r.std_score, 0.25);
    }
}
