//! Nearest-neighbour classification and the shared distance helpers.

use crate::algorithms::Matrix;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Neighbour weighting scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weights {
    #[default]
    Uniform,
    Distance,
}

impl Weights {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uniform" => Some(Self::Uniform),
            "distance" => Some(Self::Distance),
            _ => None,
        }
    }

    /// Weights for a set of neighbour distances. With distance weighting,
    /// exact matches take all the weight.
    pub fn for_distances(&self, distances: &[f64]) -> Vec<f64> {
        match self {
            Self::Uniform => distances
                .iter()
                .map(|d| if d.is_nan() { 0.0 } else { 1.0 })
                .collect(),
            Self::Distance => {
                if distances.iter().any(|&d| d == 0.0) {
                    distances
                        .iter()
                        .map(|&d| if d == 0.0 { 1.0 } else { 0.0 })
                        .collect()
                } else {
                    distances
                        .iter()
                        .map(|&d| if d.is_nan() { 0.0 } else { 1.0 / d })
                        .collect()
                }
            }
        }
    }
}

/// Neighbour search strategy. Every strategy returns the same neighbours;
/// the choice only exists so grids written for tree-backed searches parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    Auto,
    BallTree,
    KdTree,
    Brute,
}

impl Algorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "ball_tree" => Some(Self::BallTree),
            "kd_tree" => Some(Self::KdTree),
            "brute" => Some(Self::Brute),
            _ => None,
        }
    }
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Euclidean distance over the coordinates present in both rows, scaled up
/// by the fraction of coordinates used. NaN when no coordinate is shared.
pub fn nan_euclidean(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b) {
        if x.is_nan() || y.is_nan() {
            continue;
        }
        sum += (x - y) * (x - y);
        present += 1;
    }
    if present == 0 {
        return f64::NAN;
    }
    (sum * a.len() as f64 / present as f64).sqrt()
}

/// Indices of the `k` smallest distances; NaN distances sort last, ties keep index order.
pub fn k_smallest(distances: &[f64], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..distances.len()).collect();
    idx.sort_by(|&a, &b| {
        let (da, db) = (distances[a], distances[b]);
        match (da.is_nan(), db.is_nan()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => da.total_cmp(&db),
        }
    });
    idx.truncate(k);
    idx
}

/// K-nearest-neighbours classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighborsClassifier {
    pub n_neighbors: usize,
    pub weights: Weights,
    pub algorithm: Algorithm,
    fit_x: Option<Matrix>,
    fit_y: Vec<f64>,
}

impl Default for KNeighborsClassifier {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            weights: Weights::Uniform,
            algorithm: Algorithm::Auto,
            fit_x: None,
            fit_y: Vec::new(),
        }
    }
}

impl KNeighborsClassifier {
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if self.n_neighbors == 0 || x.nrows() < self.n_neighbors {
            return Err(PipelineError::model(format!(
                "expected n_neighbors <= n_samples, got {} > {}",
                self.n_neighbors,
                x.nrows()
            )));
        }
        self.fit_x = Some(x.clone());
        self.fit_y = y.to_vec();
        Ok(())
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let fit_x = self
            .fit_x
            .as_ref()
            .ok_or_else(|| PipelineError::model("KNeighborsClassifier is not fitted"))?;
        let mut labels: Vec<f64> = self.fit_y.clone();
        labels.sort_by(f64::total_cmp);
        labels.dedup();

        let mut out = Vec::with_capacity(x.nrows());
        for row in x.rows() {
            let distances: Vec<f64> = fit_x.rows().map(|f| euclidean(row, f)).collect();
            let nearest = k_smallest(&distances, self.n_neighbors);
            let near_dist: Vec<f64> = nearest.iter().map(|&i| distances[i]).collect();
            let weights = self.weights.for_distances(&near_dist);

            let mut best = labels[0];
            let mut best_vote = f64::NEG_INFINITY;
            for &label in &labels {
                let vote: f64 = nearest
                    .iter()
                    .zip(&weights)
                    .filter(|&(&i, _)| self.fit_y[i] == label)
                    .map(|(_, w)| w)
                    .sum();
                if vote > best_vote {
                    best_vote = vote;
                    best = label;
                }
            }
            out.push(best);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nan_euclidean_scales_by_present_fraction() {
        let d = nan_euclidean(&[3.0, f64::NAN, 5.0, f64::NAN], &[1.0, 1.0, 1.0, 1.0]);
        // sqrt(4/2 * (4 + 16))
        assert!((d - 40.0f64.sqrt()).abs() < 1e-12);
        assert!(nan_euclidean(&[f64::NAN], &[1.0]).is_nan());
    }

    #[test]
    fn test_k_smallest_puts_nan_last() {
        assert_eq!(k_smallest(&[f64::NAN, 2.0, 1.0, 2.0], 3), vec![2, 1, 3]);
    }

    #[test]
    fn test_distance_weights_exact_match_dominates() {
        let w = Weights::Distance.for_distances(&[0.0, 2.0]);
        assert_eq!(w, vec![1.0, 0.0]);
        let w = Weights::Distance.for_distances(&[1.0, 4.0]);
        assert_eq!(w, vec![1.0, 0.25]);
    }

    #[test]
    fn test_knn_classifies_clusters() {
        let x = Matrix::from_rows(vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.2],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.2],
        ])
        .unwrap();
        let y = vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut knn = KNeighborsClassifier {
            n_neighbors: 3,
            ..Default::default()
        };
        knn.fit(&x, &y).unwrap();
        let probe = Matrix::from_rows(vec![vec![0.2, 0.1], vec![4.9, 5.1]]).unwrap();
        assert_eq!(knn.predict(&probe).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_knn_rejects_too_many_neighbors() {
        let x = Matrix::from_rows(vec![vec![0.0]]).unwrap();
        let mut knn = KNeighborsClassifier::default();
        assert!(knn.fit(&x, &[0.0]).is_err());
    }
}
