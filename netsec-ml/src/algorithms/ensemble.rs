//! Tree ensembles: bagged forests, gradient boosting and SAMME AdaBoost.

use crate::algorithms::Matrix;
use crate::algorithms::linear::unique_labels;
use crate::algorithms::tree::{
    Criterion, DecisionTreeClassifier, MaxFeatures, Splitter, Tree, TreeParams,
};
use crate::error::{PipelineError, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

/// Label with the largest score; ties go to the earliest label.
fn argmax_label(labels: &[f64], scores: &[f64]) -> f64 {
    let mut best = 0;
    for (k, s) in scores.iter().enumerate() {
        if *s > scores[best] {
            best = k;
        }
    }
    labels[best]
}

fn check_binary(y: &[f64], model: &str) -> Result<Vec<f64>> {
    let labels = unique_labels(y);
    if labels.len() != 2 {
        return Err(PipelineError::model(format!(
            "{model} needs exactly 2 classes, got {}",
            labels.len()
        )));
    }
    Ok(labels)
}

/// Bootstrap-aggregated classification trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    trees: Vec<Tree>,
    labels: Vec<f64>,
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            criterion: Criterion::Gini,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 42,
            trees: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl RandomForestClassifier {
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PipelineError::model("n_estimators must be at least 1"));
        }
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::model("cannot fit a forest on zero samples"));
        }
        let labels = unique_labels(y);
        let params = TreeParams {
            criterion: self.criterion,
            max_features: self.max_features,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let mut weights = vec![0.0; n];
            if self.bootstrap {
                for _ in 0..n {
                    weights[rng.gen_range(0..n)] += 1.0;
                }
            } else {
                weights.fill(1.0);
            }
            let indices: Vec<usize> = (0..n).filter(|&i| weights[i] > 0.0).collect();
            let mut tree_rng = StdRng::seed_from_u64(rng.r#gen());
            trees.push(Tree::grow(x, y, &weights, &indices, &labels, &params, &mut tree_rng)?);
        }
        self.trees = trees;
        self.labels = labels;
        Ok(())
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(PipelineError::model("RandomForestClassifier is not fitted"));
        }
        let votes: Vec<Vec<f64>> = self
            .trees
            .iter()
            .map(|t| t.predict(x))
            .collect::<Result<_>>()?;
        Ok((0..x.nrows())
            .map(|r| {
                let mut counts = vec![0.0; self.labels.len()];
                for tree_votes in &votes {
                    if let Some(k) = self.labels.iter().position(|&l| l == tree_votes[r]) {
                        counts[k] += 1.0;
                    }
                }
                argmax_label(&self.labels, &counts)
            })
            .collect())
    }
}

/// Loss optimised by gradient boosting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostingLoss {
    #[default]
    LogLoss,
    Exponential,
}

impl BoostingLoss {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "log_loss" | "deviance" => Some(Self::LogLoss),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

/// Binary gradient-boosted regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    pub loss: BoostingLoss,
    pub learning_rate: f64,
    pub n_estimators: usize,
    pub subsample: f64,
    pub criterion: Criterion,
    pub max_depth: usize,
    pub max_features: MaxFeatures,
    pub random_state: u64,
    init: f64,
    trees: Vec<Tree>,
    labels: Vec<f64>,
}

impl Default for GradientBoostingClassifier {
    fn default() -> Self {
        Self {
            loss: BoostingLoss::LogLoss,
            learning_rate: 0.1,
            n_estimators: 100,
            subsample: 1.0,
            criterion: Criterion::FriedmanMse,
            max_depth: 3,
            max_features: MaxFeatures::All,
            random_state: 42,
            init: 0.0,
            trees: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl GradientBoostingClassifier {
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if !matches!(self.criterion, Criterion::FriedmanMse | Criterion::SquaredError) {
            return Err(PipelineError::model(format!(
                "gradient boosting criterion must be friedman_mse or squared_error, got {:?}",
                self.criterion
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::model(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        let labels = check_binary(y, "GradientBoostingClassifier")?;
        let n = x.nrows();
        let target: Vec<f64> = y.iter().map(|&v| if v == labels[1] { 1.0 } else { 0.0 }).collect();

        let p = (target.iter().sum::<f64>() / n as f64).clamp(1e-15, 1.0 - 1e-15);
        let log_odds = (p / (1.0 - p)).ln();
        self.init = match self.loss {
            BoostingLoss::LogLoss => log_odds,
            BoostingLoss::Exponential => 0.5 * log_odds,
        };

        let params = TreeParams {
            criterion: self.criterion,
            splitter: Splitter::Best,
            max_features: self.max_features,
            max_depth: Some(self.max_depth),
            ..Default::default()
        };
        let n_inbag = ((self.subsample * n as f64) as usize).max(1);
        let weights = vec![1.0; n];
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut raw = vec![self.init; n];
        let mut trees = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let residual: Vec<f64> = match self.loss {
                BoostingLoss::LogLoss => target
                    .iter()
                    .zip(&raw)
                    .map(|(t, f)| t - sigmoid(*f))
                    .collect(),
                BoostingLoss::Exponential => target
                    .iter()
                    .zip(&raw)
                    .map(|(t, f)| {
                        let s = 2.0 * t - 1.0;
                        s * (-s * f).exp()
                    })
                    .collect(),
            };
            let mut indices: Vec<usize> = if n_inbag < n {
                sample(&mut rng, n, n_inbag).into_vec()
            } else {
                (0..n).collect()
            };
            indices.sort_unstable();

            let mut tree = Tree::grow(x, &residual, &weights, &indices, &[], &params, &mut rng)?;

            // Replace the mean-residual leaves with a one-step Newton estimate.
            let mut num = std::collections::HashMap::<usize, f64>::new();
            let mut den = std::collections::HashMap::<usize, f64>::new();
            for &i in &indices {
                let leaf = tree.apply(x.row(i));
                let (a, b) = match self.loss {
                    BoostingLoss::LogLoss => {
                        let r = residual[i];
                        (r, (target[i] - r) * (1.0 - target[i] + r))
                    }
                    BoostingLoss::Exponential => {
                        let s = 2.0 * target[i] - 1.0;
                        let e = (-s * raw[i]).exp();
                        (s * e, e)
                    }
                };
                *num.entry(leaf).or_default() += a;
                *den.entry(leaf).or_default() += b;
            }
            for leaf in tree.leaves() {
                let d = den.get(&leaf).copied().unwrap_or(0.0);
                let value = if d.abs() < 1e-150 {
                    0.0
                } else {
                    num.get(&leaf).copied().unwrap_or(0.0) / d
                };
                tree.set_leaf_value(leaf, value);
            }

            for (r, f) in raw.iter_mut().enumerate() {
                *f += self.learning_rate * tree.predict_row(x.row(r));
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.labels = labels;
        Ok(())
    }

    pub fn decision_function(&self, x: &Matrix) -> Result<Vec<f64>> {
        if self.labels.is_empty() {
            return Err(PipelineError::model("GradientBoostingClassifier is not fitted"));
        }
        let mut raw = vec![self.init; x.nrows()];
        for tree in &self.trees {
            for (f, v) in raw.iter_mut().zip(tree.predict(x)?) {
                *f += self.learning_rate * v;
            }
        }
        Ok(raw)
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        Ok(self
            .decision_function(x)?
            .into_iter()
            .map(|f| if f > 0.0 { self.labels[1] } else { self.labels[0] })
            .collect())
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// SAMME boosting over depth-one trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostClassifier {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub random_state: u64,
    stumps: Vec<(DecisionTreeClassifier, f64)>,
    labels: Vec<f64>,
}

impl Default for AdaBoostClassifier {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            learning_rate: 1.0,
            random_state: 42,
            stumps: Vec::new(),
            labels: Vec::new(),
        }
    }
}

impl AdaBoostClassifier {
    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if self.learning_rate <= 0.0 {
            return Err(PipelineError::model(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        let labels = unique_labels(y);
        if labels.len() < 2 {
            return Err(PipelineError::model(
                "AdaBoostClassifier needs at least 2 classes",
            ));
        }
        let n = x.nrows();
        let k = labels.len() as f64;
        let mut weights = vec![1.0 / n as f64; n];
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let stump_params = TreeParams {
            max_depth: Some(1),
            ..Default::default()
        };
        let mut stumps = Vec::with_capacity(self.n_estimators);

        for _ in 0..self.n_estimators {
            let mut stump = DecisionTreeClassifier::new(stump_params, self.random_state);
            stump.fit_weighted(x, y, &weights, &mut rng)?;
            let pred = stump.predict(x)?;
            let total: f64 = weights.iter().sum();
            let error: f64 = weights
                .iter()
                .zip(pred.iter().zip(y))
                .filter(|(_, (p, t))| p != t)
                .map(|(w, _)| w)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                stumps.push((stump, 1.0));
                break;
            }
            if error >= 1.0 - 1.0 / k {
                if stumps.is_empty() {
                    return Err(PipelineError::model(
                        "AdaBoost base estimator is no better than chance",
                    ));
                }
                break;
            }

            let alpha = self.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            for (w, (p, t)) in weights.iter_mut().zip(pred.iter().zip(y)) {
                if p != t && *w > 0.0 {
                    *w *= alpha.exp();
                }
            }
            let sum: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= sum);
            stumps.push((stump, alpha));
        }

        self.stumps = stumps;
        self.labels = labels;
        Ok(())
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if self.stumps.is_empty() {
            return Err(PipelineError::model("AdaBoostClassifier is not fitted"));
        }
        let mut scores = vec![vec![0.0; self.labels.len()]; x.nrows()];
        for (stump, alpha) in &self.stumps {
            for (row, p) in scores.iter_mut().zip(stump.predict(x)?) {
                if let Some(k) = self.labels.iter().position(|&l| l == p) {
                    row[k] += alpha;
                }
            }
        }
        Ok(scores
            .iter()
            .map(|s| argmax_label(&self.labels, s))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two noisy clusters separable on the first feature.
    fn clusters(n: usize) -> (Matrix, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(3);
        let mut rows = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let label = (i % 2) as f64;
            let centre = if label == 1.0 { 3.0 } else { -3.0 };
            rows.push(vec![
                centre + rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ]);
            y.push(label);
        }
        (Matrix::from_rows(rows).unwrap(), y)
    }

    fn accuracy(pred: &[f64], y: &[f64]) -> f64 {
        pred.iter().zip(y).filter(|(p, t)| p == t).count() as f64 / y.len() as f64
    }

    #[test]
    fn test_random_forest_learns_clusters() {
        let (x, y) = clusters(60);
        let mut rf = RandomForestClassifier {
            n_estimators: 8,
            ..Default::default()
        };
        rf.fit(&x, &y).unwrap();
        assert!(accuracy(&rf.predict(&x).unwrap(), &y) > 0.95);
    }

    #[test]
    fn test_random_forest_is_deterministic_for_a_seed() {
        let (x, y) = clusters(40);
        let mut a = RandomForestClassifier {
            n_estimators: 4,
            ..Default::default()
        };
        let mut b = a.clone();
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gradient_boosting_both_losses() {
        let (x, y) = clusters(60);
        for loss in [BoostingLoss::LogLoss, BoostingLoss::Exponential] {
            let mut gb = GradientBoostingClassifier {
                loss,
                n_estimators: 16,
                subsample: 0.8,
                ..Default::default()
            };
            gb.fit(&x, &y).unwrap();
            assert!(accuracy(&gb.predict(&x).unwrap(), &y) > 0.95, "{loss:?}");
        }
    }

    #[test]
    fn test_gradient_boosting_rejects_classification_criterion() {
        let (x, y) = clusters(10);
        let mut gb = GradientBoostingClassifier {
            criterion: Criterion::Gini,
            ..Default::default()
        };
        assert!(gb.fit(&x, &y).is_err());
    }

    #[test]
    fn test_adaboost_learns_clusters() {
        let (x, y) = clusters(60);
        let mut ada = AdaBoostClassifier {
            n_estimators: 8,
            ..Default::default()
        };
        ada.fit(&x, &y).unwrap();
        assert!(accuracy(&ada.predict(&x).unwrap(), &y) > 0.95);
    }
}
