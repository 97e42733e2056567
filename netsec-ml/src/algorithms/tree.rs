//! CART decision trees for classification and regression.

use crate::algorithms::Matrix;
use crate::algorithms::linear::unique_labels;
use crate::error::{PipelineError, Result};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Split quality measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
    LogLoss,
    SquaredError,
    FriedmanMse,
}

impl Criterion {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "gini" => Some(Self::Gini),
            "entropy" => Some(Self::Entropy),
            "log_loss" => Some(Self::LogLoss),
            "squared_error" => Some(Self::SquaredError),
            "friedman_mse" => Some(Self::FriedmanMse),
            _ => None,
        }
    }

    fn is_classification(&self) -> bool {
        matches!(self, Self::Gini | Self::Entropy | Self::LogLoss)
    }
}

/// How the split threshold is chosen at each node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Splitter {
    #[default]
    Best,
    Random,
}

impl Splitter {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best" => Some(Self::Best),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
}

impl MaxFeatures {
    /// `auto` is the historical classifier alias of `sqrt`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sqrt" | "auto" => Some(Self::Sqrt),
            "log2" => Some(Self::Log2),
            "all" | "none" => Some(Self::All),
            _ => None,
        }
    }

    pub fn count(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            Self::All => n_features,
            Self::Sqrt => n.sqrt().floor() as usize,
            Self::Log2 => n.log2().floor() as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Growth limits and split policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub splitter: Splitter,
    pub max_features: MaxFeatures,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            criterion: Criterion::Gini,
            splitter: Splitter::Best,
            max_features: MaxFeatures::All,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree. Leaves hold a class label (classification) or a mean
/// target value (regression).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
    n_features: usize,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

/// Running weighted statistics of the samples on one side of a split.
#[derive(Clone)]
enum Acc {
    Classes { counts: Vec<f64>, total: f64 },
    Values { w: f64, wy: f64, wyy: f64 },
}

impl Acc {
    fn add(&mut self, class: usize, y: f64, w: f64, sign: f64) {
        match self {
            Self::Classes { counts, total } => {
                counts[class] += sign * w;
                *total += sign * w;
            }
            Self::Values { w: sw, wy, wyy } => {
                *sw += sign * w;
                *wy += sign * w * y;
                *wyy += sign * w * y * y;
            }
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Self::Classes { total, .. } => *total,
            Self::Values { w, .. } => *w,
        }
    }

    fn mean(&self) -> f64 {
        match self {
            Self::Values { w, wy, .. } if *w > 0.0 => wy / w,
            _ => 0.0,
        }
    }

    /// Impurity multiplied by the total weight.
    fn weighted_impurity(&self, criterion: Criterion) -> f64 {
        match self {
            Self::Classes { counts, total } => {
                classification_impurity(criterion, counts, *total) * total
            }
            Self::Values { w, wy, wyy } => {
                if *w <= 0.0 {
                    0.0
                } else {
                    (wyy / w - (wy / w).powi(2)).max(0.0) * w
                }
            }
        }
    }
}

struct Grower<'a> {
    x: &'a Matrix,
    y: &'a [f64],
    weights: &'a [f64],
    params: &'a TreeParams,
    /// Class index per row; empty for regression.
    classes: Vec<usize>,
    /// Class labels for classification; empty for regression.
    labels: &'a [f64],
    rng: &'a mut StdRng,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn empty_acc(&self) -> Acc {
        if self.labels.is_empty() {
            Acc::Values {
                w: 0.0,
                wy: 0.0,
                wyy: 0.0,
            }
        } else {
            Acc::Classes {
                counts: vec![0.0; self.labels.len()],
                total: 0.0,
            }
        }
    }

    fn push(&self, acc: &mut Acc, i: usize, sign: f64) {
        let class = self.classes.get(i).copied().unwrap_or(0);
        acc.add(class, self.y[i], self.weights[i], sign);
    }

    fn acc_of(&self, indices: &[usize]) -> Acc {
        let mut acc = self.empty_acc();
        for &i in indices {
            self.push(&mut acc, i, 1.0);
        }
        acc
    }

    fn leaf_value(&self, acc: &Acc) -> f64 {
        match acc {
            Acc::Classes { counts, .. } => {
                let mut best = 0;
                for (k, c) in counts.iter().enumerate() {
                    if *c > counts[best] {
                        best = k;
                    }
                }
                self.labels[best]
            }
            Acc::Values { .. } => acc.mean(),
        }
    }

    /// Score of a partition; larger is better.
    fn partition_score(&self, left: &Acc, right: &Acc, parent: f64) -> f64 {
        match self.params.criterion {
            Criterion::FriedmanMse => {
                let (wl, wr) = (left.weight(), right.weight());
                if wl + wr <= 0.0 {
                    return f64::NEG_INFINITY;
                }
                wl * wr * (left.mean() - right.mean()).powi(2) / (wl + wr)
            }
            criterion => {
                parent - left.weighted_impurity(criterion) - right.weighted_impurity(criterion)
            }
        }
    }

    fn best_split(&mut self, indices: &[usize], node: &Acc, parent: f64) -> Option<Candidate> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(&mut *self.rng);
        features.truncate(self.params.max_features.count(n_features));

        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<Candidate> = None;
        for feature in features {
            let candidate = match self.params.splitter {
                Splitter::Best => self.best_threshold(indices, feature, node, parent, min_leaf),
                Splitter::Random => self.random_threshold(indices, feature, parent, min_leaf),
            };
            if let Some(c) = candidate {
                if best.as_ref().is_none_or(|b| c.score > b.score) {
                    best = Some(c);
                }
            }
        }
        best
    }

    fn best_threshold(
        &self,
        indices: &[usize],
        feature: usize,
        node: &Acc,
        parent: f64,
        min_leaf: usize,
    ) -> Option<Candidate> {
        let mut sorted = indices.to_vec();
        sorted.sort_by(|&a, &b| self.x.get(a, feature).total_cmp(&self.x.get(b, feature)));

        let mut left = self.empty_acc();
        let mut right = node.clone();
        let mut best: Option<Candidate> = None;
        for pos in 1..sorted.len() {
            self.push(&mut left, sorted[pos - 1], 1.0);
            self.push(&mut right, sorted[pos - 1], -1.0);
            if pos < min_leaf || sorted.len() - pos < min_leaf {
                continue;
            }
            let lo = self.x.get(sorted[pos - 1], feature);
            let hi = self.x.get(sorted[pos], feature);
            if lo >= hi {
                continue;
            }
            let score = self.partition_score(&left, &right, parent);
            if best.as_ref().is_none_or(|b| score > b.score) {
                let mid = lo / 2.0 + hi / 2.0;
                let threshold = if mid >= hi { lo } else { mid };
                best = Some(Candidate {
                    feature,
                    threshold,
                    score,
                });
            }
        }
        best
    }

    fn random_threshold(
        &mut self,
        indices: &[usize],
        feature: usize,
        parent: f64,
        min_leaf: usize,
    ) -> Option<Candidate> {
        let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
        for &i in indices {
            let v = self.x.get(i, feature);
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if !(lo < hi) {
            return None;
        }
        let threshold = self.rng.gen_range(lo..hi);
        let mut left = self.empty_acc();
        let mut right = self.empty_acc();
        let mut n_left = 0;
        for &i in indices {
            if self.x.get(i, feature) <= threshold {
                self.push(&mut left, i, 1.0);
                n_left += 1;
            } else {
                self.push(&mut right, i, 1.0);
            }
        }
        if n_left < min_leaf || indices.len() - n_left < min_leaf {
            return None;
        }
        Some(Candidate {
            feature,
            threshold,
            score: self.partition_score(&left, &right, parent),
        })
    }

    fn grow(&mut self, indices: &[usize], depth: usize) -> usize {
        let node = self.acc_of(indices);
        let value = self.leaf_value(&node);
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        let impurity = node.weighted_impurity(self.params.criterion);
        let depth_reached = self.params.max_depth.is_some_and(|d| depth >= d);
        if depth_reached
            || indices.len() < self.params.min_samples_split.max(2)
            || impurity <= 1e-12
        {
            return id;
        }

        let Some(split) = self.best_split(indices, &node, impurity) else {
            return id;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| self.x.get(i, split.feature) <= split.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }

        let left_id = self.grow(&left, depth + 1);
        let right_id = self.grow(&right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }
}

fn classification_impurity(criterion: Criterion, counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    match criterion {
        Criterion::Gini => 1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>(),
        _ => -counts
            .iter()
            .filter(|c| **c > 0.0)
            .map(|c| {
                let p = c / total;
                p * p.log2()
            })
            .sum::<f64>(),
    }
}

impl Tree {
    /// Grow a tree on the rows in `indices`, weighting row `i` by `weights[i]`.
    ///
    /// `labels` lists the class labels for classification criteria and must be
    /// empty for regression criteria.
    pub fn grow(
        x: &Matrix,
        y: &[f64],
        weights: &[f64],
        indices: &[usize],
        labels: &[f64],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if indices.is_empty() {
            return Err(PipelineError::model("cannot grow a tree on zero samples"));
        }
        if y.len() != x.nrows() || weights.len() != x.nrows() {
            return Err(PipelineError::model(format!(
                "tree inputs disagree: {} rows, {} targets, {} weights",
                x.nrows(),
                y.len(),
                weights.len()
            )));
        }
        if params.criterion.is_classification() == labels.is_empty() {
            return Err(PipelineError::model(format!(
                "criterion {:?} does not match the task",
                params.criterion
            )));
        }
        let classes = if labels.is_empty() {
            Vec::new()
        } else {
            y.iter()
                .map(|v| labels.iter().position(|l| l == v).unwrap_or(0))
                .collect()
        };
        let mut grower = Grower {
            x,
            y,
            weights,
            params,
            classes,
            labels,
            rng,
            nodes: Vec::new(),
        };
        grower.grow(indices, 0);
        Ok(Self {
            nodes: grower.nodes,
            n_features: x.ncols(),
        })
    }

    /// Index of the leaf a row falls into.
    pub fn apply(&self, row: &[f64]) -> usize {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { .. } => return id,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        match &self.nodes[self.apply(row)] {
            Node::Leaf { value } => *value,
            Node::Split { .. } => unreachable!("apply always stops at a leaf"),
        }
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::model(format!(
                "tree expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().map(|row| self.predict_row(row)).collect())
    }

    pub fn set_leaf_value(&mut self, leaf: usize, value: f64) {
        if let Some(Node::Leaf { value: v }) = self.nodes.get_mut(leaf) {
            *v = value;
        }
    }

    pub fn leaves(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Node::Leaf { .. }))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Single CART classification tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTreeClassifier {
    pub params: TreeParams,
    pub random_state: u64,
    tree: Option<Tree>,
}

impl Default for DecisionTreeClassifier {
    fn default() -> Self {
        Self::new(TreeParams::default(), 42)
    }
}

impl DecisionTreeClassifier {
    pub fn new(params: TreeParams, random_state: u64) -> Self {
        Self {
            params,
            random_state,
            tree: None,
        }
    }

    pub fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        let weights = vec![1.0; x.nrows()];
        let mut rng = StdRng::seed_from_u64(self.random_state);
        self.fit_weighted(x, y, &weights, &mut rng)
    }

    pub fn fit_weighted(
        &mut self,
        x: &Matrix,
        y: &[f64],
        weights: &[f64],
        rng: &mut StdRng,
    ) -> Result<()> {
        let labels = unique_labels(y);
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.tree = Some(Tree::grow(x, y, weights, &indices, &labels, &self.params, rng)?);
        Ok(())
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        self.tree
            .as_ref()
            .ok_or_else(|| PipelineError::model("DecisionTreeClassifier is not fitted"))?
            .predict(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_data() -> (Matrix, Vec<f64>) {
        let x = Matrix::from_rows(vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ])
        .unwrap();
        (x, vec![0.0, 1.0, 1.0, 0.0])
    }

    #[test]
    fn test_full_tree_fits_xor() {
        let (x, y) = xor_data();
        let mut tree = DecisionTreeClassifier::default();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let (x, y) = xor_data();
        let params = TreeParams {
            max_depth: Some(1),
            ..Default::default()
        };
        let mut tree = DecisionTreeClassifier::new(params, 0);
        tree.fit(&x, &y).unwrap();
        assert!(tree.tree().unwrap().depth() <= 1);
    }

    #[test]
    fn test_entropy_and_random_splitter_fit_separable_data() {
        let x = Matrix::from_rows((0..20).map(|i| vec![i as f64]).collect()).unwrap();
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 1.0 }).collect();
        for splitter in [Splitter::Best, Splitter::Random] {
            let params = TreeParams {
                criterion: Criterion::Entropy,
                splitter,
                ..Default::default()
            };
            let mut tree = DecisionTreeClassifier::new(params, 7);
            tree.fit(&x, &y).unwrap();
            assert_eq!(tree.predict(&x).unwrap(), y);
        }
    }

    #[test]
    fn test_regression_tree_predicts_means() {
        let x = Matrix::from_rows(vec![vec![0.0], vec![1.0], vec![10.0], vec![11.0]]).unwrap();
        let y = vec![1.0, 3.0, 10.0, 14.0];
        let params = TreeParams {
            criterion: Criterion::SquaredError,
            max_depth: Some(1),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(0);
        let tree = Tree::grow(&x, &y, &[1.0; 4], &[0, 1, 2, 3], &[], &params, &mut rng).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), vec![2.0, 2.0, 12.0, 12.0]);
    }

    #[test]
    fn test_max_features_count() {
        assert_eq!(MaxFeatures::Sqrt.count(30), 5);
        assert_eq!(MaxFeatures::Log2.count(30), 4);
        assert_eq!(MaxFeatures::All.count(30), 30);
        assert_eq!(MaxFeatures::Log2.count(1), 1);
        assert_eq!(MaxFeatures::parse("auto"), Some(MaxFeatures::Sqrt));
    }
}
