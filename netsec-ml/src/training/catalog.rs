//! The classifier families the trainer searches, each with its grid.

use crate::algorithms::ensemble::{
    AdaBoostClassifier, GradientBoostingClassifier, RandomForestClassifier,
};
use crate::algorithms::linear::LogisticRegression;
use crate::algorithms::neighbors::KNeighborsClassifier;
use crate::algorithms::tree::{DecisionTreeClassifier, TreeParams};
use crate::algorithms::{Estimator, ParamGrid, ParamValue};
use crate::config::CatalogKind;

/// One named model family.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub name: String,
    pub estimator: Estimator,
    pub grid: ParamGrid,
}

/// Ordered list of model families. Iteration order is the tie-break order
/// of model selection.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<CatalogEntry>,
}

fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Int).collect()
}

fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Float).collect()
}

fn strs(values: &[&str]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::str).collect()
}

const N_ESTIMATORS: [i64; 6] = [8, 16, 32, 64, 128, 256];
const LEARNING_RATES: [f64; 4] = [0.1, 0.1, 0.5, 0.001];

/// Default estimator of every family, with the randomized ones seeded.
fn base_estimators(seed: u64) -> [(&'static str, Estimator); 6] {
    let mut forest = RandomForestClassifier::default();
    forest.random_state = seed;
    let mut boosting = GradientBoostingClassifier::default();
    boosting.random_state = seed;
    let mut ada = AdaBoostClassifier::default();
    ada.random_state = seed;
    [
        (
            "Logistic Regression",
            Estimator::LogisticRegression(LogisticRegression::default()),
        ),
        (
            "KNeighbors",
            Estimator::KNeighbors(KNeighborsClassifier::default()),
        ),
        (
            "Decision Tree",
            Estimator::DecisionTree(DecisionTreeClassifier::new(TreeParams::default(), seed)),
        ),
        ("Random Forest", Estimator::RandomForest(forest)),
        ("Gradient Boosting", Estimator::GradientBoosting(boosting)),
        ("AdaBoost", Estimator::AdaBoost(ada)),
    ]
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_kind(kind: CatalogKind, seed: u64) -> Self {
        match kind {
            CatalogKind::Standard => Self::standard(seed),
            CatalogKind::Compact => Self::compact(seed),
        }
    }

    /// Every family with its full hyperparameter grid.
    pub fn standard(seed: u64) -> Self {
        let grids = [
            ParamGrid::new(),
            ParamGrid::new()
                .with("n_neighbors", ints(&[3, 5, 7, 9, 11]))
                .with("weights", strs(&["uniform", "distance"]))
                .with("algorithm", strs(&["auto", "ball_tree", "kd_tree", "brute"])),
            ParamGrid::new()
                .with("criterion", strs(&["gini", "entropy", "log_loss"]))
                .with("splitter", strs(&["best", "random"]))
                .with("max_features", strs(&["auto", "sqrt", "log2"])),
            ParamGrid::new()
                .with("criterion", strs(&["gini", "entropy", "log_loss"]))
                .with(
                    "max_features",
                    vec![ParamValue::None, ParamValue::str("sqrt"), ParamValue::str("log2")],
                )
                .with("n_estimators", ints(&N_ESTIMATORS)),
            ParamGrid::new()
                .with("loss", strs(&["log_loss", "exponential"]))
                .with("learning_rate", floats(&LEARNING_RATES))
                .with("subsample", floats(&[0.6, 0.7, 0.75, 0.8, 0.85, 0.9]))
                .with("criterion", strs(&["friedman_mse", "squared_error"]))
                .with("max_features", strs(&["sqrt", "log2"]))
                .with("n_estimators", ints(&N_ESTIMATORS)),
            ParamGrid::new()
                .with("learning_rate", floats(&LEARNING_RATES))
                .with("n_estimators", ints(&N_ESTIMATORS)),
        ];
        Self::from_grids(seed, grids)
    }

    /// Every family with a handful of grid points, for quick runs.
    pub fn compact(seed: u64) -> Self {
        let grids = [
            ParamGrid::new(),
            ParamGrid::new().with("n_neighbors", ints(&[3, 5])),
            ParamGrid::new().with("criterion", strs(&["gini", "entropy"])),
            ParamGrid::new()
                .with("max_features", strs(&["sqrt"]))
                .with("n_estimators", ints(&[8, 16])),
            ParamGrid::new()
                .with("learning_rate", floats(&[0.1]))
                .with("n_estimators", ints(&[8, 16])),
            ParamGrid::new().with("n_estimators", ints(&[8, 16])),
        ];
        Self::from_grids(seed, grids)
    }

    fn from_grids(seed: u64, grids: [ParamGrid; 6]) -> Self {
        let entries = base_estimators(seed)
            .into_iter()
            .zip(grids)
            .map(|((name, estimator), grid)| CatalogEntry {
                name: name.to_string(),
                estimator,
                grid,
            })
            .collect();
        Self { entries }
    }

    /// Append a family; a later entry never displaces an earlier one.
    pub fn push(&mut self, name: impl Into<String>, estimator: Estimator, grid: ParamGrid) {
        self.entries.push(CatalogEntry {
            name: name.into(),
            estimator,
            grid,
        });
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of grid candidates across all families.
    pub fn candidate_count(&self) -> usize {
        self.entries.iter().map(|e| e.grid.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_order() {
        let catalog = ModelCatalog::standard(42);
        assert_eq!(
            catalog.names(),
            vec![
                "Logistic Regression",
                "KNeighbors",
                "Decision Tree",
                "Random Forest",
                "Gradient Boosting",
                "AdaBoost",
            ]
        );
        assert_eq!(ModelCatalog::compact(42).names(), catalog.names());
    }

    #[test]
    fn test_standard_grid_sizes() {
        let catalog = ModelCatalog::standard(42);
        let sizes: Vec<usize> = catalog.entries().iter().map(|e| e.grid.len()).collect();
        assert_eq!(sizes, vec![1, 40, 18, 54, 1152, 24]);
        assert!(catalog.entries()[0].grid.is_empty());
    }

    #[test]
    fn test_every_grid_point_applies() {
        for entry in ModelCatalog::standard(7).entries() {
            for params in entry.grid.expand() {
                assert!(
                    entry.estimator.with_params(&params).is_ok(),
                    "{} rejected {params:?}",
                    entry.name
                );
            }
        }
    }

    #[test]
    fn test_seed_reaches_randomized_families() {
        let catalog = ModelCatalog::from_kind(CatalogKind::Compact, 7);
        let Estimator::RandomForest(rf) = &catalog.entries()[3].estimator else {
            panic!("expected random forest");
        };
        assert_eq!(rf.random_state, 7);
    }
}
