//! The persisted model bundle: fitted preprocessor plus selected estimator.

use crate::algorithms::{Estimator, Matrix};
use crate::data::table::Table;
use crate::data::transform::Preprocessor;
use crate::error::{PipelineError, Result};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anything that maps raw feature rows to class labels.
pub trait Predictor {
    fn predict(&self, features: &Matrix) -> Result<Vec<f64>>;
}

impl Predictor for Estimator {
    fn predict(&self, features: &Matrix) -> Result<Vec<f64>> {
        Estimator::predict(self, features)
    }
}

/// `predict(x) = model.predict(preprocessor.transform(x))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkModel {
    pub name: String,
    pub preprocessor: Preprocessor,
    pub model: Estimator,
}

impl NetworkModel {
    pub fn new(name: impl Into<String>, preprocessor: Preprocessor, model: Estimator) -> Result<Self> {
        if !preprocessor.is_fitted() {
            return Err(PipelineError::model("preprocessor is not fitted"));
        }
        Ok(Self {
            name: name.into(),
            preprocessor,
            model,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        storage::load_object(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        storage::save_object(path, self)
    }

    /// Predict on a raw feature table; columns are matched by name.
    pub fn predict_table(&self, features: &Table) -> Result<Vec<f64>> {
        self.model.predict(&self.preprocessor.transform_table(features)?)
    }
}

impl Predictor for NetworkModel {
    fn predict(&self, features: &Matrix) -> Result<Vec<f64>> {
        self.model.predict(&self.preprocessor.transform(features)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::KnnImputer;
    use crate::algorithms::neighbors::KNeighborsClassifier;
    use crate::data::table::Column;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn bundle() -> NetworkModel {
        let features = Table::new(vec![
            Column::numeric("f1", vec![Some(0.0), Some(0.1), Some(5.0), Some(5.1)]),
            Column::numeric("f2", vec![Some(0.0), Some(0.2), Some(5.0), None]),
        ])
        .unwrap();
        let mut pre = Preprocessor::new(KnnImputer::new(2, Default::default()));
        pre.fit(&features).unwrap();
        let x = pre.transform_table(&features).unwrap();
        let mut knn = KNeighborsClassifier::default();
        knn.n_neighbors = 1;
        let mut model = Estimator::KNeighbors(knn);
        model.fit(&x, &[0.0, 0.0, 1.0, 1.0]).unwrap();
        NetworkModel::new("KNeighbors", pre, model).unwrap()
    }

    #[test]
    fn test_predict_imputes_before_classifying() {
        let model = bundle();
        let x = Matrix::from_rows(vec![vec![f64::NAN, 5.0], vec![0.05, f64::NAN]]).unwrap();
        assert_eq!(model.predict(&x).unwrap(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_bundle_roundtrip_preserves_predictions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model/model.bin");
        let model = bundle();
        model.save(&path).unwrap();
        let loaded = NetworkModel::load(&path).unwrap();
        let x = Matrix::from_rows(vec![vec![4.9, 5.2], vec![0.0, 0.1]]).unwrap();
        assert_eq!(loaded.predict(&x).unwrap(), model.predict(&x).unwrap());
        assert_eq!(loaded.name, "KNeighbors");
    }

    #[test]
    fn test_unfitted_preprocessor_is_rejected() {
        let pre = Preprocessor::new(KnnImputer::new(2, Default::default()));
        let model = Estimator::KNeighbors(KNeighborsClassifier::default());
        assert!(NetworkModel::new("x", pre, model).is_err());
    }
}
