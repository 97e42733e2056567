//! In-process learning algorithms: imputation, classifiers, search, statistics.

pub mod ensemble;
pub mod estimator;
pub mod evaluation;
pub mod grid_search;
pub mod impute;
pub mod ks;
pub mod linear;
pub mod matrix;
pub mod metrics;
pub mod neighbors;
pub mod tree;

pub use estimator::{Estimator, ParamValue, Params};
pub use grid_search::{GridSearchCv, ParamGrid};
pub use impute::KnnImputer;
pub use matrix::Matrix;
pub use neighbors::Weights;
