//! Boosted regression training
//!
//! Provides the regression fitter behind the reranker:
//! - Leaf-wise least-squares regression trees
//! - Monotone constraints per feature
//! - Gradient boosting with shrinkage

pub mod gradient_boosting;
pub mod regression_tree;

pub use gradient_boosting::{BoostedEnsemble, BoostingConfig, Scorer};
pub use regression_tree::{RegressionTree, TreeConfig};

use serde::{Deserialize, Serialize};

/// Required direction of the response in one feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Monotonicity {
    #[default]
    None,
    Increasing,
    Decreasing,
}
