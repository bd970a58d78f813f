//! Least-squares gradient boosting over leaf-wise regression trees
//!
//! Each round fits a tree to the current residuals and adds it, scaled by
//! the shrinkage rate, to the ensemble. With monotone constraints every tree
//! is monotone in the constrained features, so the sum is too.

use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::regression_tree::{RegressionTree, TreeConfig};
use super::Monotonicity;
use crate::dataset::RegressionDataset;
use crate::error::{CalibrateError, Result};

/// Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostingConfig {
    /// Number of boosting rounds (trees)
    pub num_iterations: usize,
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Minimum rows per leaf
    pub min_data_in_leaf: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            num_iterations: 100,
            num_leaves: 10,
            learning_rate: 0.1,
            min_data_in_leaf: 1,
        }
    }
}

impl BoostingConfig {
    pub fn with_num_iterations(mut self, n: usize) -> Self {
        self.num_iterations = n;
        self
    }

    pub fn with_num_leaves(mut self, n: usize) -> Self {
        self.num_leaves = n;
        self
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate;
        self
    }

    pub fn with_min_data_in_leaf(mut self, n: usize) -> Self {
        self.min_data_in_leaf = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_leaves < 2 {
            return Err(CalibrateError::invalid_parameter(
                "num_leaves",
                self.num_leaves,
                "must be at least 2",
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(CalibrateError::invalid_parameter(
                "learning_rate",
                self.learning_rate,
                "must lie in (0, 1]",
            ));
        }
        if self.min_data_in_leaf == 0 {
            return Err(CalibrateError::invalid_parameter(
                "min_data_in_leaf",
                self.min_data_in_leaf,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A fitted real-valued scoring function over feature vectors
pub trait Scorer: Send + Sync {
    /// Raw score of one feature vector
    fn score(&self, features: ArrayView1<'_, f64>) -> Result<f64>;

    /// Number of features expected by `score`
    fn num_features(&self) -> usize;
}

/// Sum of shrunken regression trees on top of a constant baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedEnsemble {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    num_features: usize,
}

impl BoostedEnsemble {
    /// Fit on a regression dataset
    ///
    /// `constraints` is either empty (no constraints) or has one entry per
    /// feature. An empty dataset yields the constant 0 model.
    pub fn fit(
        data: &RegressionDataset,
        constraints: &[Monotonicity],
        config: &BoostingConfig,
    ) -> Result<Self> {
        config.validate()?;
        let num_features = data.num_features();
        if !constraints.is_empty() && constraints.len() != num_features {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} monotone constraints", num_features),
                actual: format!("{} monotone constraints", constraints.len()),
            });
        }

        let n = data.len();
        let x = data.features();
        let y = data.targets();
        let base_score = y.mean().unwrap_or(0.0);

        let mut ensemble = Self {
            base_score,
            learning_rate: config.learning_rate,
            trees: Vec::with_capacity(config.num_iterations),
            num_features,
        };
        if n == 0 {
            return Ok(ensemble);
        }

        let tree_config = TreeConfig {
            num_leaves: config.num_leaves,
            min_data_in_leaf: config.min_data_in_leaf,
        };
        let indices: Vec<usize> = (0..n).collect();
        let mut predictions = Array1::from_elem(n, base_score);

        for iteration in 0..config.num_iterations {
            let residuals: Vec<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(yi, pi)| yi - pi)
                .collect();

            let tree = RegressionTree::fit(x, &residuals, &indices, constraints, &tree_config);
            let updates: Vec<f64> = (0..n)
                .into_par_iter()
                .map(|i| tree.predict(x.row(i)))
                .collect();
            for (p, u) in predictions.iter_mut().zip(&updates) {
                *p += config.learning_rate * u;
            }

            let mse = y
                .iter()
                .zip(predictions.iter())
                .map(|(yi, pi)| (yi - pi).powi(2))
                .sum::<f64>()
                / n as f64;
            debug!(iteration, num_leaves = tree.num_leaves(), mse, "Boosting round");
            ensemble.trees.push(tree);
        }

        info!(
            num_instances = n,
            num_features,
            num_trees = ensemble.trees.len(),
            "Fitted boosted ensemble"
        );
        Ok(ensemble)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Score every row of a dataset
    pub fn predict_dataset(&self, data: &RegressionDataset) -> Result<Array1<f64>> {
        let scores = (0..data.len())
            .into_par_iter()
            .map(|i| self.score(data.row(i)))
            .collect::<Result<Vec<f64>>>()?;
        Ok(Array1::from_vec(scores))
    }
}

impl Scorer for BoostedEnsemble {
    fn score(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        if features.len() != self.num_features {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} features", self.num_features),
                actual: format!("{} features", features.len()),
            });
        }
        Ok(self.base_score
            + self
                .trees
                .iter()
                .map(|t| self.learning_rate * t.predict(features))
                .sum::<f64>())
    }

    fn num_features(&self) -> usize {
        self.num_features
    }
}
