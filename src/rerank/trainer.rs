//! Fitting a reranker on vectorized candidates

use super::Reranker;
use crate::dataset::RegressionDataset;
use crate::error::{CalibrateError, Result};
use crate::model::MultiLabelModel;
use crate::training::{BoostedEnsemble, BoostingConfig};
use crate::vectorizer::PredictionVectorizer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Reranker training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Maximum leaves per tree
    pub num_leaves: usize,
    /// Boosting rounds
    pub num_iterations: usize,
    /// Constrain trees by the vectorizer's monotonicity
    pub monotonic: bool,
    /// Joint candidates scored per prediction
    pub num_candidates: usize,
    /// Learning rate of each tree
    pub shrinkage: f64,
    pub min_data_in_leaf: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            num_leaves: 10,
            num_iterations: 100,
            monotonic: true,
            num_candidates: 50,
            shrinkage: 0.1,
            min_data_in_leaf: 1,
        }
    }
}

impl RerankerConfig {
    pub fn with_num_leaves(mut self, n: usize) -> Self {
        self.num_leaves = n;
        self
    }

    pub fn with_num_iterations(mut self, n: usize) -> Self {
        self.num_iterations = n;
        self
    }

    pub fn with_monotonic(mut self, monotonic: bool) -> Self {
        self.monotonic = monotonic;
        self
    }

    pub fn with_num_candidates(mut self, n: usize) -> Self {
        self.num_candidates = n;
        self
    }

    pub fn with_shrinkage(mut self, shrinkage: f64) -> Self {
        self.shrinkage = shrinkage;
        self
    }

    pub fn with_min_data_in_leaf(mut self, n: usize) -> Self {
        self.min_data_in_leaf = n;
        self
    }

    fn boosting(&self) -> BoostingConfig {
        BoostingConfig::default()
            .with_num_iterations(self.num_iterations)
            .with_num_leaves(self.num_leaves)
            .with_learning_rate(self.shrinkage)
            .with_min_data_in_leaf(self.min_data_in_leaf)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_candidates == 0 {
            return Err(CalibrateError::invalid_parameter(
                "num_candidates",
                self.num_candidates,
                "must be at least 1",
            ));
        }
        self.boosting().validate()
    }
}

/// Trains [`Reranker`]s with a fixed configuration
#[derive(Debug, Clone)]
pub struct RerankerTrainer {
    config: RerankerConfig,
}

impl RerankerTrainer {
    pub fn new(config: RerankerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RerankerConfig {
        &self.config
    }

    /// Fit the boosted scorer on `data`, which must be laid out by `vectorizer`
    pub fn train<M: MultiLabelModel>(
        &self,
        data: &RegressionDataset,
        model: Arc<M>,
        vectorizer: PredictionVectorizer,
    ) -> Result<Reranker<M>> {
        if data.num_features() != vectorizer.num_features() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} features", vectorizer.num_features()),
                actual: format!("{} features", data.num_features()),
            });
        }

        let positives = data.targets().iter().filter(|&&t| t > 0.5).count();
        if positives == 0 || positives == data.len() {
            warn!(
                num_instances = data.len(),
                positives, "Single-class reranker training data, fitting a constant scorer"
            );
        }

        let constraints = if self.config.monotonic {
            vectorizer.monotonicity_constraints(model.num_classes())?
        } else {
            Vec::new()
        };
        let ensemble = BoostedEnsemble::fit(data, &constraints, &self.config.boosting())?;

        info!(
            num_instances = data.len(),
            num_trees = ensemble.num_trees(),
            monotonic = self.config.monotonic,
            num_candidates = self.config.num_candidates,
            "Trained reranker"
        );
        Ok(Reranker::new(ensemble, model, self.config.num_candidates, vectorizer))
    }
}
