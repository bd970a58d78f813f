//! Base multi-label probability model contract
//!
//! The calibration core treats the base classifier as an opaque oracle. It
//! needs four things from it:
//! - per-label marginal probabilities
//! - probabilities of explicit candidate label sets
//! - a truncated joint distribution over label sets
//! - Monte Carlo draws from the joint distribution

mod binary_relevance;

pub use binary_relevance::BinaryRelevanceModel;

use crate::multilabel::{MultiLabel, SupportSet};
use ndarray::ArrayView1;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Probabilistic multi-label classifier consumed by predictors and calibrators
///
/// Implementations must be pure per call: the same input always yields the
/// same probabilities, and sampling only draws from the supplied RNG.
pub trait MultiLabelModel: Send + Sync {
    /// Number of classes `K`
    fn num_classes(&self) -> usize;

    /// Marginal probability of each label, length `K`
    fn predict_class_probs(&self, x: ArrayView1<'_, f64>) -> Vec<f64>;

    /// Probability of each support member, aligned with `support`
    ///
    /// Probabilities below `threshold` are reported as 0.
    fn predict_assignment_probs(
        &self,
        x: ArrayView1<'_, f64>,
        support: &SupportSet,
        threshold: f64,
    ) -> Vec<f64>;

    /// Joint distribution truncated to label sets with probability >= `threshold`
    fn compute_joint(&self, x: ArrayView1<'_, f64>, threshold: f64) -> JointDistribution;

    /// `n` label sets drawn from the joint distribution
    fn samples(
        &self,
        x: ArrayView1<'_, f64>,
        n: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Vec<MultiLabel>;
}

/// A truncated distribution over label sets, sorted by decreasing probability
///
/// Mass below the truncation threshold is dropped, so probabilities need
/// not sum to one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointDistribution {
    entries: Vec<(MultiLabel, f64)>,
}

impl JointDistribution {
    /// Build from arbitrary entries; duplicates keep their first probability
    pub fn new(entries: Vec<(MultiLabel, f64)>) -> Self {
        let mut seen = std::collections::HashSet::with_capacity(entries.len());
        let mut entries: Vec<(MultiLabel, f64)> = entries
            .into_iter()
            .filter(|(set, _)| seen.insert(set.clone()))
            .collect();
        entries.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Probability of a label set (0 when truncated away)
    pub fn prob(&self, set: &MultiLabel) -> f64 {
        self.entries
            .iter()
            .find(|(s, _)| s == set)
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    /// Rank of a label set in decreasing-probability order
    pub fn position(&self, set: &MultiLabel) -> Option<usize> {
        self.entries.iter().position(|(s, _)| s == set)
    }

    /// The `k` most probable label sets
    pub fn top_k(&self, k: usize) -> &[(MultiLabel, f64)] {
        &self.entries[..k.min(self.entries.len())]
    }

    pub fn entries(&self) -> &[(MultiLabel, f64)] {
        &self.entries
    }

    /// Retained probability mass
    pub fn total_mass(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }
}
