//! Independent logistic (binary relevance) base model

use super::{JointDistribution, MultiLabelModel};
use crate::error::{CalibrateError, Result};
use crate::multilabel::{MultiLabel, SupportSet};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::warn;

/// One logistic model per label, labels independent given `x`
///
/// `P(k | x) = sigmoid(w_k · x + b_k)`. The joint probability of a label set
/// is the product of per-label agreement probabilities, and the truncated
/// joint is enumerated best-first without visiting all `2^K` sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryRelevanceModel {
    /// `K x d` weight matrix
    weights: Array2<f64>,
    /// Per-label intercepts
    bias: Array1<f64>,
    /// Upper bound on label sets returned by `compute_joint`
    max_joint_entries: usize,
}

impl BinaryRelevanceModel {
    pub fn new(weights: Array2<f64>, bias: Array1<f64>) -> Result<Self> {
        if weights.nrows() != bias.len() {
            return Err(CalibrateError::ShapeError {
                expected: format!("bias length = {}", weights.nrows()),
                actual: format!("bias length = {}", bias.len()),
            });
        }
        if weights.nrows() == 0 {
            return Err(CalibrateError::ConfigError(
                "model needs at least one class".to_string(),
            ));
        }
        Ok(Self {
            weights,
            bias,
            max_joint_entries: 4096,
        })
    }

    /// Limit the number of label sets enumerated by `compute_joint`
    pub fn with_max_joint_entries(mut self, max_entries: usize) -> Self {
        self.max_joint_entries = max_entries.max(1);
        self
    }

    /// Feature width `d` the weights expect
    pub fn num_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Per-label marginals, rejecting inputs of the wrong width
    pub fn try_marginals(&self, x: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        if x.len() != self.num_features() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} features", self.num_features()),
                actual: format!("{} features", x.len()),
            });
        }
        Ok(self
            .weights
            .rows()
            .into_iter()
            .zip(self.bias.iter())
            .map(|(w, &b)| sigmoid(w.dot(&x) + b))
            .collect())
    }

    /// Marginals for the infallible model contract
    ///
    /// An input of the wrong width carries no usable evidence, so each label
    /// falls back to its intercept-only probability.
    fn marginals(&self, x: ArrayView1<'_, f64>) -> Vec<f64> {
        self.try_marginals(x).unwrap_or_else(|err| {
            warn!(error = %err, "Feature width mismatch, using intercept-only marginals");
            self.bias.iter().map(|&b| sigmoid(b)).collect()
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn set_probability(marginals: &[f64], set: &MultiLabel) -> f64 {
    marginals
        .iter()
        .enumerate()
        .map(|(k, &p)| if set.matches(k) { p } else { 1.0 - p })
        .product()
}

/// Pending node of the best-first subset enumeration
struct Flip {
    prob: f64,
    /// Positions (into the flip order) flipped away from the mode; last is largest
    flips: Vec<usize>,
}

impl PartialEq for Flip {
    fn eq(&self, other: &Self) -> bool {
        self.prob == other.prob
    }
}
impl Eq for Flip {}
impl PartialOrd for Flip {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Flip {
    fn cmp(&self, other: &Self) -> Ordering {
        self.prob.partial_cmp(&other.prob).unwrap_or(Ordering::Equal)
    }
}

impl MultiLabelModel for BinaryRelevanceModel {
    fn num_classes(&self) -> usize {
        self.bias.len()
    }

    fn predict_class_probs(&self, x: ArrayView1<'_, f64>) -> Vec<f64> {
        self.marginals(x)
    }

    fn predict_assignment_probs(
        &self,
        x: ArrayView1<'_, f64>,
        support: &SupportSet,
        threshold: f64,
    ) -> Vec<f64> {
        let marginals = self.marginals(x);
        support
            .iter()
            .map(|set| {
                let p = set_probability(&marginals, set);
                if p < threshold {
                    0.0
                } else {
                    p
                }
            })
            .collect()
    }

    fn compute_joint(&self, x: ArrayView1<'_, f64>, threshold: f64) -> JointDistribution {
        let marginals = self.marginals(x);
        let mode: Vec<bool> = marginals.iter().map(|&p| p >= 0.5).collect();
        let mode_prob: f64 = marginals.iter().map(|&p| p.max(1.0 - p)).product();

        // Flipping label k away from the mode multiplies the probability by ratio_k <= 1
        let mut order: Vec<(usize, f64)> = marginals
            .iter()
            .enumerate()
            .map(|(k, &p)| (k, p.min(1.0 - p) / p.max(1.0 - p)))
            .collect();
        order.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

        let to_set = |flips: &[usize]| -> MultiLabel {
            let mut member = mode.clone();
            for &f in flips {
                let k = order[f].0;
                member[k] = !member[k];
            }
            member
                .iter()
                .enumerate()
                .filter(|(_, &m)| m)
                .map(|(k, _)| k)
                .collect()
        };
        let prob_of = |flips: &[usize]| -> f64 {
            flips.iter().fold(mode_prob, |acc, &f| acc * order[f].1)
        };

        let mut entries = Vec::new();
        let mut heap = BinaryHeap::new();
        heap.push(Flip {
            prob: mode_prob,
            flips: Vec::new(),
        });

        while let Some(node) = heap.pop() {
            if node.prob < threshold || node.prob <= 0.0 || entries.len() >= self.max_joint_entries {
                break;
            }
            entries.push((to_set(&node.flips), node.prob));

            let next = node.flips.last().map_or(0, |&j| j + 1);
            if next < order.len() {
                let mut extended = node.flips.clone();
                extended.push(next);
                heap.push(Flip {
                    prob: prob_of(&extended),
                    flips: extended,
                });

                if let Some(last) = node.flips.last().copied() {
                    let mut shifted = node.flips;
                    let end = shifted.len() - 1;
                    shifted[end] = last + 1;
                    heap.push(Flip {
                        prob: prob_of(&shifted),
                        flips: shifted,
                    });
                }
            }
        }

        JointDistribution::new(entries)
    }

    fn samples(
        &self,
        x: ArrayView1<'_, f64>,
        n: usize,
        rng: &mut Xoshiro256PlusPlus,
    ) -> Vec<MultiLabel> {
        let marginals = self.marginals(x);
        (0..n)
            .map(|_| {
                marginals
                    .iter()
                    .enumerate()
                    .filter(|(_, &p)| rng.gen::<f64>() < p)
                    .map(|(k, _)| k)
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn model() -> BinaryRelevanceModel {
        // marginals at x = [1.0]: sigmoid(2) ~ 0.88, sigmoid(-1) ~ 0.27, sigmoid(0) = 0.5
        BinaryRelevanceModel::new(array![[2.0], [-1.0], [0.0]], array![0.0, 0.0, 0.0]).unwrap()
    }

    #[test]
    fn test_joint_matches_brute_force() {
        let model = model();
        let x = array![1.0];
        let joint = model.compute_joint(x.view(), 0.0);
        assert_eq!(joint.len(), 8);
        assert!((joint.total_mass() - 1.0).abs() < 1e-9);

        let marginals = model.predict_class_probs(x.view());
        for (set, p) in joint.entries() {
            assert!((set_probability(&marginals, set) - p).abs() < 1e-12);
        }
        for w in joint.entries().windows(2) {
            assert!(w[0].1 >= w[1].1);
        }
    }

    #[test]
    fn test_joint_truncation() {
        let model = model();
        let x = array![1.0];
        let joint = model.compute_joint(x.view(), 0.1);
        assert!(joint.entries().iter().all(|(_, p)| *p >= 0.1));
        assert!(joint.len() < 8);
        // label 2 sits at exactly 0.5, so {0} and {0, 2} tie and set order decides
        assert_eq!(joint.entries()[0].0, MultiLabel::from_labels(vec![0]));
        assert_eq!(joint.entries()[1].0, MultiLabel::from_labels(vec![0, 2]));
    }

    #[test]
    fn test_assignment_probs_threshold() {
        let model = model();
        let x = array![1.0];
        let support = SupportSet::new(vec![
            MultiLabel::from_labels(vec![0]),
            MultiLabel::from_labels(vec![1, 2]),
        ])
        .unwrap();
        let probs = model.predict_assignment_probs(x.view(), &support, 0.05);
        assert!(probs[0] > 0.05);
        assert_eq!(probs[1], 0.0);
    }

    #[test]
    fn test_wrong_feature_width_does_not_panic() {
        let model = model();
        assert!(matches!(
            model.try_marginals(array![1.0, 2.0].view()),
            Err(CalibrateError::ShapeError { .. })
        ));

        let marginals = model.predict_class_probs(array![1.0, 2.0].view());
        assert_eq!(marginals, vec![0.5, 0.5, 0.5]);
        let joint = model.compute_joint(Array1::<f64>::zeros(0).view(), 0.0);
        assert_eq!(joint.len(), 8);
        assert_eq!(model.samples(array![1.0, 2.0].view(), 3, &mut Xoshiro256PlusPlus::seed_from_u64(1)).len(), 3);
    }

    #[test]
    fn test_samples_are_seeded() {
        let model = model();
        let x = array![1.0];
        let a = model.samples(x.view(), 50, &mut Xoshiro256PlusPlus::seed_from_u64(7));
        let b = model.samples(x.view(), 50, &mut Xoshiro256PlusPlus::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
    }
}
