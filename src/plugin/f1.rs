//! Expected-F1 maximization under a distribution over label sets

use crate::error::{CalibrateError, Result};
use crate::multilabel::{f1, MultiLabel};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const TIE_EPSILON: f64 = 1e-12;

/// A predicted label set and the expected F1 it achieves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct F1Decision {
    pub prediction: MultiLabel,
    pub expected_f1: f64,
}

impl F1Decision {
    fn empty(expected_f1: f64) -> Self {
        Self {
            prediction: MultiLabel::empty(),
            expected_f1,
        }
    }
}

/// Plug-in predictor returning the label set with the largest expected F1
///
/// Two engines are available. Over an explicit support the expected F1 of
/// every member is summed directly. Over a label-by-cardinality matrix the
/// general F-measure maximizer picks, for each predicted size, the labels
/// with the largest marginal contribution and keeps the best size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeneralF1Predictor {
    max_size: usize,
}

impl Default for GeneralF1Predictor {
    fn default() -> Self {
        Self { max_size: 20 }
    }
}

impl GeneralF1Predictor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest predicted set considered
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Expected F1 of `prediction` when the truth follows `probs` over `sets`
    pub fn expected_f1(sets: &[MultiLabel], probs: &[f64], prediction: &MultiLabel) -> f64 {
        sets.iter()
            .zip(probs)
            .filter(|(_, &p)| p > 0.0)
            .map(|(truth, &p)| p * f1(prediction, truth))
            .sum()
    }

    /// Exact argmax of expected F1 over the members of `support`
    ///
    /// Ties within 1e-12 go to the smaller set, then to the set whose ordered
    /// label list is smaller at the first difference. Members larger than
    /// `max_size` are never predicted but still carry probability mass.
    /// When `max_size` excludes every member, the empty set is predicted
    /// with its expected F1 under `probs`, even if it is not a member.
    pub fn predict_over_support(&self, support: &[MultiLabel], probs: &[f64]) -> Result<F1Decision> {
        check_aligned(support, probs)?;
        if support.is_empty() {
            return Err(CalibrateError::ConfigError(
                "cannot predict over an empty support".to_string(),
            ));
        }
        if probs.iter().all(|&p| p <= 0.0) {
            return Ok(F1Decision::empty(0.0));
        }

        let mut best: Option<F1Decision> = None;
        for candidate in support.iter().filter(|c| c.cardinality() <= self.max_size) {
            let score = Self::expected_f1(support, probs, candidate);
            let better = match &best {
                None => true,
                Some(current) => {
                    if score > current.expected_f1 + TIE_EPSILON {
                        true
                    } else if (score - current.expected_f1).abs() <= TIE_EPSILON {
                        prefer_smaller(candidate, &current.prediction) == Ordering::Less
                    } else {
                        false
                    }
                }
            };
            if better {
                best = Some(F1Decision {
                    prediction: candidate.clone(),
                    expected_f1: score,
                });
            }
        }

        Ok(best.unwrap_or_else(|| {
            let empty = MultiLabel::empty();
            F1Decision::empty(Self::expected_f1(support, probs, &empty))
        }))
    }

    /// Label-by-cardinality matrix of a distribution over label sets
    ///
    /// Entry `[i][s]` is the probability that label `i` is present and the
    /// set has exactly `s + 1` labels. The matrix is `num_classes x num_classes`.
    pub fn pmatrix(num_classes: usize, sets: &[MultiLabel], probs: &[f64]) -> Result<Vec<Vec<f64>>> {
        check_aligned(sets, probs)?;
        let mut matrix = vec![vec![0.0; num_classes]; num_classes];
        for (set, &p) in sets.iter().zip(probs) {
            if set.is_empty() || p <= 0.0 {
                continue;
            }
            if let Some(max) = set.max_label().filter(|&m| m >= num_classes) {
                return Err(CalibrateError::ValidationError(format!(
                    "label {} out of range for {} classes",
                    max, num_classes
                )));
            }
            let s = set.cardinality() - 1;
            for &i in set.labels() {
                matrix[i][s] += p;
            }
        }
        Ok(matrix)
    }

    /// General F-measure maximizer over a label-by-cardinality matrix
    ///
    /// `zero_prob` is the probability of the empty set and is the expected F1
    /// of predicting it. Ties between sizes keep the smaller size; ties
    /// between labels keep the lower index.
    pub fn predict_with_pmatrix(&self, p: &[Vec<f64>], zero_prob: f64) -> F1Decision {
        let num_classes = p.len();
        let mut best = F1Decision::empty(zero_prob);

        for k in 1..=self.max_size.min(num_classes) {
            let mut delta: Vec<(usize, f64)> = p
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let contribution: f64 = row
                        .iter()
                        .enumerate()
                        .map(|(s, &v)| v * 2.0 / (s + 1 + k) as f64)
                        .sum();
                    (i, contribution)
                })
                .collect();
            delta.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));

            let score: f64 = delta[..k].iter().map(|(_, d)| d).sum();
            if score > best.expected_f1 + TIE_EPSILON {
                best = F1Decision {
                    prediction: delta[..k].iter().map(|(i, _)| *i).collect(),
                    expected_f1: score,
                };
            }
        }
        best
    }

    /// General F-measure maximizer over the empirical distribution of samples
    ///
    /// No samples means no mass, so the empty set is returned with expected F1 0.
    pub fn predict_from_samples(&self, num_classes: usize, samples: &[MultiLabel]) -> Result<F1Decision> {
        if samples.is_empty() {
            return Ok(F1Decision::empty(0.0));
        }
        let weight = 1.0 / samples.len() as f64;
        let probs = vec![weight; samples.len()];
        let matrix = Self::pmatrix(num_classes, samples, &probs)?;
        let zero_prob = samples.iter().filter(|s| s.is_empty()).count() as f64 * weight;
        Ok(self.predict_with_pmatrix(&matrix, zero_prob))
    }
}

fn check_aligned(sets: &[MultiLabel], probs: &[f64]) -> Result<()> {
    if sets.len() != probs.len() {
        return Err(CalibrateError::ShapeError {
            expected: format!("{} probabilities", sets.len()),
            actual: format!("{} probabilities", probs.len()),
        });
    }
    Ok(())
}

fn prefer_smaller(a: &MultiLabel, b: &MultiLabel) -> Ordering {
    a.cardinality()
        .cmp(&b.cardinality())
        .then_with(|| a.labels().cmp(b.labels()))
}
