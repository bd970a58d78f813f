//! Boosted reranking of joint candidates
//!
//! A [`Reranker`] scores vectorized candidates with a boosted ensemble. It
//! serves both as a set calibrator and as a final set selector.

mod trainer;

pub use trainer::{RerankerConfig, RerankerTrainer};

use crate::calibration::VectorCalibrator;
use crate::error::Result;
use crate::model::MultiLabelModel;
use crate::multilabel::MultiLabel;
use crate::predictor::MultiLabelClassifier;
use crate::training::{BoostedEnsemble, Scorer};
use crate::vectorizer::PredictionVectorizer;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// Boosted correctness scorer bound to a base model and vectorizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reranker<M> {
    ensemble: BoostedEnsemble,
    model: Arc<M>,
    num_candidates: usize,
    vectorizer: PredictionVectorizer,
}

impl<M: MultiLabelModel> Reranker<M> {
    pub fn new(
        ensemble: BoostedEnsemble,
        model: Arc<M>,
        num_candidates: usize,
        vectorizer: PredictionVectorizer,
    ) -> Self {
        Self {
            ensemble,
            model,
            num_candidates,
            vectorizer,
        }
    }

    pub fn ensemble(&self) -> &BoostedEnsemble {
        &self.ensemble
    }

    pub fn vectorizer(&self) -> &PredictionVectorizer {
        &self.vectorizer
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates
    }

    fn clamped(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        Ok(clamp_score(self.ensemble.score(features)?))
    }

    /// Best-scoring candidate at `x` with its calibrated score
    ///
    /// Candidates are ranked by raw ensemble score; only the returned score
    /// is clamped. Equal scores prefer the candidate the base model finds
    /// more likely, then the earlier candidate. Without candidates the empty
    /// set is returned with its own score.
    pub fn predict_with_score(&self, x: ArrayView1<'_, f64>) -> Result<(MultiLabel, f64)> {
        let model: &dyn MultiLabelModel = self.model.as_ref();
        let candidates = self.vectorizer.candidates(model, x, self.num_candidates);
        if candidates.is_empty() {
            let empty = MultiLabel::empty();
            let score = self.clamped(self.vectorizer.vectorize(model, x, &empty)?.view())?;
            return Ok((empty, score));
        }

        let (sets, base_probs): (Vec<MultiLabel>, Vec<f64>) = candidates.into_iter().unzip();
        let vectors = self.vectorizer.vectorize_candidates(model, x, &sets)?;
        let raw_scores = vectors
            .iter()
            .map(|v| self.ensemble.score(v.view()))
            .collect::<Result<Vec<f64>>>()?;

        let best = best_candidate(&raw_scores, &base_probs);
        Ok((sets[best].clone(), clamp_score(raw_scores[best])))
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Index of the highest raw score; ties go to the larger base probability,
/// then the lower index. Non-finite scores rank last.
fn best_candidate(raw_scores: &[f64], base_probs: &[f64]) -> usize {
    let rank = |s: f64| if s.is_finite() { s } else { f64::NEG_INFINITY };
    let mut best = 0;
    for i in 1..raw_scores.len() {
        let by_score = rank(raw_scores[i])
            .partial_cmp(&rank(raw_scores[best]))
            .unwrap_or(Ordering::Equal);
        let by_prob = base_probs[i]
            .partial_cmp(&base_probs[best])
            .unwrap_or(Ordering::Equal);
        if by_score == Ordering::Greater
            || (by_score == Ordering::Equal && by_prob == Ordering::Greater)
        {
            best = i;
        }
    }
    best
}

impl<M: MultiLabelModel> VectorCalibrator for Reranker<M> {
    /// Ensemble score clamped to [0, 1]
    fn calibrate(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        self.clamped(features)
    }

    fn name(&self) -> &'static str {
        "reranker"
    }
}

impl<M: MultiLabelModel> MultiLabelClassifier for Reranker<M> {
    fn predict(&self, x: ArrayView1<'_, f64>) -> Result<MultiLabel> {
        self.predict_with_score(x).map(|(set, _)| set)
    }
}
