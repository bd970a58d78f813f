//! F1-optimal prediction from a base model's probability estimates

use super::f1::{F1Decision, GeneralF1Predictor};
use super::scaling::{PMatrixIsotonicScaling, SetIsotonicScaling};
use crate::error::{CalibrateError, Result};
use crate::model::MultiLabelModel;
use crate::multilabel::{f1, MultiLabel, SupportSet};
use crate::predictor::MultiLabelClassifier;
use ndarray::ArrayView1;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Where the distribution over label sets comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PredictionMode {
    /// Base-model probabilities of each support member
    Support,
    /// Monte Carlo draws from the base model
    Sampling,
    /// Monte Carlo draws with empty sets discarded
    SamplingNonEmpty,
    /// Support probabilities rescaled by a fitted isotonic map
    Isotonic,
    /// Label-by-cardinality matrix rescaled entry-wise
    #[serde(rename = "pmatrix")]
    PMatrix,
}

impl PredictionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Sampling => "sampling",
            Self::SamplingNonEmpty => "samplingNonEmpty",
            Self::Isotonic => "isotonic",
            Self::PMatrix => "pmatrix",
        }
    }
}

impl fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionMode {
    type Err = CalibrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "support" => Ok(Self::Support),
            "sampling" => Ok(Self::Sampling),
            "samplingNonEmpty" => Ok(Self::SamplingNonEmpty),
            "isotonic" => Ok(Self::Isotonic),
            "pmatrix" => Ok(Self::PMatrix),
            other => Err(CalibrateError::ConfigError(format!(
                "unknown prediction mode '{}'",
                other
            ))),
        }
    }
}

/// Plug-in F1 predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginF1Config {
    pub mode: PredictionMode,
    /// Draws per prediction in the sampling modes
    pub num_samples: usize,
    /// Support probabilities below this are treated as 0
    pub pi_threshold: f64,
    /// Largest predicted set considered; 0 always predicts the empty set
    pub max_size: usize,
    /// Seed of the per-prediction sampling RNG
    pub seed: u64,
}

impl Default for PluginF1Config {
    fn default() -> Self {
        Self {
            mode: PredictionMode::Support,
            num_samples: 1000,
            pi_threshold: 0.001,
            max_size: 20,
            seed: 42,
        }
    }
}

impl PluginF1Config {
    pub fn new(mode: PredictionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    pub fn with_pi_threshold(mut self, threshold: f64) -> Self {
        self.pi_threshold = threshold;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.pi_threshold) {
            return Err(CalibrateError::invalid_parameter(
                "pi_threshold",
                self.pi_threshold,
                "must lie in [0, 1)",
            ));
        }
        if self.num_samples == 0 {
            return Err(CalibrateError::invalid_parameter(
                "num_samples",
                self.num_samples,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Diagnostics of a single support-mode prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct F1Analysis {
    pub prediction: MultiLabel,
    pub expected_f1: f64,
    /// Expected F1 had the truth been predicted
    pub truth_expected_f1: Option<f64>,
    /// F1 of the prediction against the truth
    pub realized_f1: Option<f64>,
    /// Probability the distribution assigns to the truth
    pub truth_prob: Option<f64>,
}

/// Expected-F1 plug-in predictor over a shared base model
///
/// Mode-specific state is attached after construction; using a mode whose
/// state is missing is a [`CalibrateError::ModelStateError`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginF1<M> {
    model: Arc<M>,
    config: PluginF1Config,
    support: Option<SupportSet>,
    set_scaling: Option<SetIsotonicScaling>,
    pmatrix_scaling: Option<PMatrixIsotonicScaling>,
}

impl<M: MultiLabelModel> PluginF1<M> {
    pub fn new(model: Arc<M>, config: PluginF1Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            support: None,
            set_scaling: None,
            pmatrix_scaling: None,
        })
    }

    pub fn with_support(mut self, support: SupportSet) -> Self {
        self.support = Some(support);
        self
    }

    pub fn with_set_scaling(mut self, scaling: SetIsotonicScaling) -> Self {
        self.set_scaling = Some(scaling);
        self
    }

    pub fn with_pmatrix_scaling(mut self, scaling: PMatrixIsotonicScaling) -> Self {
        self.pmatrix_scaling = Some(scaling);
        self
    }

    pub fn config(&self) -> &PluginF1Config {
        &self.config
    }

    pub fn model(&self) -> &Arc<M> {
        &self.model
    }

    pub fn support(&self) -> Option<&SupportSet> {
        self.support.as_ref()
    }

    fn predictor(&self) -> GeneralF1Predictor {
        GeneralF1Predictor::new().with_max_size(self.config.max_size)
    }

    fn require_support(&self) -> Result<&SupportSet> {
        self.support.as_ref().ok_or_else(|| {
            CalibrateError::ModelStateError(format!(
                "mode '{}' needs a support set",
                self.config.mode
            ))
        })
    }

    /// Prediction and its expected F1 under the active mode's distribution
    pub fn predict_decision(&self, x: ArrayView1<'_, f64>) -> Result<F1Decision> {
        match self.config.mode {
            PredictionMode::Support => self.predict_by_support(x),
            PredictionMode::Sampling => self.predict_by_sampling(x, false),
            PredictionMode::SamplingNonEmpty => self.predict_by_sampling(x, true),
            PredictionMode::Isotonic => self.predict_by_isotonic(x),
            PredictionMode::PMatrix => self.predict_by_pmatrix(x),
        }
    }

    fn predict_by_support(&self, x: ArrayView1<'_, f64>) -> Result<F1Decision> {
        let support = self.require_support()?;
        let probs = self
            .model
            .predict_assignment_probs(x, support, self.config.pi_threshold);
        if probs.iter().all(|&p| p <= 0.0) {
            warn!(
                pi_threshold = self.config.pi_threshold,
                "All support probabilities truncated, predicting the empty set"
            );
        }
        self.predictor().predict_over_support(support.as_slice(), &probs)
    }

    fn predict_by_sampling(&self, x: ArrayView1<'_, f64>, non_empty: bool) -> Result<F1Decision> {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.seed);
        let mut samples = self.model.samples(x, self.config.num_samples, &mut rng);
        if non_empty {
            samples.retain(|s| !s.is_empty());
        }
        self.predictor()
            .predict_from_samples(self.model.num_classes(), &samples)
    }

    fn predict_by_isotonic(&self, x: ArrayView1<'_, f64>) -> Result<F1Decision> {
        let support = self.require_support()?;
        let scaling = self.set_scaling.as_ref().ok_or_else(|| {
            CalibrateError::ModelStateError("set isotonic scaling is not initialized".to_string())
        })?;
        let probs = self
            .model
            .predict_assignment_probs(x, support, 0.0)
            .into_iter()
            .map(|p| scaling.calibrated_prob(p))
            .collect::<Result<Vec<f64>>>()?;
        self.predictor().predict_over_support(support.as_slice(), &probs)
    }

    fn predict_by_pmatrix(&self, x: ArrayView1<'_, f64>) -> Result<F1Decision> {
        let support = self.require_support()?;
        let scaling = self.pmatrix_scaling.as_ref().ok_or_else(|| {
            CalibrateError::ModelStateError("P-matrix isotonic scaling is not initialized".to_string())
        })?;
        let probs = self.model.predict_assignment_probs(x, support, 0.0);
        let mut matrix =
            GeneralF1Predictor::pmatrix(self.model.num_classes(), support.as_slice(), &probs)?;
        scaling.calibrate_matrix(&mut matrix)?;
        let zero_prob = support.empty_index().map_or(0.0, |i| probs[i]);
        Ok(self.predictor().predict_with_pmatrix(&matrix, zero_prob))
    }

    /// Support-mode prediction with diagnostics against an optional truth
    pub fn predict_with_analysis(
        &self,
        x: ArrayView1<'_, f64>,
        truth: Option<&MultiLabel>,
    ) -> Result<F1Analysis> {
        let support = self.require_support()?;
        let probs = self.model.predict_assignment_probs(x, support, 0.0);
        let decision = self.predictor().predict_over_support(support.as_slice(), &probs)?;

        let truth_expected_f1 =
            truth.map(|t| GeneralF1Predictor::expected_f1(support.as_slice(), &probs, t));
        let realized_f1 = truth.map(|t| f1(&decision.prediction, t));
        let truth_prob = truth.map(|t| support.position(t).map_or(0.0, |i| probs[i]));

        Ok(F1Analysis {
            prediction: decision.prediction,
            expected_f1: decision.expected_f1,
            truth_expected_f1,
            realized_f1,
            truth_prob,
        })
    }
}

impl<M: MultiLabelModel> MultiLabelClassifier for PluginF1<M> {
    fn predict(&self, x: ArrayView1<'_, f64>) -> Result<MultiLabel> {
        self.predict_decision(x).map(|d| d.prediction)
    }
}
