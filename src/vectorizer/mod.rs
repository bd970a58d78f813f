//! Candidate-set feature vectors for set calibration and reranking
//!
//! A [`PredictionVectorizer`] maps a data point and a candidate label set to
//! a fixed-length feature vector. Blocks are laid out in one fixed order and
//! only enabled blocks take space, so vectors built with the same
//! configuration always share offsets.

mod priors;

pub use priors::{Implication, LabelSetPriors};

use crate::calibration::LabelCalibrator;
use crate::dataset::{MultiLabelDataset, RegressionDataset};
use crate::error::{CalibrateError, Result};
use crate::model::{JointDistribution, MultiLabelModel};
use crate::multilabel::{MultiLabel, SupportSet};
use crate::training::Monotonicity;
use ndarray::{Array1, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

const LOG_FLOOR: f64 = 1e-10;

/// Feature blocks in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureBlock {
    /// Product of calibrated per-label agreement probabilities
    BrProb,
    /// Base-model joint probability of the candidate
    CbmProb,
    /// Calibrated agreement probability of every label
    LabelProbs,
    /// Training frequency of the candidate's cardinality
    CardPrior,
    /// Candidate cardinality
    Card,
    /// Training frequency of the candidate itself
    SetPrior,
    /// Expected F1 of the candidate under the training label distribution
    F1Prior,
    /// Training frequency of the candidate's configuration on each implied pair
    PairPrior,
    /// Membership indicator of every label
    EncodeLabel,
    /// Rank of the candidate in the base model's joint distribution
    Position,
    /// Whether the candidate respects each implied pair
    Implication,
}

impl FeatureBlock {
    const ORDER: [FeatureBlock; 11] = [
        FeatureBlock::BrProb,
        FeatureBlock::CbmProb,
        FeatureBlock::LabelProbs,
        FeatureBlock::CardPrior,
        FeatureBlock::Card,
        FeatureBlock::SetPrior,
        FeatureBlock::F1Prior,
        FeatureBlock::PairPrior,
        FeatureBlock::EncodeLabel,
        FeatureBlock::Position,
        FeatureBlock::Implication,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureBlock::BrProb => "brProb",
            FeatureBlock::CbmProb => "cbmProb",
            FeatureBlock::LabelProbs => "labelProbs",
            FeatureBlock::CardPrior => "cardPrior",
            FeatureBlock::Card => "card",
            FeatureBlock::SetPrior => "setPrior",
            FeatureBlock::F1Prior => "f1Prior",
            FeatureBlock::PairPrior => "pairPrior",
            FeatureBlock::EncodeLabel => "encodeLabel",
            FeatureBlock::Position => "position",
            FeatureBlock::Implication => "implication",
        }
    }

    /// Whether values in this block are probabilities
    fn is_probability(&self) -> bool {
        matches!(
            self,
            FeatureBlock::BrProb
                | FeatureBlock::CbmProb
                | FeatureBlock::LabelProbs
                | FeatureBlock::CardPrior
                | FeatureBlock::SetPrior
                | FeatureBlock::F1Prior
                | FeatureBlock::PairPrior
        )
    }

    fn monotonicity(&self) -> Monotonicity {
        match self {
            FeatureBlock::Card | FeatureBlock::EncodeLabel | FeatureBlock::Position => {
                Monotonicity::None
            }
            _ => Monotonicity::Increasing,
        }
    }
}

impl fmt::Display for FeatureBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which blocks to emit and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    pub br_prob: bool,
    pub cbm_prob: bool,
    pub label_probs: bool,
    pub card_prior: bool,
    pub card: bool,
    pub set_prior: bool,
    pub f1_prior: bool,
    pub pair_prior: bool,
    pub encode_label: bool,
    pub position: bool,
    pub implication: bool,
    /// Map probability blocks through `ln(max(v, 1e-10))`
    pub log_scale: bool,
    /// Truncation threshold for the base model's joint distribution
    pub joint_threshold: f64,
    /// Minimum occurrences of a premise label before implications are trusted
    pub min_implication_support: usize,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            br_prob: true,
            cbm_prob: false,
            label_probs: false,
            card_prior: false,
            card: true,
            set_prior: false,
            f1_prior: false,
            pair_prior: false,
            encode_label: false,
            position: false,
            implication: false,
            log_scale: false,
            joint_threshold: 0.001,
            min_implication_support: 5,
        }
    }
}

impl VectorizerConfig {
    fn enabled(&self, block: FeatureBlock) -> bool {
        match block {
            FeatureBlock::BrProb => self.br_prob,
            FeatureBlock::CbmProb => self.cbm_prob,
            FeatureBlock::LabelProbs => self.label_probs,
            FeatureBlock::CardPrior => self.card_prior,
            FeatureBlock::Card => self.card,
            FeatureBlock::SetPrior => self.set_prior,
            FeatureBlock::F1Prior => self.f1_prior,
            FeatureBlock::PairPrior => self.pair_prior,
            FeatureBlock::EncodeLabel => self.encode_label,
            FeatureBlock::Position => self.position,
            FeatureBlock::Implication => self.implication,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !FeatureBlock::ORDER.iter().any(|&b| self.enabled(b)) {
            return Err(CalibrateError::ConfigError(
                "vectorizer needs at least one feature block".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.joint_threshold) {
            return Err(CalibrateError::invalid_parameter(
                "joint_threshold",
                self.joint_threshold,
                "must lie in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// Builder for [`PredictionVectorizer`]
#[derive(Debug, Clone, Default)]
pub struct VectorizerBuilder {
    config: VectorizerConfig,
}

macro_rules! switch {
    ($($name:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $name(mut self, on: bool) -> Self {
                self.config.$field = on;
                self
            }
        )*
    };
}

impl VectorizerBuilder {
    switch! {
        br_prob => br_prob,
        cbm_prob => cbm_prob,
        label_probs => label_probs,
        card_prior => card_prior,
        card => card,
        set_prior => set_prior,
        f1_prior => f1_prior,
        pair_prior => pair_prior,
        encode_label => encode_label,
        position => position,
        implication => implication,
        log_scale => log_scale,
    }

    pub fn joint_threshold(mut self, threshold: f64) -> Self {
        self.config.joint_threshold = threshold;
        self
    }

    pub fn min_implication_support(mut self, support: usize) -> Self {
        self.config.min_implication_support = support;
        self
    }

    /// Validate the switches and collect priors from the training labels
    pub fn build(
        self,
        train: &MultiLabelDataset,
        label_calibrator: LabelCalibrator,
    ) -> Result<PredictionVectorizer> {
        self.config.validate()?;
        let priors = LabelSetPriors::from_dataset(train, self.config.min_implication_support);

        let mut layout = Vec::new();
        let mut offset = 0;
        for block in FeatureBlock::ORDER {
            if !self.config.enabled(block) {
                continue;
            }
            let len = match block {
                FeatureBlock::LabelProbs | FeatureBlock::EncodeLabel => train.num_classes(),
                FeatureBlock::PairPrior | FeatureBlock::Implication => priors.implications().len(),
                _ => 1,
            };
            layout.push(BlockSpan { block, offset, len });
            offset += len;
        }

        info!(
            num_features = offset,
            num_blocks = layout.len(),
            num_implications = priors.implications().len(),
            "Built prediction vectorizer"
        );
        Ok(PredictionVectorizer {
            config: self.config,
            priors,
            label_calibrator,
            layout,
            num_features: offset,
        })
    }
}

/// Position of one block inside the feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSpan {
    pub block: FeatureBlock,
    pub offset: usize,
    pub len: usize,
}

/// A vectorized candidate with its correctness target
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub features: Array1<f64>,
    /// 1 when the candidate equals the truth, else 0
    pub correctness: f64,
}

/// Per-data-point quantities shared by every candidate of that point
struct PointContext {
    calibrated: Vec<f64>,
    joint: Option<JointDistribution>,
}

/// Deterministic mapping from (data point, candidate) to features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionVectorizer {
    config: VectorizerConfig,
    priors: LabelSetPriors,
    label_calibrator: LabelCalibrator,
    layout: Vec<BlockSpan>,
    num_features: usize,
}

impl PredictionVectorizer {
    pub fn builder() -> VectorizerBuilder {
        VectorizerBuilder::default()
    }

    pub fn config(&self) -> &VectorizerConfig {
        &self.config
    }

    pub fn priors(&self) -> &LabelSetPriors {
        &self.priors
    }

    pub fn label_calibrator(&self) -> &LabelCalibrator {
        &self.label_calibrator
    }

    /// Enabled blocks with their offsets and lengths
    pub fn layout(&self) -> &[BlockSpan] {
        &self.layout
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Offset and length of a block, if enabled
    pub fn span(&self, block: FeatureBlock) -> Option<BlockSpan> {
        self.layout.iter().copied().find(|s| s.block == block)
    }

    /// Per-feature monotonicity aligned with the layout
    pub fn monotonicity_constraints(&self, num_classes: usize) -> Result<Vec<Monotonicity>> {
        if num_classes != self.priors.num_classes() {
            return Err(CalibrateError::ShapeError {
                expected: format!("{} classes", self.priors.num_classes()),
                actual: format!("{} classes", num_classes),
            });
        }
        Ok(self
            .layout
            .iter()
            .flat_map(|span| std::iter::repeat(span.block.monotonicity()).take(span.len))
            .collect())
    }

    fn context(&self, model: &dyn MultiLabelModel, x: ArrayView1<'_, f64>) -> Result<PointContext> {
        if model.num_classes() != self.priors.num_classes() {
            return Err(CalibrateError::ShapeError {
                expected: format!("model with {} classes", self.priors.num_classes()),
                actual: format!("model with {} classes", model.num_classes()),
            });
        }
        let calibrated = self
            .label_calibrator
            .calibrated_class_probs(&model.predict_class_probs(x))?;
        let joint = self
            .config
            .position
            .then(|| model.compute_joint(x, self.config.joint_threshold));
        Ok(PointContext { calibrated, joint })
    }

    fn features(
        &self,
        model: &dyn MultiLabelModel,
        x: ArrayView1<'_, f64>,
        context: &PointContext,
        candidate: &MultiLabel,
    ) -> Result<Array1<f64>> {
        let agreement: Vec<f64> = context
            .calibrated
            .iter()
            .enumerate()
            .map(|(k, &p)| if candidate.matches(k) { p } else { 1.0 - p })
            .collect();

        let mut out = Vec::with_capacity(self.num_features);
        for span in &self.layout {
            let start = out.len();
            match span.block {
                FeatureBlock::BrProb => out.push(agreement.iter().product()),
                FeatureBlock::CbmProb => {
                    let single = SupportSet::new(vec![candidate.clone()])?;
                    let p = model.predict_assignment_probs(x, &single, 0.0);
                    out.push(p.first().copied().unwrap_or(0.0));
                }
                FeatureBlock::LabelProbs => out.extend(agreement.iter().copied()),
                FeatureBlock::CardPrior => {
                    out.push(self.priors.cardinality_prior(candidate.cardinality()))
                }
                FeatureBlock::Card => out.push(candidate.cardinality() as f64),
                FeatureBlock::SetPrior => out.push(self.priors.set_prior(candidate)),
                FeatureBlock::F1Prior => out.push(self.priors.f1_prior(candidate)),
                FeatureBlock::PairPrior => out.extend(self.priors.pair_priors(candidate)),
                FeatureBlock::EncodeLabel => {
                    out.extend(candidate.to_indicator(self.priors.num_classes()))
                }
                FeatureBlock::Position => {
                    let rank = context.joint.as_ref().map_or(0, |joint| {
                        joint.position(candidate).unwrap_or(joint.len())
                    });
                    out.push(rank as f64);
                }
                FeatureBlock::Implication => out.extend(
                    self.priors
                        .implications()
                        .iter()
                        .map(|imp| if imp.holds_for(candidate) { 1.0 } else { 0.0 }),
                ),
            }
            if self.config.log_scale && span.block.is_probability() {
                for v in &mut out[start..] {
                    *v = v.max(LOG_FLOOR).ln();
                }
            }
        }
        Ok(Array1::from_vec(out))
    }

    /// Feature vector of `candidate` at data point `x`
    pub fn vectorize(
        &self,
        model: &dyn MultiLabelModel,
        x: ArrayView1<'_, f64>,
        candidate: &MultiLabel,
    ) -> Result<Array1<f64>> {
        let context = self.context(model, x)?;
        self.features(model, x, &context, candidate)
    }

    /// Feature vector of `candidate` with its correctness against `truth`
    pub fn create_instance(
        &self,
        model: &dyn MultiLabelModel,
        x: ArrayView1<'_, f64>,
        candidate: &MultiLabel,
        truth: &MultiLabel,
    ) -> Result<Instance> {
        Ok(Instance {
            features: self.vectorize(model, x, candidate)?,
            correctness: if candidate == truth { 1.0 } else { 0.0 },
        })
    }

    /// The `num_candidates` most probable joint candidates at `x`
    pub fn candidates(
        &self,
        model: &dyn MultiLabelModel,
        x: ArrayView1<'_, f64>,
        num_candidates: usize,
    ) -> Vec<(MultiLabel, f64)> {
        model
            .compute_joint(x, self.config.joint_threshold)
            .top_k(num_candidates)
            .to_vec()
    }

    /// Vectorize candidates of `x`, reusing the per-point context
    pub(crate) fn vectorize_candidates(
        &self,
        model: &dyn MultiLabelModel,
        x: ArrayView1<'_, f64>,
        candidates: &[MultiLabel],
    ) -> Result<Vec<Array1<f64>>> {
        let context = self.context(model, x)?;
        candidates
            .iter()
            .map(|c| self.features(model, x, &context, c))
            .collect()
    }

    /// Regression training set of (candidate features, correctness)
    ///
    /// Each data point contributes its top `num_candidates` joint candidates
    /// plus its truth when the truth is not among them. Rows keep data-point
    /// order.
    pub fn create_cali_training_data(
        &self,
        dataset: &MultiLabelDataset,
        model: &dyn MultiLabelModel,
        num_candidates: usize,
    ) -> Result<RegressionDataset> {
        let per_point: Vec<Vec<Instance>> = (0..dataset.num_data_points())
            .into_par_iter()
            .map(|i| -> Result<Vec<Instance>> {
                let x = dataset.row(i);
                let truth = dataset.label(i);
                let mut candidates: Vec<MultiLabel> = self
                    .candidates(model, x, num_candidates)
                    .into_iter()
                    .map(|(c, _)| c)
                    .collect();
                if !candidates.contains(truth) {
                    candidates.push(truth.clone());
                }
                let vectors = self.vectorize_candidates(model, x, &candidates)?;
                Ok(candidates
                    .iter()
                    .zip(vectors)
                    .map(|(c, features)| Instance {
                        features,
                        correctness: if c == truth { 1.0 } else { 0.0 },
                    })
                    .collect())
            })
            .collect::<Result<Vec<_>>>()?;

        let (rows, targets): (Vec<Array1<f64>>, Vec<f64>) = per_point
            .into_iter()
            .flatten()
            .map(|inst| (inst.features, inst.correctness))
            .unzip();

        info!(
            num_data_points = dataset.num_data_points(),
            num_instances = rows.len(),
            num_features = self.num_features,
            "Assembled calibration training data"
        );
        RegressionDataset::from_rows(rows, targets, self.num_features)
    }
}
