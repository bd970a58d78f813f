//! Multi-label calibrate - set prediction and confidence calibration
//!
//! This crate turns the output of a probabilistic multi-label classifier into
//! a final label set and a calibrated confidence for that set.
//!
//! # Modules
//!
//! ## Data model
//! - [`multilabel`] - Label sets, support sets and the F1 measure
//! - [`dataset`] - Multi-label and regression datasets
//! - [`model`] - Base probability model contract and a binary relevance model
//!
//! ## Prediction
//! - [`plugin`] - Expected-F1 maximizing plug-in predictors
//! - [`predictor`] - Set prediction contract and baseline predictors
//!
//! ## Calibration
//! - [`calibration`] - Isotonic label and set calibrators, calibration quality
//! - [`vectorizer`] - Candidate feature vectors for set calibrators
//! - [`training`] - Monotone-constrained gradient boosting
//! - [`rerank`] - Boosted candidate reranking
//!
//! ## Evaluation
//! - [`metrics`] - Multi-label measures

// Core error handling
pub mod error;

// Data model
pub mod dataset;
pub mod model;
pub mod multilabel;

// Prediction
pub mod plugin;
pub mod predictor;

// Calibration
pub mod calibration;
pub mod rerank;
pub mod training;
pub mod vectorizer;

// Evaluation
pub mod metrics;

pub use error::{CalibrateError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{CalibrateError, Result};

    // Data model
    pub use crate::dataset::{MultiLabelDataset, RegressionDataset};
    pub use crate::model::{BinaryRelevanceModel, JointDistribution, MultiLabelModel};
    pub use crate::multilabel::{f1, MultiLabel, SupportSet};

    // Prediction
    pub use crate::plugin::{
        F1Decision, GeneralF1Predictor, PMatrixIsotonicScaling, PluginF1, PluginF1Config,
        PredictionMode, SetIsotonicScaling,
    };
    pub use crate::predictor::{IndependentPredictor, MultiLabelClassifier, SupportPredictor};

    // Calibration
    pub use crate::calibration::{
        calibration_report, CalibrationReport, CardinalityIsotonicCalibrator,
        CardinalityIsotonicConfig, IdentityVectorCalibrator, IsotonicRegression,
        IsotonicVectorCalibrator, LabelCalibrator, LabelCalibratorKind, SetCalibratorKind,
        VectorCalibrator,
    };
    pub use crate::rerank::{Reranker, RerankerConfig, RerankerTrainer};
    pub use crate::training::{BoostedEnsemble, BoostingConfig, Monotonicity, Scorer};
    pub use crate::vectorizer::{FeatureBlock, PredictionVectorizer, VectorizerConfig};

    // Evaluation
    pub use crate::metrics::MultiLabelMeasures;
}
