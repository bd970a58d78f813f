//! Plug-in F1 decision engine
//!
//! Turns a distribution over label sets into the set with the largest
//! expected F1. The distribution can come from a support set, Monte Carlo
//! samples or isotonically rescaled base-model probabilities.

mod f1;
mod plugin_f1;
mod scaling;

pub use f1::{F1Decision, GeneralF1Predictor};
pub use plugin_f1::{F1Analysis, PluginF1, PluginF1Config, PredictionMode};
pub use scaling::{PMatrixIsotonicScaling, SetIsotonicScaling};
