//! Probability calibration
//!
//! Provides:
//! - Isotonic regression (weighted pool adjacent violators)
//! - Per-label marginal calibration
//! - Candidate-set calibration over vectorized instances
//! - Calibration quality measures (ECE, MCE, Brier score, sharpness)

mod isotonic;
mod label;
mod metrics;
mod set;

pub use isotonic::IsotonicRegression;
pub use label::{IsotonicLabelCalibrator, LabelCalibrator, LabelCalibratorKind};
pub use metrics::{
    brier_score, calibration_report, expected_calibration_error, maximum_calibration_error,
    reliability_diagram, CalibrationReport, ReliabilityDiagram,
};
pub use set::{
    CardinalityIsotonicCalibrator, CardinalityIsotonicConfig, IdentityVectorCalibrator,
    IsotonicVectorCalibrator, SetCalibratorKind, VectorCalibrator,
};
