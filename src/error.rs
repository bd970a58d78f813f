//! Error types for multi-label calibration

use thiserror::Error;

/// Result type alias for calibration operations
pub type Result<T> = std::result::Result<T, CalibrateError>;

/// Main error type for the crate
///
/// Every variant is fatal: nothing in this crate retries, and errors are
/// returned to the caller synchronously.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrateError {
    /// Unknown mode string, empty support, or an otherwise unusable setup
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A component required by the active mode was never initialized
    #[error("Model state error: {0}")]
    ModelStateError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Model not fitted")]
    ModelNotFitted,
}

impl CalibrateError {
    pub(crate) fn invalid_parameter(
        name: &str,
        value: impl std::fmt::Display,
        reason: &str,
    ) -> Self {
        CalibrateError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for CalibrateError {
    fn from(err: ndarray::ShapeError) -> Self {
        CalibrateError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalibrateError::ConfigError("support is empty".to_string());
        assert_eq!(err.to_string(), "Configuration error: support is empty");
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = CalibrateError::invalid_parameter("pi_threshold", 1.5, "must lie in [0, 1)");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: pi_threshold = 1.5, must lie in [0, 1)"
        );
    }
}
