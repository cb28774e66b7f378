//! Error types for gait engine operations.
//!
//! Sample processing itself never fails: gaps, GPS loss and low-confidence
//! windows are absorbed by the pipeline. The variants here cover the API edges
//! that can legitimately reject input.

use thiserror::Error;

/// Main error type for gait engine operations.
#[derive(Error, Debug)]
pub enum GaitError {
    /// Engine configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A per-horse tuning value is outside its accepted range.
    #[error("Invalid tuning: {field} = {value} (expected {min}..={max})")]
    InvalidTuning {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The ride ended without a single usable sample.
    #[error("No data: ride finished without any sensor samples")]
    NoData,

    /// The ingestion session is no longer accepting samples.
    #[error("Session closed")]
    SessionClosed,

    /// The processing task terminated abnormally.
    #[error("Processing task failed: {0}")]
    TaskFailed(String),

    /// Calibration snapshot could not be serialized.
    #[cfg(feature = "serde")]
    #[error("Snapshot serialization error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Result type alias for gait engine operations.
pub type Result<T> = std::result::Result<T, GaitError>;

impl GaitError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid tuning error.
    #[must_use]
    pub const fn invalid_tuning(field: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::InvalidTuning {
            field,
            value,
            min,
            max,
        }
    }

    /// Create a task failure error.
    #[must_use]
    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GaitError::invalid_tuning("canter_sensitivity", 9.0, 0.25, 4.0);
        let msg = err.to_string();
        assert!(msg.contains("canter_sensitivity"));
        assert!(msg.contains('9'));
        assert!(msg.contains("0.25"));
    }

    #[test]
    fn test_error_constructors() {
        let _ = GaitError::invalid_config("test");
        let _ = GaitError::task_failed("join");
        assert_eq!(GaitError::NoData.to_string(), "No data: ride finished without any sensor samples");
        assert_eq!(GaitError::SessionClosed.to_string(), "Session closed");
    }
}
