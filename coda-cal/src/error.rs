//! Error types for coda-cal
//!
//! Failure classes:
//! - rejection of a start request while a run is active
//! - per-band optimizer non-convergence (reported, not fatal)
//! - data-shape failures on individual records (skipped and logged)
//! - unexpected errors that abort the run

use thiserror::Error;

/// Calibration result type
pub type CalibrationResult<T> = std::result::Result<T, CalibrationError>;

/// Calibration error type
#[derive(Debug, Error)]
pub enum CalibrationError {
    /// A run is already in progress
    #[error("Calibration run already in progress")]
    RunInProgress,

    /// Optimizer did not converge
    #[error("Convergence failure: {0}")]
    Convergence(String),

    /// Input record has an unusable shape (missing event/station, empty cut)
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// Invalid configuration or argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Repository access failure
    #[error("Repository error: {0}")]
    Repository(String),

    /// Background task could not be joined
    #[error("Task error: {0}")]
    Task(String),

    /// coda-common error
    #[error("Common error: {0}")]
    Common(#[from] coda_common::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<crate::numerics::NumericsError> for CalibrationError {
    fn from(err: crate::numerics::NumericsError) -> Self {
        CalibrationError::Convergence(err.to_string())
    }
}
