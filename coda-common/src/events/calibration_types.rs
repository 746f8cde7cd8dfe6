//! Calibration run type definitions
//!
//! Supporting types for calibration status and progress notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of one calibration run
///
/// A run starts in `Starting` and ends in exactly one of the two terminal
/// states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CalibrationStatus {
    /// Accepted and executing
    Starting,
    /// Finished every stage
    Complete,
    /// Rejected or failed
    Error,
}

impl CalibrationStatus {
    /// Check if status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, CalibrationStatus::Complete | CalibrationStatus::Error)
    }
}

impl fmt::Display for CalibrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalibrationStatus::Starting => "STARTING",
            CalibrationStatus::Complete => "COMPLETE",
            CalibrationStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Outcome attached to a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Whether the run produced results
    pub success: bool,
    /// Human-readable failure cause (None on success)
    pub cause: Option<String>,
}

impl RunResult {
    pub fn success() -> Self {
        Self {
            success: true,
            cause: None,
        }
    }

    pub fn failure(cause: impl Into<String>) -> Self {
        Self {
            success: false,
            cause: Some(cause.into()),
        }
    }
}

/// Per-band path fit summary carried on progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandFitSummary {
    pub low_frequency: f64,
    pub high_frequency: f64,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub converged: bool,
}
