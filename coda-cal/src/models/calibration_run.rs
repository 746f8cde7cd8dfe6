//! Calibration run state machine
//!
//! A run progresses STARTING → COMPLETE | ERROR and, while STARTING, walks
//! the pipeline stages in order:
//! VELOCITY → SNR_FILTER → SHAPE → SYNTHETICS → PATH → PATH_SPECTRA → SITE →
//! FINAL_SPECTRA → DONE

use chrono::{DateTime, Utc};
use coda_common::events::CalibrationStatus;
use serde::{Deserialize, Serialize};

/// Pipeline stage of a running calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalibrationStage {
    /// Load band parameters and stacks
    Loading,
    /// Peak velocity / SNR measurement and SNR filtering
    Velocity,
    /// Coda shape fit
    Shape,
    /// Synthetic generation and first spectral measurement
    Synthetics,
    /// Joint path correction fit
    Path,
    /// Spectra re-measured with path corrections
    PathSpectra,
    /// Site correction and Mw estimation
    Site,
    /// Final spectra with site terms
    FinalSpectra,
    /// Completion notification
    Done,
}

impl CalibrationStage {
    /// 1-based stage number
    pub fn number(&self) -> u8 {
        match self {
            CalibrationStage::Loading => 1,
            CalibrationStage::Velocity => 2,
            CalibrationStage::Shape => 3,
            CalibrationStage::Synthetics => 4,
            CalibrationStage::Path => 5,
            CalibrationStage::PathSpectra => 6,
            CalibrationStage::Site => 7,
            CalibrationStage::FinalSpectra => 8,
            CalibrationStage::Done => 9,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CalibrationStage::Loading => "Loading frequency band parameters and stacks",
            CalibrationStage::Velocity => "Measuring peak velocities and filtering by SNR",
            CalibrationStage::Shape => "Fitting coda shape parameters",
            CalibrationStage::Synthetics => "Generating synthetics and measuring raw spectra",
            CalibrationStage::Path => "Fitting path corrections",
            CalibrationStage::PathSpectra => "Measuring path corrected spectra",
            CalibrationStage::Site => "Computing site corrections and moment magnitudes",
            CalibrationStage::FinalSpectra => "Measuring site corrected spectra",
            CalibrationStage::Done => "Calibration complete",
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: u64,
    pub old_state: CalibrationStatus,
    pub new_state: CalibrationStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One calibration attempt (in-memory state)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationRun {
    /// Monotonic run identifier
    pub run_id: u64,

    /// Current status
    pub state: CalibrationStatus,

    /// Current pipeline stage (None before the first stage)
    pub stage: Option<CalibrationStage>,

    /// Whether end picks may be generated automatically
    pub auto_picking: bool,

    /// Failure cause for ERROR runs
    pub cause: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Set on COMPLETE or ERROR
    pub ended_at: Option<DateTime<Utc>>,
}

impl CalibrationRun {
    pub fn new(run_id: u64, auto_picking: bool) -> Self {
        Self {
            run_id,
            state: CalibrationStatus::Starting,
            stage: None,
            auto_picking,
            cause: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: CalibrationStatus) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }

    /// Record a failure and move to ERROR
    pub fn fail(&mut self, cause: impl Into<String>) -> StateTransition {
        self.cause = Some(cause.into());
        self.transition_to(CalibrationStatus::Error)
    }

    pub fn enter_stage(&mut self, stage: CalibrationStage) {
        self.stage = Some(stage);
    }

    /// Check if run is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_starting() {
        let run = CalibrationRun::new(4, true);
        assert_eq!(run.state, CalibrationStatus::Starting);
        assert!(run.stage.is_none());
        assert!(!run.is_terminal());
        assert!(run.ended_at.is_none());
    }

    #[test]
    fn test_terminal_transition_sets_end_time() {
        let mut run = CalibrationRun::new(1, false);
        let transition = run.transition_to(CalibrationStatus::Complete);
        assert_eq!(transition.old_state, CalibrationStatus::Starting);
        assert_eq!(transition.new_state, CalibrationStatus::Complete);
        assert!(run.is_terminal());
        assert!(run.ended_at.is_some());
    }

    #[test]
    fn test_fail_records_cause() {
        let mut run = CalibrationRun::new(2, false);
        run.enter_stage(CalibrationStage::Path);
        run.fail("optimizer exploded");
        assert_eq!(run.state, CalibrationStatus::Error);
        assert_eq!(run.cause.as_deref(), Some("optimizer exploded"));
        assert_eq!(run.stage, Some(CalibrationStage::Path));
    }

    #[test]
    fn test_stage_numbers_are_sequential() {
        let stages = [
            CalibrationStage::Loading,
            CalibrationStage::Velocity,
            CalibrationStage::Shape,
            CalibrationStage::Synthetics,
            CalibrationStage::Path,
            CalibrationStage::PathSpectra,
            CalibrationStage::Site,
            CalibrationStage::FinalSpectra,
            CalibrationStage::Done,
        ];
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.number() as usize, i + 1);
        }
    }
}
