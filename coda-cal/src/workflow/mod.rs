//! Calibration workflow
//!
//! - `pipeline`: the nine-stage calibration sequence
//! - `calibration_job`: single-slot background job controller

pub mod calibration_job;
pub mod pipeline;

pub use calibration_job::{CalibrationHandle, CalibrationJobController};
pub use pipeline::{end_picked, CalibrationOutcome, CalibrationPipeline, CalibrationServices};
