//! coda-cal library interface
//!
//! Coda amplitude calibration: per-band shape, path and site models fit to
//! stacked coda envelopes, and moment magnitudes from the calibrated
//! spectra. The binary wraps [`workflow::CalibrationJobController`] in a
//! command-line front end.

pub mod config;
pub mod error;
pub mod models;
pub mod numerics;
pub mod repository;
pub mod services;
pub mod workflow;

pub use crate::error::{CalibrationError, CalibrationResult};
pub use crate::repository::{CalibrationDataset, CalibrationRepositories};
pub use crate::workflow::{CalibrationJobController, CalibrationOutcome, CalibrationServices};
