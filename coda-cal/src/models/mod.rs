//! Data models for coda calibration
//!
//! - Frequency band keys and stacked envelopes
//! - Shared/site/MDAC/magnitude parameter records
//! - Measurement records produced by each pipeline stage
//! - Calibration run state machine

pub mod calibration_run;
pub mod frequency_band;
pub mod measurements;
pub mod parameters;
pub mod waveform;

pub use calibration_run::{CalibrationRun, CalibrationStage, StateTransition};
pub use frequency_band::FrequencyBand;
pub use measurements::{
    PathCalibrationMeasurement, PeakVelocityMeasurement, ShapeMeasurement, SpectraMeasurement,
    SyntheticCoda,
};
pub use parameters::{
    MdacParametersFi, MdacParametersPs, MeasuredMwParameters, ReferenceMwParameters,
    SharedFrequencyBandParameters, SiteFrequencyBandParameters,
};
pub use waveform::{Event, PickType, Station, Stream, Waveform, WaveformPick};
