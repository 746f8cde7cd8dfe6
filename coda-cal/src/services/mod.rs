//! Calibration services
//!
//! Leaf computations (`spreading`, `coda_model`, `geodesy`, `mdac`,
//! `time_series`) and the stage collaborators built on them. Each stage
//! collaborator is a trait with one default implementation so the pipeline
//! can be driven with stubs.

pub mod coda_model;
pub mod end_time_picker;
pub mod geodesy;
pub mod mdac;
pub mod mw_calculator;
pub mod path_correction;
pub mod peak_velocity;
pub mod shape_calibration;
pub mod site_correction;
pub mod spectra_calculator;
pub mod spreading;
pub mod synthetic_generator;
pub mod time_series;

pub use end_time_picker::{CodaSnrEndTimePicker, EndTimePicker};
pub use geodesy::{DistanceCalculator, Wgs84Distance};
pub use mdac::{MdacCalculator, SourceSpectrumModel};
pub use mw_calculator::{EventSpectrumEstimate, MwCalculator, SpectralMwFitter};
pub use path_correction::{PathCorrectionOptimizer, PathCorrectionResult};
pub use peak_velocity::{filter_by_min_snr, MaxVelocityCalculator, PeakVelocityMeasurer};
pub use shape_calibration::{CodaShapeCalibrator, ShapeCalibrationResult, ShapeCalibrator};
pub use site_correction::{SiteCorrectionEngine, SiteCorrectionResult};
pub use spectra_calculator::{SiteTermMap, SpectraCalculator, SpectraMeasurer};
pub use synthetic_generator::{SyntheticCodaGenerator, SyntheticGenerator};
pub use time_series::TimeSeries;
