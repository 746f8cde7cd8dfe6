//! Configuration for coda-cal
//!
//! One TOML document (`coda-cal.toml`) with a `[logging]` section, an
//! optional `root_folder`, and a `[calibration]` tree. Every field has a
//! compiled default, so an empty or missing file is a valid configuration.
//!
//! ```toml
//! root_folder = "/data/coda"
//!
//! [logging]
//! level = "debug"
//!
//! [calibration]
//! phase_velocity = 3.5
//!
//! [calibration.optimizer]
//! seed = 42
//!
//! [[calibration.optimizer.epsilon]]
//! low = 0.5
//! high = 0.7
//! epsilon = 5.5
//! ```

use crate::error::{CalibrationError, CalibrationResult};
use crate::models::FrequencyBand;
use coda_common::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "coda-cal.toml";

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CODA_CAL_CONFIG";

/// Environment variable naming the output root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "CODA_ROOT_FOLDER";

/// Top-level TOML document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodaCalToml {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Output folder for results (overridden by CLI / ENV)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub calibration: CalibrationConfig,
}

/// Calibration tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Phase velocity used by the attenuation term (km/s, default: 3.5)
    #[serde(default = "default_phase_velocity")]
    pub phase_velocity: f64,

    /// Phase used for reference/measured magnitudes (default: "LG")
    #[serde(default = "default_reference_phase")]
    pub reference_phase: String,

    #[serde(default)]
    pub optimizer: OptimizerConfig,

    #[serde(default)]
    pub peak_velocity: PeakVelocityConfig,

    #[serde(default)]
    pub synthetics: SyntheticConfig,

    #[serde(default)]
    pub spectra: SpectraConfig,

    #[serde(default)]
    pub shape: ShapeConfig,

    #[serde(default)]
    pub mw_fit: MwFitConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            phase_velocity: default_phase_velocity(),
            reference_phase: default_reference_phase(),
            optimizer: OptimizerConfig::default(),
            peak_velocity: PeakVelocityConfig::default(),
            synthetics: SyntheticConfig::default(),
            spectra: SpectraConfig::default(),
            shape: ShapeConfig::default(),
            mw_fit: MwFitConfig::default(),
        }
    }
}

impl CalibrationConfig {
    /// Reject values the numerical code cannot work with
    pub fn validate(&self) -> CalibrationResult<()> {
        if !(self.phase_velocity > 0.0) {
            return Err(CalibrationError::InvalidInput(format!(
                "phase_velocity must be positive, got {}",
                self.phase_velocity
            )));
        }
        if self.optimizer.starting_points == 0 {
            return Err(CalibrationError::InvalidInput(
                "optimizer.starting_points must be at least 1".to_string(),
            ));
        }
        if !(self.optimizer.tolerance > 0.0) {
            return Err(CalibrationError::InvalidInput(
                "optimizer.tolerance must be positive".to_string(),
            ));
        }
        if !(self.synthetics.dt > 0.0) {
            return Err(CalibrationError::InvalidInput(
                "synthetics.dt must be positive".to_string(),
            ));
        }
        if self.mw_fit.min_mw >= self.mw_fit.max_mw {
            return Err(CalibrationError::InvalidInput(
                "mw_fit.min_mw must be below mw_fit.max_mw".to_string(),
            ));
        }
        Ok(())
    }
}

/// Path correction optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Random starting points per band (default: 5)
    #[serde(default = "default_starting_points")]
    pub starting_points: usize,

    /// Objective evaluation budget per start (default: 2,000,000)
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,

    /// Relative and absolute convergence tolerance (default: 1e-3)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// RNG seed for starting points; None draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,

    /// Site-mean regularization weight for bands not in `epsilon`
    #[serde(default = "default_epsilon")]
    pub default_epsilon: f64,

    /// Per-band site-mean regularization weights
    #[serde(default = "default_epsilon_table")]
    pub epsilon: Vec<EpsilonEntry>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            starting_points: default_starting_points(),
            max_evaluations: default_max_evaluations(),
            tolerance: default_tolerance(),
            seed: None,
            default_epsilon: default_epsilon(),
            epsilon: default_epsilon_table(),
        }
    }
}

impl OptimizerConfig {
    /// Regularization weight for a band
    pub fn epsilon_for(&self, band: &FrequencyBand) -> f64 {
        self.epsilon
            .iter()
            .find(|entry| entry.band() == *band)
            .map(|entry| entry.epsilon)
            .unwrap_or(self.default_epsilon)
    }
}

/// Regularization weight for one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonEntry {
    pub low: f64,
    pub high: f64,
    pub epsilon: f64,
}

impl EpsilonEntry {
    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low, self.high)
    }
}

/// Peak velocity / SNR measurement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeakVelocityConfig {
    /// Distance (km) separating near and far group-velocity windows
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,
    /// Far window fast/slow group velocities (km/s)
    #[serde(default = "default_far_fast")]
    pub far_fast_velocity: f64,
    #[serde(default = "default_far_slow")]
    pub far_slow_velocity: f64,
    /// Near window fast/slow group velocities (km/s)
    #[serde(default = "default_near_fast")]
    pub near_fast_velocity: f64,
    #[serde(default = "default_near_slow")]
    pub near_slow_velocity: f64,
    /// Noise window offset from begin/origin (seconds)
    #[serde(default = "default_noise_offset")]
    pub noise_window_offset: f64,
    /// Noise window ends at origin + distance / this value
    #[serde(default = "default_noise_denominator")]
    pub noise_velocity_denominator: f64,
}

impl Default for PeakVelocityConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            far_fast_velocity: default_far_fast(),
            far_slow_velocity: default_far_slow(),
            near_fast_velocity: default_near_fast(),
            near_slow_velocity: default_near_slow(),
            noise_window_offset: default_noise_offset(),
            noise_velocity_denominator: default_noise_denominator(),
        }
    }
}

/// Synthetic coda generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Synthetic sample interval (seconds, default: 1.0)
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Snap coda start to the observed peak within this many seconds
    #[serde(default = "default_snap_tolerance")]
    pub peak_snap_tolerance: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            dt: default_dt(),
            peak_snap_tolerance: default_snap_tolerance(),
        }
    }
}

/// Spectral measurement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectraConfig {
    /// Window after modeled coda start searched for the peak (seconds)
    #[serde(default = "default_peak_search_window")]
    pub peak_search_window: f64,
}

impl Default for SpectraConfig {
    fn default() -> Self {
        Self {
            peak_search_window: default_peak_search_window(),
        }
    }
}

/// Coda shape fit and auto-picking settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeConfig {
    #[serde(default = "default_min_beta")]
    pub min_beta: f64,
    #[serde(default = "default_max_beta")]
    pub max_beta: f64,
    #[serde(default = "default_min_gamma")]
    pub min_gamma: f64,
    #[serde(default = "default_max_gamma")]
    pub max_gamma: f64,
    /// Minimum stacks in a band before distance curves are refit
    #[serde(default = "default_min_shape_count")]
    pub min_measurements: usize,
    /// Evaluation budget for each distance-curve fit
    #[serde(default = "default_shape_evaluations")]
    pub max_evaluations: usize,
    /// Auto-picker observation window (seconds)
    #[serde(default = "default_pick_window")]
    pub pick_window: f64,
    /// Auto-picker spike slope threshold (log10 units per sample)
    #[serde(default = "default_spike_slope")]
    pub spike_slope: f64,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            min_beta: default_min_beta(),
            max_beta: default_max_beta(),
            min_gamma: default_min_gamma(),
            max_gamma: default_max_gamma(),
            min_measurements: default_min_shape_count(),
            max_evaluations: default_shape_evaluations(),
            pick_window: default_pick_window(),
            spike_slope: default_spike_slope(),
        }
    }
}

/// Spectral Mw fit settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MwFitConfig {
    /// Lowest magnitude searched
    #[serde(default = "default_min_mw")]
    pub min_mw: f64,
    /// Highest magnitude searched
    #[serde(default = "default_max_mw")]
    pub max_mw: f64,
    /// Apparent stress search range (MPa)
    #[serde(default = "default_min_stress")]
    pub min_stress: f64,
    /// Upper end of the stress range (MPa)
    #[serde(default = "default_max_stress")]
    pub max_stress: f64,
    /// Coarse grid points per axis before refinement
    #[serde(default = "default_grid_points")]
    pub grid_points: usize,
}

impl Default for MwFitConfig {
    fn default() -> Self {
        Self {
            min_mw: default_min_mw(),
            max_mw: default_max_mw(),
            min_stress: default_min_stress(),
            max_stress: default_max_stress(),
            grid_points: default_grid_points(),
        }
    }
}

// Default value functions
fn default_phase_velocity() -> f64 {
    3.5
}

fn default_reference_phase() -> String {
    "LG".to_string()
}

fn default_starting_points() -> usize {
    5
}

fn default_max_evaluations() -> usize {
    2_000_000
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_epsilon() -> f64 {
    5.0
}

fn default_epsilon_table() -> Vec<EpsilonEntry> {
    [
        (0.02, 0.03, 8.0),
        (0.03, 0.05, 8.0),
        (0.05, 0.1, 5.0),
        (0.1, 0.2, 5.0),
        (0.2, 0.3, 5.0),
        (0.3, 0.5, 5.0),
        (0.5, 0.7, 5.5),
        (0.7, 1.0, 5.8),
        (1.0, 1.5, 5.6),
        (1.5, 2.0, 5.4),
        (2.0, 3.0, 5.5),
        (3.0, 4.0, 5.3),
        (4.0, 6.0, 6.3),
        (6.0, 8.0, 6.3),
        (8.0, 10.0, 6.0),
        (10.0, 15.0, 2.0),
    ]
    .iter()
    .map(|&(low, high, epsilon)| EpsilonEntry { low, high, epsilon })
    .collect()
}

fn default_distance_threshold() -> f64 {
    300.0
}

fn default_far_fast() -> f64 {
    4.7
}

fn default_far_slow() -> f64 {
    2.3
}

fn default_near_fast() -> f64 {
    3.9
}

fn default_near_slow() -> f64 {
    1.9
}

fn default_noise_offset() -> f64 {
    20.0
}

fn default_noise_denominator() -> f64 {
    10.0
}

fn default_dt() -> f64 {
    1.0
}

fn default_snap_tolerance() -> f64 {
    5.0
}

fn default_peak_search_window() -> f64 {
    30.0
}

fn default_min_beta() -> f64 {
    -4.0
}

fn default_max_beta() -> f64 {
    -0.0001
}

fn default_min_gamma() -> f64 {
    0.001
}

fn default_max_gamma() -> f64 {
    4.0
}

fn default_min_shape_count() -> usize {
    3
}

fn default_shape_evaluations() -> usize {
    50_000
}

fn default_pick_window() -> f64 {
    40.0
}

fn default_spike_slope() -> f64 {
    0.1
}

fn default_min_mw() -> f64 {
    0.01
}

fn default_max_mw() -> f64 {
    10.0
}

fn default_min_stress() -> f64 {
    0.01
}

fn default_max_stress() -> f64 {
    10.0
}

fn default_grid_points() -> usize {
    100
}
