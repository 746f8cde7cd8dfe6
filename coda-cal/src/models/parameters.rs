//! Calibration parameter records
//!
//! Shared per-band model coefficients, per-station site terms, MDAC source
//! model constants, and event magnitude records.

use super::{FrequencyBand, Station};
use serde::{Deserialize, Serialize};

/// Per-band shape and path model coefficients
///
/// Velocity, beta and gamma follow `x(r) = x0 - x1 / (x2 + r)`; S1/S2/Xc/Xt/Q
/// parameterize the Extended Street-Herrmann path correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFrequencyBandParameters {
    /// Lower band edge (Hz)
    pub low_frequency: f64,
    /// Upper band edge (Hz)
    pub high_frequency: f64,

    /// Coda start group velocity: asymptote (km/s)
    #[serde(default)]
    pub velocity0: f64,
    /// Coda start group velocity: distance scale
    #[serde(default)]
    pub velocity1: f64,
    /// Coda start group velocity: distance offset (km)
    #[serde(default)]
    pub velocity2: f64,

    /// Coda decay (linear term): asymptote
    #[serde(default)]
    pub beta0: f64,
    /// Coda decay: distance scale
    #[serde(default)]
    pub beta1: f64,
    /// Coda decay: distance offset (km)
    #[serde(default)]
    pub beta2: f64,

    /// Coda spreading (log term): asymptote
    #[serde(default)]
    pub gamma0: f64,
    /// Coda spreading: distance scale
    #[serde(default)]
    pub gamma1: f64,
    /// Coda spreading: distance offset (km)
    #[serde(default)]
    pub gamma2: f64,

    /// Minimum peak SNR (log10 units) for a stack to be used
    #[serde(default)]
    pub min_snr: f64,

    /// Near-field geometric spreading exponent
    #[serde(default)]
    pub s1: f64,
    /// Far-field geometric spreading exponent (default: 1.0)
    #[serde(default = "default_s2")]
    pub s2: f64,
    /// Spreading crossover distance (km)
    #[serde(default)]
    pub xc: f64,
    /// Width factor of the crossover transition
    #[serde(default)]
    pub xt: f64,
    /// Attenuation quality factor (0 = uncalibrated)
    #[serde(default)]
    pub q: f64,

    /// Minimum coda window length (seconds)
    #[serde(default)]
    pub min_length: f64,
    /// Maximum coda window length (seconds)
    #[serde(default = "default_max_length")]
    pub max_length: f64,
    /// Coda measurement time (seconds after coda start, default: 100)
    #[serde(default = "default_measurement_time")]
    pub measurement_time: f64,
}

fn default_s2() -> f64 {
    1.0
}

fn default_max_length() -> f64 {
    1000.0
}

fn default_measurement_time() -> f64 {
    100.0
}

impl SharedFrequencyBandParameters {
    /// Parameters for a band with everything else at its default
    pub fn for_band(band: FrequencyBand) -> Self {
        Self {
            low_frequency: band.low(),
            high_frequency: band.high(),
            velocity0: 0.0,
            velocity1: 0.0,
            velocity2: 0.0,
            beta0: 0.0,
            beta1: 0.0,
            beta2: 0.0,
            gamma0: 0.0,
            gamma1: 0.0,
            gamma2: 0.0,
            min_snr: 0.0,
            s1: 0.0,
            s2: default_s2(),
            xc: 0.0,
            xt: 0.0,
            q: 0.0,
            min_length: 0.0,
            max_length: default_max_length(),
            measurement_time: default_measurement_time(),
        }
    }

    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low_frequency, self.high_frequency)
    }
}

/// Per (station, band) log-amplitude site correction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteFrequencyBandParameters {
    /// Lower band edge (Hz)
    pub low_frequency: f64,
    /// Upper band edge (Hz)
    pub high_frequency: f64,
    /// Station the term applies to
    pub station: Station,
    /// Log10 amplitude added to path-corrected amplitudes
    pub site_term: f64,
}

impl SiteFrequencyBandParameters {
    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low_frequency, self.high_frequency)
    }
}

/// MDAC frequency-independent source constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdacParametersFi {
    /// Apparent stress (MPa)
    pub sigma: f64,
    #[serde(default)]
    pub del_sigma: f64,
    /// Stress scaling exponent
    pub psi: f64,
    #[serde(default)]
    pub del_psi: f64,
    /// P/S corner frequency ratio
    pub zeta: f64,
    /// Reference moment (N-m)
    pub m0ref: f64,
    /// Source-region P velocity (m/s)
    pub alphas: f64,
    /// Source-region S velocity (m/s)
    pub betas: f64,
    /// Source-region density (kg/m^3)
    pub rhos: f64,
    pub rad_pat_p: f64,
    pub rad_pat_s: f64,
    /// Receiver-region P velocity (m/s)
    pub alpha_r: f64,
    /// Receiver-region S velocity (m/s)
    pub beta_r: f64,
    /// Receiver-region density (kg/m^3)
    pub rhor: f64,
}

/// MDAC per-phase constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdacParametersPs {
    pub phase: String,
    #[serde(default)]
    pub q0: f64,
    #[serde(default)]
    pub del_q0: f64,
    #[serde(default)]
    pub gamma0: f64,
    #[serde(default)]
    pub del_gamma0: f64,
    #[serde(default)]
    pub u0: f64,
    #[serde(default)]
    pub eta: f64,
    #[serde(default)]
    pub del_eta: f64,
    #[serde(default)]
    pub dist_crit: f64,
    #[serde(default)]
    pub snr: f64,
}

/// Independently known magnitude for a reference event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMwParameters {
    pub event_id: String,
    pub ref_mw: f64,
    /// Optional apparent stress override (MPa)
    #[serde(default)]
    pub ref_apparent_stress_in_mpa: Option<f64>,
}

/// Magnitude estimated by the calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMwParameters {
    pub event_id: String,
    pub mw: f64,
    pub apparent_stress_in_mpa: f64,
    /// Weighted RMS misfit of the spectral fit
    pub misfit: f64,
    /// Station-band observations behind the fit
    pub data_count: usize,
}
