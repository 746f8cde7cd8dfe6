//! MDAC2 source spectrum model
//!
//! Moment and Distance Amplitude Corrections after Walter and Taylor. Only
//! the source terms are evaluated here; path and site terms come from the
//! calibration itself.

use crate::models::{MdacParametersFi, MdacParametersPs};
use std::f64::consts::PI;

/// Converts N-m moments to log10 dyne-cm
pub const DYNE_LOG10_ADJUSTMENT: f64 = 7.0;

pub const MPA_TO_PA: f64 = 1e6;

/// Index of the angular corner frequency in a source spectrum
pub const ANGULAR_CORNER_FREQUENCY_INDEX: usize = 3;

pub fn mw_to_log_m0(mw: f64) -> f64 {
    1.5 * mw + 9.1
}

/// Seismic moment (N-m) for a moment magnitude
pub fn mw_to_m0(mw: f64) -> f64 {
    10f64.powf(mw_to_log_m0(mw))
}

pub fn log_m0_to_mw(log_m0: f64) -> f64 {
    (log_m0 - 9.1) / 1.5
}

/// P phases use the P-wave radiation pattern and velocities, all others S
pub fn is_p_phase(phase: &str) -> bool {
    phase.eq_ignore_ascii_case("PN") || phase.eq_ignore_ascii_case("PG")
}

/// Evaluates theoretical source spectra
pub trait SourceSpectrumModel: Send + Sync {
    /// Source spectrum at `frequency` (Hz) for magnitude `mw`
    ///
    /// Returns `[log10 amplitude, M0 / (1 + (w/wc)^2), w * M0 / (1 + (w/wc)^2), wc]`.
    /// `distance` is accepted for interface compatibility; a negative value
    /// means unused.
    fn source_spectrum(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        frequency: f64,
        mw: f64,
        distance: f64,
    ) -> [f64; 4];

    /// log10 moment-rate amplitude (dyne-cm) at `frequency`
    ///
    /// With `apparent_stress_mpa` the stress is taken as given with no moment
    /// scaling (psi = 0); otherwise the FI sigma and psi apply.
    fn log_moment_rate(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        frequency: f64,
        mw: f64,
        apparent_stress_mpa: Option<f64>,
    ) -> f64;

    /// Corner frequency (Hz) for a magnitude at a fixed apparent stress
    fn corner_frequency(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        mw: f64,
        apparent_stress_mpa: f64,
    ) -> f64 {
        let mut fixed = fi.clone();
        fixed.sigma = apparent_stress_mpa;
        fixed.psi = 0.0;
        self.source_spectrum(ps, &fixed, 1.0, mw, -1.0)[ANGULAR_CORNER_FREQUENCY_INDEX] / (2.0 * PI)
    }
}

/// Default MDAC2 evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct MdacCalculator;

impl MdacCalculator {
    /// Walter-Taylor K from radiation patterns and source velocities
    pub fn calculate_k(zeta: f64, alpha_s: f64, beta_s: f64, rad_pat_p: f64, rad_pat_s: f64) -> f64 {
        let p_term = rad_pat_p * rad_pat_p * zeta.powi(3) / alpha_s.powi(5);
        let s_term = rad_pat_s * rad_pat_s / beta_s.powi(5);
        16.0 * PI / (beta_s * beta_s * (p_term + s_term))
    }

    fn k(fi: &MdacParametersFi) -> f64 {
        Self::calculate_k(fi.zeta, fi.alphas, fi.betas, fi.rad_pat_p, fi.rad_pat_s)
    }

    /// Apparent stress (Pa) scaled from the reference moment
    fn apparent_stress(fi: &MdacParametersFi, m0: f64) -> f64 {
        MPA_TO_PA * fi.sigma * (m0 / fi.m0ref).powf(fi.psi)
    }

    /// Apparent stress (MPa) implied by a magnitude and corner frequency (Hz)
    pub fn apparent_stress_from_corner(fi: &MdacParametersFi, mw: f64, corner_frequency: f64) -> f64 {
        let wc3 = (2.0 * PI * corner_frequency).powi(3);
        wc3 * mw_to_m0(mw) / Self::k(fi) / MPA_TO_PA
    }
}

impl SourceSpectrumModel for MdacCalculator {
    fn source_spectrum(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        frequency: f64,
        mw: f64,
        _distance: f64,
    ) -> [f64; 4] {
        let m0 = mw_to_m0(mw);
        let wcs = (Self::k(fi) * Self::apparent_stress(fi, m0) / m0).cbrt();

        let (radiation, wc, source_velocity_5, receiver_velocity) = if is_p_phase(&ps.phase) {
            (fi.rad_pat_p, fi.zeta * wcs, fi.alphas.powi(5), fi.alpha_r)
        } else {
            (fi.rad_pat_s, wcs, fi.betas.powi(5), fi.beta_r)
        };

        // Aki and Richards: S0 = F * M0
        let f = radiation / (4.0 * PI * (fi.rhos * fi.rhor * source_velocity_5 * receiver_velocity).sqrt());
        let log_s0 = (f * m0).log10();

        let w = 2.0 * PI * frequency;
        let wwc = 1.0 + (w / wc).powi(2);
        let displacement = m0 / wwc;
        [log_s0 - wwc.log10(), displacement, displacement * w, wc]
    }

    fn log_moment_rate(
        &self,
        ps: &MdacParametersPs,
        fi: &MdacParametersFi,
        frequency: f64,
        mw: f64,
        apparent_stress_mpa: Option<f64>,
    ) -> f64 {
        let m0 = mw_to_m0(mw);
        let (sigma, psi) = match apparent_stress_mpa {
            Some(stress) => (stress, 0.0),
            None => (fi.sigma, fi.psi),
        };

        let scale = (Self::k(fi) * MPA_TO_PA * sigma / fi.m0ref.powf(psi)).cbrt();
        let mut corner = scale * m0.powf((psi - 1.0) / 3.0);
        if is_p_phase(&ps.phase) {
            corner *= fi.zeta;
        }

        let ratio = 2.0 * PI * frequency / corner;
        (m0 / (1.0 + ratio * ratio)).log10() + DYNE_LOG10_ADJUSTMENT
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn fi() -> MdacParametersFi {
        MdacParametersFi {
            sigma: 0.3,
            del_sigma: 0.0,
            psi: 0.0,
            del_psi: 0.0,
            zeta: 1.0,
            m0ref: 1e16,
            alphas: 6000.0,
            betas: 3500.0,
            rhos: 2700.0,
            rad_pat_p: 0.44,
            rad_pat_s: 0.6,
            alpha_r: 6000.0,
            beta_r: 3500.0,
            rhor: 2700.0,
        }
    }

    pub(crate) fn lg() -> MdacParametersPs {
        MdacParametersPs {
            phase: "LG".to_string(),
            q0: 0.0,
            del_q0: 0.0,
            gamma0: 0.0,
            del_gamma0: 0.0,
            u0: 0.0,
            eta: 0.0,
            del_eta: 0.0,
            dist_crit: 0.0,
            snr: 0.0,
        }
    }

    #[test]
    fn test_moment_conversions() {
        assert!((mw_to_log_m0(4.0) - 15.1).abs() < 1e-12);
        assert!((log_m0_to_mw(mw_to_log_m0(5.3)) - 5.3).abs() < 1e-12);
    }

    #[test]
    fn test_low_frequency_limit_is_moment() {
        let spectrum = MdacCalculator.source_spectrum(&lg(), &fi(), 1e-6, 4.0, -1.0);
        assert!((spectrum[1].log10() - 15.1).abs() < 1e-6);
    }

    #[test]
    fn test_half_amplitude_at_corner() {
        let model = MdacCalculator;
        let corner = model.corner_frequency(&lg(), &fi(), 4.0, 0.3);
        let spectrum = model.source_spectrum(&lg(), &fi(), corner, 4.0, -1.0);
        assert!((spectrum[1] / mw_to_m0(4.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_log_moment_rate_matches_source_spectrum_with_zero_psi() {
        let model = MdacCalculator;
        let from_spectrum = model.source_spectrum(&lg(), &fi(), 0.6, 4.0, -1.0)[1].log10() + 7.0;
        let from_rate = model.log_moment_rate(&lg(), &fi(), 0.6, 4.0, None);
        assert!((from_spectrum - from_rate).abs() < 1e-9);
        let with_stress = model.log_moment_rate(&lg(), &fi(), 0.6, 4.0, Some(0.3));
        assert!((with_stress - from_rate).abs() < 1e-9);
    }

    #[test]
    fn test_higher_stress_raises_corner() {
        let model = MdacCalculator;
        let low = model.corner_frequency(&lg(), &fi(), 4.0, 0.1);
        let high = model.corner_frequency(&lg(), &fi(), 4.0, 1.0);
        assert!(high > low);
    }

    #[test]
    fn test_apparent_stress_from_corner_round_trip() {
        let corner = MdacCalculator.corner_frequency(&lg(), &fi(), 4.5, 2.0);
        let stress = MdacCalculator::apparent_stress_from_corner(&fi(), 4.5, corner);
        assert!((stress - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_p_phase_selection() {
        assert!(is_p_phase("Pn"));
        assert!(is_p_phase("PG"));
        assert!(!is_p_phase("LG"));
    }
}
