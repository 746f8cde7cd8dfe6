//! Moment magnitude from event-level coda spectra
//!
//! Each event's per-band amplitude estimates (log10 dyne-cm) are matched
//! against MDAC moment-rate spectra by a weighted CVRMSD misfit. With two or
//! more usable bands the fit solves for Mw and apparent stress with Powell's
//! method, falling back to a grid search when the optimizer fails. A single
//! band cannot separate the two, so apparent stress is held at the MDAC
//! sigma and only Mw is searched.

use crate::config::MwFitConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{FrequencyBand, MdacParametersFi, MdacParametersPs, MeasuredMwParameters};
use crate::numerics::stats::{cvrmsd, MeanAccumulator};
use crate::numerics::{BrentOptimizer, PowellOptimizer};
use crate::services::mdac::SourceSpectrumModel;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

const POWELL_TOLERANCE: f64 = 1e-5;
const POWELL_MAX_EVALUATIONS: usize = 100_000;
const BRENT_REL: f64 = 1e-10;
const BRENT_ABS: f64 = 1e-12;
const BRENT_MAX_EVALUATIONS: usize = 10_000;
const BOUND_PENALTY: f64 = 1000.0;

/// Band weights by rank of center frequency when an event has no stress constraint
const RANK_WEIGHTS: [f64; 4] = [0.5, 1.0, 0.5, 0.25];
const TAIL_WEIGHT: f64 = 0.1;

/// Event-level per-band amplitude estimates
#[derive(Debug, Clone, Default)]
pub struct EventSpectrumEstimate {
    pub event_id: String,
    /// Mean source amplitude (log10 dyne-cm) over contributing stations
    pub bands: BTreeMap<FrequencyBand, MeanAccumulator>,
    /// Weight all bands equally (events with a known stress drop)
    pub uniform_weights: bool,
}

/// Fits magnitudes to event spectra
pub trait MwCalculator: Send + Sync {
    /// One measurement per event that has at least one positive band estimate
    fn measure_mws(
        &self,
        estimates: &[EventSpectrumEstimate],
        phase: &str,
    ) -> CalibrationResult<Vec<MeasuredMwParameters>>;
}

/// Default MDAC spectral fitter
pub struct SpectralMwFitter {
    model: Arc<dyn SourceSpectrumModel>,
    fi: MdacParametersFi,
    ps_by_phase: HashMap<String, MdacParametersPs>,
    config: MwFitConfig,
}

#[derive(Debug, Clone, Copy)]
struct BandPoint {
    frequency: f64,
    amplitude: f64,
    weight: f64,
}

#[derive(Debug, Clone, Copy)]
struct Fit {
    mw: f64,
    stress: f64,
    misfit: f64,
}

impl SpectralMwFitter {
    /// Create a fitter
    ///
    /// # Arguments
    /// * `model` - Source spectrum evaluated during the fit
    /// * `fi` - Frequency-independent MDAC constants
    /// * `ps` - Per-phase MDAC constants, matched case-insensitively
    /// * `config` - Magnitude and stress search ranges, grid size
    pub fn new(
        model: Arc<dyn SourceSpectrumModel>,
        fi: MdacParametersFi,
        ps: impl IntoIterator<Item = MdacParametersPs>,
        config: MwFitConfig,
    ) -> Self {
        let ps_by_phase = ps
            .into_iter()
            .map(|p| (p.phase.to_ascii_uppercase(), p))
            .collect();
        Self {
            model,
            fi,
            ps_by_phase,
            config,
        }
    }

    fn band_points(estimate: &EventSpectrumEstimate) -> (Vec<BandPoint>, usize) {
        let mut data_count = 0;
        let mut points: Vec<BandPoint> = estimate
            .bands
            .iter()
            .filter_map(|(band, accumulator)| {
                let amplitude = accumulator.mean()?;
                if amplitude <= 0.0 {
                    return None;
                }
                data_count += accumulator.count();
                Some(BandPoint {
                    frequency: band.center_frequency(),
                    amplitude,
                    weight: 1.0,
                })
            })
            .collect();
        points.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));

        if !estimate.uniform_weights {
            for (rank, point) in points.iter_mut().enumerate() {
                point.weight = RANK_WEIGHTS.get(rank).copied().unwrap_or(TAIL_WEIGHT);
            }
        }
        (points, data_count)
    }

    fn misfit(&self, ps: &MdacParametersPs, points: &[BandPoint], mw: f64, stress: f64) -> f64 {
        let (observed, predicted): (Vec<f64>, Vec<f64>) = points
            .iter()
            .map(|p| {
                let model = self.model.log_moment_rate(ps, &self.fi, p.frequency, mw, Some(stress));
                (p.amplitude * p.weight, model * p.weight)
            })
            .unzip();
        cvrmsd(&observed, &predicted)
    }

    /// Misfit at the clamped point plus a quadratic bound penalty
    fn bounded_misfit(&self, ps: &MdacParametersPs, points: &[BandPoint], x: &[f64]) -> f64 {
        let c = &self.config;
        let mw = x[0].clamp(c.min_mw, c.max_mw);
        let stress = x[1].clamp(c.min_stress, c.max_stress);
        let excess = (x[0] - mw).powi(2) + (x[1] - stress).powi(2);
        self.misfit(ps, points, mw, stress) + BOUND_PENALTY * excess
    }

    fn fit_mw_only(&self, ps: &MdacParametersPs, points: &[BandPoint]) -> CalibrationResult<Fit> {
        let c = &self.config;
        let stress = self.fi.sigma.clamp(c.min_stress, c.max_stress);
        let brent = BrentOptimizer::new(BRENT_REL, BRENT_ABS)?;
        let best = brent.minimize(
            |mw| self.misfit(ps, points, mw, stress),
            c.min_mw,
            c.max_mw,
            0.5 * (c.min_mw + c.max_mw),
            BRENT_MAX_EVALUATIONS,
        )?;
        Ok(Fit {
            mw: best.point,
            stress,
            misfit: best.value,
        })
    }

    fn fit_mw_and_stress(&self, ps: &MdacParametersPs, points: &[BandPoint]) -> Fit {
        let c = &self.config;
        let start = [
            0.5 * (c.min_mw + c.max_mw),
            self.fi.sigma.clamp(c.min_stress, c.max_stress),
        ];
        let powell = PowellOptimizer::new(POWELL_TOLERANCE, POWELL_TOLERANCE, POWELL_MAX_EVALUATIONS)
            .and_then(|optimizer| optimizer.minimize(|x| self.bounded_misfit(ps, points, x), &start));

        match powell {
            Ok(outcome) if outcome.value.is_finite() => {
                let mw = outcome.point[0].clamp(c.min_mw, c.max_mw);
                let stress = outcome.point[1].clamp(c.min_stress, c.max_stress);
                Fit {
                    mw,
                    stress,
                    misfit: self.misfit(ps, points, mw, stress),
                }
            }
            Ok(_) | Err(_) => {
                warn!("Failed to converge while fitting Mw, falling back to a grid search");
                self.grid_search(ps, points)
            }
        }
    }

    fn grid_search(&self, ps: &MdacParametersPs, points: &[BandPoint]) -> Fit {
        let c = &self.config;
        let steps = c.grid_points.max(2);
        let mw_step = (c.max_mw - c.min_mw) / (steps - 1) as f64;
        let stress_step = (c.max_stress - c.min_stress) / (steps - 1) as f64;

        let mut best = Fit {
            mw: c.min_mw,
            stress: c.min_stress,
            misfit: f64::MAX,
        };
        for i in 0..steps {
            let mw = c.min_mw + i as f64 * mw_step;
            for j in 0..steps {
                let stress = c.min_stress + j as f64 * stress_step;
                let misfit = self.misfit(ps, points, mw, stress);
                if misfit < best.misfit {
                    best = Fit { mw, stress, misfit };
                }
            }
        }
        best
    }

    fn fit_event(
        &self,
        ps: &MdacParametersPs,
        estimate: &EventSpectrumEstimate,
    ) -> Option<MeasuredMwParameters> {
        let (points, data_count) = Self::band_points(estimate);
        if points.is_empty() {
            debug!(event_id = %estimate.event_id, "No positive band estimates, skipping Mw fit");
            return None;
        }

        let fit = if points.len() < 2 {
            match self.fit_mw_only(ps, &points) {
                Ok(fit) => fit,
                Err(e) => {
                    warn!(event_id = %estimate.event_id, "Mw fit failed: {}", e);
                    return None;
                }
            }
        } else {
            self.fit_mw_and_stress(ps, &points)
        };

        Some(MeasuredMwParameters {
            event_id: estimate.event_id.clone(),
            mw: fit.mw,
            apparent_stress_in_mpa: fit.stress,
            misfit: fit.misfit,
            data_count,
        })
    }
}

impl MwCalculator for SpectralMwFitter {
    fn measure_mws(
        &self,
        estimates: &[EventSpectrumEstimate],
        phase: &str,
    ) -> CalibrationResult<Vec<MeasuredMwParameters>> {
        let ps = self
            .ps_by_phase
            .get(&phase.to_ascii_uppercase())
            .ok_or_else(|| {
                CalibrationError::InvalidInput(format!("no MDAC phase parameters for {}", phase))
            })?;

        let mut measured: Vec<MeasuredMwParameters> = estimates
            .par_iter()
            .filter_map(|estimate| self.fit_event(ps, estimate))
            .collect();
        measured.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        Ok(measured)
    }
}
