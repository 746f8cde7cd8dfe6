//! Coda shape calibration
//!
//! Refits the per-band velocity, beta and gamma distance curves:
//!
//! 1. Group velocity `v(r)` from the peak-velocity measurements
//! 2. Optional automatic F picks
//! 3. Per stack, a least squares fit of `c - gamma * log10(t) + beta * t`
//!    over the coda window `[r / v(r), F pick]`
//! 4. Per band, `beta(r)` and `gamma(r)` curves through the stack fits
//!
//! Curve fits minimize a pseudo-Huber loss with Powell's method and keep
//! the previous coefficients when a fit fails or too few stacks exist.

use crate::config::ShapeConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{FrequencyBand, PeakVelocityMeasurement, ShapeMeasurement, SharedFrequencyBandParameters};
use crate::numerics::stats::{least_squares, median};
use crate::numerics::PowellOptimizer;
use crate::services::coda_model::{distance_function, velocity_at};
use crate::services::end_time_picker::{auto_pick_measurements, EndTimePicker};
use crate::services::time_series::TimeSeries;
use coda_common::time::add_seconds;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

const CURVE_TOLERANCE: f64 = 1e-6;
const HUBER_SCALE: f64 = 0.5;
const HUBER_OFFSET: f64 = 0.25;
const BOUND_PENALTY: f64 = 1000.0;
const MAX_X2: f64 = 10_000.0;
const DEFAULT_X2: f64 = 100.0;

/// Output of a shape calibration pass
#[derive(Debug, Clone)]
pub struct ShapeCalibrationResult {
    pub parameters: BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    pub measurements: Vec<ShapeMeasurement>,
    /// Velocity measurements, carrying any new automatic picks
    pub velocities: Vec<PeakVelocityMeasurement>,
}

/// Fits coda shape models to the SNR-filtered stacks
pub trait ShapeCalibrator: Send + Sync {
    fn measure_shapes(
        &self,
        velocities: Vec<PeakVelocityMeasurement>,
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
        auto_picking: bool,
    ) -> CalibrationResult<ShapeCalibrationResult>;
}

/// Default shape calibrator
pub struct CodaShapeCalibrator {
    picker: Arc<dyn EndTimePicker>,
    config: ShapeConfig,
}

impl CodaShapeCalibrator {
    pub fn new(picker: Arc<dyn EndTimePicker>, config: ShapeConfig) -> Self {
        Self { picker, config }
    }

    /// Fit one stack's envelope between modeled coda start and its F pick
    pub fn measure_stack(
        &self,
        measurement: &PeakVelocityMeasurement,
        params: &SharedFrequencyBandParameters,
    ) -> CalibrationResult<ShapeMeasurement> {
        let waveform = &measurement.waveform;
        let shape_error =
            |msg: String| CalibrationError::DataShape(format!("waveform {}: {}", waveform.id, msg));

        let event = waveform
            .event
            .as_ref()
            .ok_or_else(|| shape_error("no event".to_string()))?;
        let end_pick = waveform
            .end_pick()
            .ok_or_else(|| shape_error("no F pick".to_string()))?;

        let distance = measurement.distance;
        let velocity = velocity_at(params, distance);
        let travel_time = if velocity != 0.0 { distance / velocity } else { 0.0 };
        if travel_time >= end_pick.pick_time_sec_from_origin {
            return Err(shape_error(format!(
                "F pick {} precedes modeled coda start {}",
                end_pick.pick_time_sec_from_origin, travel_time
            )));
        }

        let origin = event.origin_time;
        let coda_start = add_seconds(origin, travel_time);
        let mut series = TimeSeries::from_waveform(waveform)
            .cut(coda_start, add_seconds(origin, end_pick.pick_time_sec_from_origin))
            .map_err(|e| shape_error(e.to_string()))?;
        if series.sample_rate() > 1.0 {
            series = series.interpolate(1.0).map_err(|e| shape_error(e.to_string()))?;
        }

        if params.min_length > 0.0 && series.length_seconds() < params.min_length {
            return Err(shape_error(format!(
                "window {} s shorter than minimum {} s",
                series.length_seconds(),
                params.min_length
            )));
        }
        if params.max_length > 0.0 && series.length_seconds() > params.max_length {
            trace!(waveform_id = waveform.id, "Truncating coda window to {} s", params.max_length);
            series = series
                .cut(series.begin_time(), add_seconds(series.begin_time(), params.max_length))
                .map_err(|e| shape_error(e.to_string()))?;
        }

        let fit = self
            .fit_envelope(series.data(), series.sample_rate())
            .ok_or_else(|| shape_error("envelope fit failed".to_string()))?;

        Ok(ShapeMeasurement {
            waveform: Arc::clone(waveform),
            distance,
            measured_gamma: fit.gamma,
            measured_beta: fit.beta,
            measured_intercept: fit.intercept,
            measured_error: fit.error,
            time_difference: measurement.time_sec_from_origin - travel_time,
        })
    }

    /// Least squares envelope fit with beta and gamma held to their bounds
    fn fit_envelope(&self, data: &[f64], sample_rate: f64) -> Option<EnvelopeFit> {
        if data.len() < 3 {
            return None;
        }
        let times: Vec<f64> = (0..data.len()).map(|i| (i + 1) as f64 / sample_rate).collect();
        let rows: Vec<Vec<f64>> = times.iter().map(|&t| vec![1.0, -t.log10(), t]).collect();
        let solution = least_squares(&rows, data)?;

        let c = &self.config;
        let gamma = solution[1].clamp(c.min_gamma, c.max_gamma);
        let beta = solution[2].clamp(c.min_beta, c.max_beta);
        let intercept = if gamma == solution[1] && beta == solution[2] {
            solution[0]
        } else {
            let n = data.len() as f64;
            data.iter()
                .zip(&times)
                .map(|(y, &t)| y + gamma * t.log10() - beta * t)
                .sum::<f64>()
                / n
        };

        let sum_sq: f64 = data
            .iter()
            .zip(&times)
            .map(|(y, &t)| {
                let r = y - (intercept - gamma * t.log10() + beta * t);
                r * r
            })
            .sum();
        let error = (sum_sq / data.len() as f64).sqrt();

        if !(gamma.is_finite() && beta.is_finite() && intercept.is_finite()) {
            return None;
        }
        Some(EnvelopeFit {
            intercept,
            gamma,
            beta,
            error,
        })
    }

    /// Fit `x0 - x1 / (x2 + r)` through (distance, value) points
    ///
    /// Returns None when the fit fails or does not improve on `current`.
    fn fit_distance_curve(&self, points: &[(f64, f64)], current: [f64; 3]) -> Option<[f64; 3]> {
        if points.is_empty() {
            return None;
        }
        let start = if current.iter().any(|&v| v != 0.0) {
            current
        } else {
            let values: Vec<f64> = points.iter().map(|&(_, y)| y).collect();
            [median(&values)?, 0.0, DEFAULT_X2]
        };

        let cost = |x: &[f64]| -> f64 {
            let loss: f64 = points
                .iter()
                .map(|&(d, y)| pseudo_huber(distance_function(x[0], x[1], x[2], d) - y))
                .sum();
            let excess = if x[2] < 0.0 {
                -x[2]
            } else if x[2] > MAX_X2 {
                x[2] - MAX_X2
            } else {
                0.0
            };
            loss + BOUND_PENALTY * excess * excess
        };

        let optimizer =
            PowellOptimizer::new(CURVE_TOLERANCE, CURVE_TOLERANCE, self.config.max_evaluations).ok()?;
        let start_cost = cost(&current[..]);
        match optimizer.minimize(cost, &start) {
            Ok(outcome) if outcome.point.iter().all(|v| v.is_finite()) => {
                if start_cost.is_finite() && outcome.value > start_cost {
                    return None;
                }
                let x2 = outcome.point[2].clamp(0.0, MAX_X2);
                Some([outcome.point[0], outcome.point[1], x2])
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Distance curve fit failed: {}", e);
                None
            }
        }
    }
}

/// Pseudo-Huber loss of a residual
fn pseudo_huber(residual: f64) -> f64 {
    let scaled = residual.abs() / HUBER_SCALE;
    HUBER_OFFSET + ((1.0 + scaled * scaled).sqrt() - 1.0)
}

#[derive(Debug, Clone, Copy)]
struct EnvelopeFit {
    intercept: f64,
    gamma: f64,
    beta: f64,
    error: f64,
}

impl ShapeCalibrator for CodaShapeCalibrator {
    fn measure_shapes(
        &self,
        velocities: Vec<PeakVelocityMeasurement>,
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
        auto_picking: bool,
    ) -> CalibrationResult<ShapeCalibrationResult> {
        let mut parameters = params.clone();
        if parameters.is_empty() {
            warn!("No frequency band parameters; shape calibration skipped");
            return Ok(ShapeCalibrationResult {
                parameters,
                measurements: Vec::new(),
                velocities,
            });
        }

        let mut by_band: BTreeMap<FrequencyBand, Vec<&PeakVelocityMeasurement>> = BTreeMap::new();
        for m in &velocities {
            by_band.entry(m.waveform.band()).or_default().push(m);
        }
        for (band, group) in &by_band {
            let Some(p) = parameters.get_mut(band) else {
                continue;
            };
            if group.len() < self.config.min_measurements {
                debug!(band = %band, count = group.len(), "Too few stacks for velocity fit");
                continue;
            }
            let points: Vec<(f64, f64)> = group.iter().map(|m| (m.distance, m.velocity)).collect();
            if let Some([v0, v1, v2]) =
                self.fit_distance_curve(&points, [p.velocity0, p.velocity1, p.velocity2])
            {
                p.velocity0 = v0;
                p.velocity1 = v1;
                p.velocity2 = v2;
            }
        }

        let velocities = if auto_picking {
            auto_pick_measurements(&velocities, &parameters, self.picker.as_ref())
        } else {
            velocities
        };

        let measurements: Vec<ShapeMeasurement> = velocities
            .par_iter()
            .filter(|m| m.waveform.end_pick().is_some())
            .filter_map(|m| {
                let p = parameters.get(&m.waveform.band())?;
                match self.measure_stack(m, p) {
                    Ok(shape) => Some(shape),
                    Err(e) => {
                        trace!("Shape measurement skipped: {}", e);
                        None
                    }
                }
            })
            .collect();

        let mut shapes_by_band: BTreeMap<FrequencyBand, Vec<&ShapeMeasurement>> = BTreeMap::new();
        for s in &measurements {
            shapes_by_band.entry(s.waveform.band()).or_default().push(s);
        }
        for (band, group) in &shapes_by_band {
            let Some(p) = parameters.get_mut(band) else {
                continue;
            };
            if group.len() < self.config.min_measurements {
                debug!(band = %band, count = group.len(), "Too few shapes for distance curves");
                continue;
            }
            let betas: Vec<(f64, f64)> = group.iter().map(|s| (s.distance, s.measured_beta)).collect();
            if let Some([b0, b1, b2]) = self.fit_distance_curve(&betas, [p.beta0, p.beta1, p.beta2]) {
                p.beta0 = b0;
                p.beta1 = b1;
                p.beta2 = b2;
            }
            let gammas: Vec<(f64, f64)> =
                group.iter().map(|s| (s.distance, s.measured_gamma)).collect();
            if let Some([g0, g1, g2]) =
                self.fit_distance_curve(&gammas, [p.gamma0, p.gamma1, p.gamma2])
            {
                p.gamma0 = g0;
                p.gamma1 = g1;
                p.gamma2 = g2;
            }
        }

        info!(
            stacks = velocities.len(),
            shapes = measurements.len(),
            bands = shapes_by_band.len(),
            "Shape calibration finished"
        );
        Ok(ShapeCalibrationResult {
            parameters,
            measurements,
            velocities,
        })
    }
}
