//! Peak group velocity and SNR of each stack

use crate::config::PeakVelocityConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{FrequencyBand, PeakVelocityMeasurement, SharedFrequencyBandParameters, Waveform};
use crate::services::geodesy::DistanceCalculator;
use crate::services::time_series::TimeSeries;
use chrono::{DateTime, Utc};
use coda_common::time::{add_seconds, seconds_between};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Measures peak arrivals of stacks
pub trait PeakVelocityMeasurer: Send + Sync {
    /// Stacks that cannot be measured are logged and omitted
    fn measure_peak_velocities(&self, waveforms: &[Arc<Waveform>]) -> Vec<PeakVelocityMeasurement>;
}

/// Finds the envelope peak inside a group-velocity window
///
/// The window is `[d / fast, d / slow]` after origin, with a faster window
/// pair beyond the distance threshold. Noise is the absolute mean of the
/// quieter of two windows: everything after the first `noise_window_offset`
/// seconds of the stack, or the span from just before origin to
/// `origin + d / noise_velocity_denominator`.
pub struct MaxVelocityCalculator {
    distance: Arc<dyn DistanceCalculator>,
    config: PeakVelocityConfig,
}

impl MaxVelocityCalculator {
    pub fn new(distance: Arc<dyn DistanceCalculator>, config: PeakVelocityConfig) -> Self {
        Self { distance, config }
    }

    fn noise_level(&self, series: &TimeSeries, origin: DateTime<Utc>, distance: f64) -> Option<f64> {
        let c = &self.config;
        let late = series
            .cut(add_seconds(series.begin_time(), c.noise_window_offset), series.end_time())
            .ok()
            .and_then(|w| w.mean());
        let early = series
            .cut(
                add_seconds(origin, -c.noise_window_offset),
                add_seconds(origin, distance / c.noise_velocity_denominator),
            )
            .ok()
            .and_then(|w| w.mean());

        let quieter = match (late, early) {
            (Some(a), Some(b)) => Some(if a > b { b } else { a }),
            (a, b) => a.or(b),
        };
        quieter.map(f64::abs)
    }

    /// Measure one stack
    pub fn measure(&self, waveform: &Arc<Waveform>) -> CalibrationResult<PeakVelocityMeasurement> {
        let (event, station) = waveform.event_and_station().ok_or_else(|| {
            CalibrationError::DataShape(format!("waveform {} has no event or station", waveform.id))
        })?;
        let distance = self.distance.distance_km(
            event.latitude,
            event.longitude,
            station.latitude,
            station.longitude,
        );

        let c = &self.config;
        let (fast, slow) = if distance >= c.distance_threshold {
            (c.far_fast_velocity, c.far_slow_velocity)
        } else {
            (c.near_fast_velocity, c.near_slow_velocity)
        };

        let origin = event.origin_time;
        let series = TimeSeries::from_waveform(waveform);
        let shape_error = |msg: String| CalibrationError::DataShape(format!("waveform {}: {}", waveform.id, msg));

        let noise_level = self
            .noise_level(&series, origin, distance)
            .ok_or_else(|| shape_error("no samples in noise windows".to_string()))?;

        let window = series
            .cut(add_seconds(origin, distance / fast), add_seconds(origin, distance / slow))
            .map_err(|e| shape_error(e.to_string()))?;
        let (offset, amplitude) = window
            .max_point()
            .ok_or_else(|| shape_error("empty velocity window".to_string()))?;

        let mut peak_time = seconds_between(origin, add_seconds(window.begin_time(), offset));
        if peak_time == 0.0 {
            peak_time = 1.0;
        }

        Ok(PeakVelocityMeasurement {
            waveform: Arc::clone(waveform),
            time_sec_from_origin: peak_time,
            snr: amplitude - noise_level,
            velocity: distance / peak_time,
            amplitude,
            distance,
            noise_level,
        })
    }
}

impl PeakVelocityMeasurer for MaxVelocityCalculator {
    fn measure_peak_velocities(&self, waveforms: &[Arc<Waveform>]) -> Vec<PeakVelocityMeasurement> {
        waveforms
            .par_iter()
            .filter_map(|waveform| match self.measure(waveform) {
                Ok(measurement) => Some(measurement),
                Err(e) => {
                    info!("Unable to compute maximum velocity, this stack will be skipped: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Keep measurements at or above their band's minimum SNR
///
/// Measurements in bands without parameters are dropped.
pub fn filter_by_min_snr(
    measurements: Vec<PeakVelocityMeasurement>,
    params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
) -> Vec<PeakVelocityMeasurement> {
    let before = measurements.len();
    let kept: Vec<PeakVelocityMeasurement> = measurements
        .into_iter()
        .filter(|m| {
            params
                .get(&m.waveform.band())
                .map(|p| m.snr >= p.min_snr)
                .unwrap_or(false)
        })
        .collect();
    debug!(before, after = kept.len(), "SNR filter applied");
    kept
}
