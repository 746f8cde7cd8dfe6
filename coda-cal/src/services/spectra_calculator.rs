//! Coda amplitude measurement against synthetics
//!
//! The stack is aligned with its synthetic over the coda window (observed
//! peak near the modeled arrival up to the end pick), and the median offset
//! between them is the raw amplitude. Raw amplitudes are projected to the
//! band's measurement time, then path and site corrections are added.

use crate::config::SpectraConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{FrequencyBand, SharedFrequencyBandParameters, SpectraMeasurement, SyntheticCoda};
use crate::numerics::stats::{cvrmsd, median};
use crate::services::coda_model::{point_at_time_and_distance, velocity_at};
use crate::services::geodesy::DistanceCalculator;
use crate::services::spreading::path_correction;
use crate::services::time_series::TimeSeries;
use coda_common::time::{add_seconds, seconds_between};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// Site terms keyed by band, then station name
pub type SiteTermMap = HashMap<FrequencyBand, HashMap<String, f64>>;

/// Measures coda amplitudes for a batch of synthetics
pub trait SpectraMeasurer: Send + Sync {
    /// Measurements that could not be made are logged and omitted
    fn measure_amplitudes(
        &self,
        synthetics: &[SyntheticCoda],
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
        site_terms: Option<&SiteTermMap>,
    ) -> Vec<SpectraMeasurement>;
}

/// Default spectral measurement
pub struct SpectraCalculator {
    distance: Arc<dyn DistanceCalculator>,
    phase_velocity: f64,
    config: SpectraConfig,
}

impl SpectraCalculator {
    /// Create a calculator
    ///
    /// # Arguments
    /// * `distance` - Event-station distance calculator
    /// * `phase_velocity` - Velocity used for path attenuation (km/s)
    /// * `config` - Peak search window
    pub fn new(distance: Arc<dyn DistanceCalculator>, phase_velocity: f64, config: SpectraConfig) -> Self {
        Self {
            distance,
            phase_velocity,
            config,
        }
    }

    /// Measure one synthetic's source stack
    pub fn measure(
        &self,
        synthetic: &SyntheticCoda,
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
        site_terms: Option<&SiteTermMap>,
    ) -> CalibrationResult<SpectraMeasurement> {
        let waveform = &synthetic.source_waveform;
        let band = waveform.band();
        let shape_error = |msg: String| CalibrationError::DataShape(format!("waveform {}: {}", waveform.id, msg));

        let params = params
            .get(&band)
            .ok_or_else(|| shape_error(format!("no parameters for band {}", band)))?;
        let (event, station) = waveform
            .event_and_station()
            .ok_or_else(|| shape_error("no event or station".to_string()))?;

        let envelope = TimeSeries::from_waveform(waveform)
            .interpolate(synthetic.sample_rate)
            .map_err(|e| shape_error(e.to_string()))?;
        let synth = TimeSeries::new(synthetic.begin_time, synthetic.sample_rate, synthetic.segment.clone());

        let distance = self.distance.distance_km(
            event.latitude,
            event.longitude,
            station.latitude,
            station.longitude,
        );
        let mut vr = velocity_at(params, distance);
        if vr == 0.0 {
            vr = 1.0;
        }

        let origin = event.origin_time;
        let trim_time = add_seconds(origin, distance / vr);
        let start = envelope
            .cut(trim_time, add_seconds(trim_time, self.config.peak_search_window))
            .ok()
            .and_then(|window| {
                window
                    .max_point()
                    .map(|(offset, _)| add_seconds(window.begin_time(), offset))
            })
            .unwrap_or(trim_time);

        let site_term = site_terms
            .and_then(|terms| terms.get(&band))
            .and_then(|stations| stations.get(&station.station_name))
            .copied()
            .unwrap_or(0.0);

        let esh = path_correction(
            params.low_frequency,
            params.high_frequency,
            params.s1,
            params.s2,
            params.xc,
            params.xt,
            params.q,
            distance,
            self.phase_velocity,
        );

        let end_pick = waveform
            .end_pick()
            .ok_or_else(|| shape_error("no end pick".to_string()))?;
        let mut end = add_seconds(origin, end_pick.pick_time_sec_from_origin);
        let longest = add_seconds(start, params.max_length);
        if end > longest {
            end = longest;
        }
        if start >= end {
            return Err(shape_error(format!(
                "coda start {} is not before end {}",
                start, end
            )));
        }

        let envelope = envelope.cut(start, end).map_err(|e| shape_error(e.to_string()))?;
        let synth = synth.cut(start, end).map_err(|e| shape_error(e.to_string()))?;
        let length = envelope.len().min(synth.len());
        let observed = &envelope.data()[..length];
        let predicted = &synth.data()[..length];

        let differences: Vec<f64> = observed.iter().zip(predicted).map(|(o, p)| o - p).collect();
        let raw_at_start = median(&differences).ok_or_else(|| shape_error("empty coda window".to_string()))?;
        let shifted: Vec<f64> = predicted.iter().map(|p| p + raw_at_start).collect();
        let rms_fit = cvrmsd(observed, &shifted);

        let raw_at_measurement_time = if params.measurement_time > 0.0 {
            raw_at_start + point_at_time_and_distance(params, params.measurement_time, distance)
        } else {
            raw_at_start
        };

        let window_seconds = seconds_between(start, end);
        if window_seconds < params.min_length {
            return Err(shape_error(format!(
                "coda window {:.1}s shorter than minimum {:.1}s",
                window_seconds, params.min_length
            )));
        }

        let path_corrected = raw_at_measurement_time + esh;
        let path_and_site_corrected = if site_term > 0.0 {
            path_corrected + site_term
        } else {
            0.0
        };

        Ok(SpectraMeasurement {
            waveform: Arc::clone(waveform),
            raw_at_start,
            raw_at_measurement_time,
            path_corrected,
            path_and_site_corrected,
            start_cut_sec: seconds_between(origin, start),
            end_cut_sec: seconds_between(origin, end),
            rms_fit,
        })
    }
}

impl SpectraMeasurer for SpectraCalculator {
    fn measure_amplitudes(
        &self,
        synthetics: &[SyntheticCoda],
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
        site_terms: Option<&SiteTermMap>,
    ) -> Vec<SpectraMeasurement> {
        let measurements: Vec<SpectraMeasurement> = synthetics
            .par_iter()
            .filter_map(|synthetic| match self.measure(synthetic, params, site_terms) {
                Ok(measurement) => Some(measurement),
                Err(e) => {
                    debug!("Skipping spectra measurement: {}", e);
                    None
                }
            })
            .collect();
        debug!(
            measured = measurements.len(),
            synthetics = synthetics.len(),
            "Spectra measurement finished"
        );
        measurements
    }
}
