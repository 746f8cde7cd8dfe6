//! Synthetic coda generation
//!
//! For each stack, predicts the coda envelope from the band's shape model:
//! the coda starts at the modeled group-velocity arrival (snapped to the
//! observed peak when they are close), and the synthetic covers coda start
//! to the end of the stack at one sample per `dt`.

use crate::config::SyntheticConfig;
use crate::error::{CalibrationError, CalibrationResult};
use crate::models::{FrequencyBand, SharedFrequencyBandParameters, SyntheticCoda, Waveform};
use crate::services::coda_model::{beta_at, gamma_at, synthetic_point, velocity_at};
use crate::services::geodesy::DistanceCalculator;
use crate::services::time_series::TimeSeries;
use coda_common::time::{add_seconds, seconds_between};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces model envelopes for stacks
pub trait SyntheticGenerator: Send + Sync {
    /// Generate synthetics for every stack that has a band model
    ///
    /// Stacks that cannot be processed are logged and skipped.
    fn generate_synthetics(
        &self,
        waveforms: &[Arc<Waveform>],
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    ) -> Vec<SyntheticCoda>;
}

/// Default synthetic generator
pub struct SyntheticCodaGenerator {
    distance: Arc<dyn DistanceCalculator>,
    config: SyntheticConfig,
}

impl SyntheticCodaGenerator {
    pub fn new(distance: Arc<dyn DistanceCalculator>, config: SyntheticConfig) -> Self {
        Self { distance, config }
    }

    /// Generate one synthetic
    pub fn generate(
        &self,
        waveform: &Arc<Waveform>,
        model: Option<&SharedFrequencyBandParameters>,
    ) -> CalibrationResult<SyntheticCoda> {
        let (event, station) = waveform.event_and_station().ok_or_else(|| {
            CalibrationError::DataShape(format!("waveform {} has no event or station", waveform.id))
        })?;
        let model = model.ok_or_else(|| {
            CalibrationError::DataShape(format!(
                "no shape model for band {} (waveform {})",
                waveform.band(),
                waveform.id
            ))
        })?;

        let distance = self.distance.distance_km(
            event.latitude,
            event.longitude,
            station.latitude,
            station.longitude,
        );

        let vr = velocity_at(model, distance);
        let br = beta_at(model, distance);
        let gr = gamma_at(model, distance);

        let origin = event.origin_time;
        let mut coda_start_sec = if vr != 0.0 { distance / vr } else { 0.0 };

        let series = TimeSeries::from_waveform(waveform);
        if let Some((offset, _)) = series.max_point() {
            let peak_sec = seconds_between(origin, add_seconds(series.begin_time(), offset));
            if (peak_sec - coda_start_sec).abs() < self.config.peak_snap_tolerance {
                coda_start_sec = peak_sec;
            }
        }
        let coda_start = add_seconds(origin, coda_start_sec);

        let sample_rate = 1.0 / self.config.dt;
        let cut = series
            .cut(coda_start, waveform.end_time)
            .and_then(|cut| cut.interpolate(sample_rate))
            .map_err(|e| {
                CalibrationError::DataShape(format!("waveform {}: {}", waveform.id, e))
            })?;

        let dt = self.config.dt;
        let segment: Vec<f64> = (0..cut.len())
            .map(|i| synthetic_point(gr, br, (i + 1) as f64 * dt))
            .collect();

        Ok(SyntheticCoda {
            source_waveform: Arc::clone(waveform),
            source_model: model.clone(),
            begin_time: cut.begin_time(),
            end_time: cut.end_time(),
            sample_rate,
            segment,
            measured_v: vr,
            measured_b: br,
            measured_g: gr,
        })
    }
}

impl SyntheticGenerator for SyntheticCodaGenerator {
    fn generate_synthetics(
        &self,
        waveforms: &[Arc<Waveform>],
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    ) -> Vec<SyntheticCoda> {
        let synthetics: Vec<SyntheticCoda> = waveforms
            .par_iter()
            .filter_map(|waveform| match self.generate(waveform, params.get(&waveform.band())) {
                Ok(synthetic) => Some(synthetic),
                Err(e) => {
                    warn!(waveform_id = waveform.id, "Unable to generate synthetic: {}", e);
                    None
                }
            })
            .collect();
        debug!(
            generated = synthetics.len(),
            requested = waveforms.len(),
            "Synthetic generation finished"
        );
        synthetics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, Station, Stream};
    use chrono::{TimeZone, Utc};

    /// Fixed-distance calculator for tests
    struct FixedDistance(f64);

    impl DistanceCalculator for FixedDistance {
        fn distance_km(&self, _: f64, _: f64, _: f64, _: f64) -> f64 {
            self.0
        }
    }

    fn waveform(peak_index: usize) -> Arc<Waveform> {
        let origin = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let n = 400;
        let segment: Vec<f64> = (0..n)
            .map(|i| if i == peak_index { 5.0 } else { 1.0 })
            .collect();
        Arc::new(Waveform {
            id: 9,
            event: Some(Event {
                event_id: "E".to_string(),
                latitude: 0.0,
                longitude: 0.0,
                origin_time: origin,
            }),
            stream: Some(Stream {
                station: Station {
                    station_name: "S".to_string(),
                    latitude: 0.0,
                    longitude: 1.0,
                },
                channel_name: String::new(),
            }),
            begin_time: origin,
            end_time: add_seconds(origin, (n - 1) as f64),
            sample_rate: 1.0,
            segment,
            low_frequency: 1.0,
            high_frequency: 2.0,
            associated_picks: Vec::new(),
        })
    }

    fn model() -> SharedFrequencyBandParameters {
        let mut params = SharedFrequencyBandParameters::for_band(FrequencyBand::new(1.0, 2.0));
        params.velocity0 = 3.0;
        params.gamma0 = 0.5;
        params.beta0 = -0.01;
        params
    }

    fn generator(distance: f64) -> SyntheticCodaGenerator {
        SyntheticCodaGenerator::new(Arc::new(FixedDistance(distance)), SyntheticConfig::default())
    }

    #[test]
    fn test_starts_at_group_velocity_arrival() {
        // 300 km at 3 km/s → 100 s; peak far away at 250 s
        let synthetic = generator(300.0).generate(&waveform(250), Some(&model())).unwrap();
        let origin = synthetic.source_waveform.event.as_ref().unwrap().origin_time;
        assert_eq!(seconds_between(origin, synthetic.begin_time), 100.0);
        assert_eq!(synthetic.segment.len(), 300);
        assert_eq!(synthetic.measured_v, 3.0);
        assert!((synthetic.segment[0] - synthetic_point(0.5, -0.01, 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_snaps_to_nearby_peak() {
        // modeled start 100 s, observed peak at 103 s
        let synthetic = generator(300.0).generate(&waveform(103), Some(&model())).unwrap();
        let origin = synthetic.source_waveform.event.as_ref().unwrap().origin_time;
        assert_eq!(seconds_between(origin, synthetic.begin_time), 103.0);
    }

    #[test]
    fn test_zero_velocity_does_not_divide_by_zero() {
        let mut params = model();
        params.velocity0 = 0.0;
        params.velocity1 = 0.0;
        params.velocity2 = 0.0;
        let synthetic = generator(300.0).generate(&waveform(250), Some(&params)).unwrap();
        let origin = synthetic.source_waveform.event.as_ref().unwrap().origin_time;
        assert_eq!(seconds_between(origin, synthetic.begin_time), 0.0);
        assert!(synthetic.segment.iter().all(|v| v.is_finite()));
        assert_eq!(synthetic.measured_v, 0.0);
    }

    #[test]
    fn test_missing_model_is_data_shape_error() {
        let result = generator(300.0).generate(&waveform(250), None);
        assert!(matches!(result, Err(CalibrationError::DataShape(_))));
    }

    #[test]
    fn test_batch_skips_failures() {
        let mut params = BTreeMap::new();
        params.insert(FrequencyBand::new(1.0, 2.0), model());
        let mut orphan = (*waveform(250)).clone();
        orphan.event = None;
        // start beyond the end of the stack → cut fails
        let far = generator(3000.0);
        let ok = far.generate_synthetics(&[waveform(250)], &params);
        assert!(ok.is_empty());

        let near = generator(300.0);
        let produced = near.generate_synthetics(&[waveform(250), Arc::new(orphan)], &params);
        assert_eq!(produced.len(), 1);
    }
}
