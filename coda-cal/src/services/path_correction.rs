//! Joint path and site correction fit
//!
//! Per band, fits Extended Street-Herrmann spreading plus Q attenuation
//! together with one site offset per station, minimizing the L1.2 scatter
//! of each event's residuals about its robust mean. Parameters are searched
//! in log space:
//!
//! | index | meaning                 | stored as        |
//! |-------|-------------------------|------------------|
//! | 0     | log10(S1)               | `S1 = 10^p`      |
//! | 1     | log10(Q)                | `Q = 10^p`       |
//! | 2     | log10(Xc)               | `Xc = 10^p`      |
//! | 3     | log10(log10(Xt))        | `Xt = 10^10^p`   |
//! | 4..   | site term per station   | (not stored)     |

use crate::config::OptimizerConfig;
use crate::error::CalibrationResult;
use crate::models::{
    FrequencyBand, PathCalibrationMeasurement, SharedFrequencyBandParameters, SpectraMeasurement,
    Station,
};
use crate::numerics::robust::{lp_cost, lp_mean, LP_NORM};
use crate::numerics::{PowellOptimizer, PowellOutcome};
use crate::services::geodesy::DistanceCalculator;
use crate::services::spreading::{attenuation, log_correction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const P1_IDX: usize = 0;
const Q_IDX: usize = 1;
const XCROSS_IDX: usize = 2;
const XTRANS_IDX: usize = 3;
const NUM_TERMS: usize = 4;

/// Fixed far-field spreading exponent
pub const S2: f64 = 1.0;

const BOUND_PENALTY: f64 = 1000.0;
const SITE_MEAN_WEIGHT: f64 = 10.0;

/// Seed values of the common terms
const SEED: [f64; NUM_TERMS] = [-4.0, 2.698_970_004_336_019, 2.698_970_004_336_019, -0.521_390_227_654_437_9];

/// (min, max) of the common terms
const BOUNDS: [(f64, f64); NUM_TERMS] = [(-10.0, -0.001), (0.0, 3.0), (0.0, 3.0), (-10.0, 0.04)];

const SITE_BOUNDS: (f64, f64) = (-10.0, 10.0);

/// One (event, station) amplitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Index into [`BandObservations::event_ids`]
    pub event_idx: usize,
    /// Index into [`BandObservations::stations`] and the site terms
    pub station_idx: usize,
    /// Raw log10 amplitude at measurement time
    pub amplitude: f64,
    /// Event-station distance (km)
    pub distance: f64,
}

/// Observations of one band grouped by event
///
/// Station indices follow station-name order; every event range holds at
/// least two stations.
#[derive(Debug, Clone, Default)]
pub struct BandObservations {
    /// All observations, contiguous per event
    pub observations: Vec<Observation>,
    /// Slice of `observations` belonging to each event
    pub event_ranges: Vec<Range<usize>>,
    /// Event id per event index
    pub event_ids: Vec<String>,
    /// Stations in site-term order
    pub stations: Vec<Station>,
}

impl BandObservations {
    /// Flatten a band's spectra, dropping events seen at one station or fewer
    pub fn build(spectra: &[&SpectraMeasurement], distance: &dyn DistanceCalculator) -> Self {
        let mut by_event: BTreeMap<&str, BTreeMap<&Station, (f64, f64)>> = BTreeMap::new();
        for m in spectra {
            let Some((event, station)) = m.waveform.event_and_station() else {
                continue;
            };
            let d = distance.distance_km(event.latitude, event.longitude, station.latitude, station.longitude);
            let stations = by_event.entry(event.event_id.as_str()).or_default();
            if stations
                .insert(station, (m.raw_at_measurement_time, d))
                .is_some()
            {
                info!(
                    event_id = %event.event_id,
                    station = %station.station_name,
                    "Saw same event/station pair more than once"
                );
            }
        }
        by_event.retain(|_, stations| stations.len() > 1);

        let station_index: BTreeMap<&Station, usize> = by_event
            .values()
            .flat_map(|s| s.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(idx, station)| (station, idx))
            .collect();
        let mut observations = Vec::new();
        let mut event_ranges = Vec::new();
        let mut event_ids = Vec::new();
        for (event_idx, (event_id, observed)) in by_event.iter().enumerate() {
            let begin = observations.len();
            for (station, &(amplitude, distance)) in observed {
                let Some(&station_idx) = station_index.get(station) else {
                    continue;
                };
                observations.push(Observation {
                    event_idx,
                    station_idx,
                    amplitude,
                    distance,
                });
            }
            event_ranges.push(begin..observations.len());
            event_ids.push(event_id.to_string());
        }

        BandObservations {
            observations,
            event_ranges,
            event_ids,
            stations: station_index.into_keys().cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_ranges.is_empty()
    }

    /// Length of the optimizer parameter vector
    pub fn parameter_count(&self) -> usize {
        NUM_TERMS + self.stations.len()
    }
}

/// Fixed inputs of one band's cost function
#[derive(Debug, Clone, Copy)]
pub struct CostContext<'a> {
    /// Observations being fitted
    pub table: &'a BandObservations,
    /// Geometric center frequency
    pub f0: f64,
    /// Phase velocity for the attenuation term (km/s)
    pub phase_velocity: f64,
    /// Weight of the site-mean regularization
    pub epsilon: f64,
}

/// Joint path/site objective
///
/// Sum of per-event L1.2 scatter, plus the site-mean regularization and a
/// quadratic penalty for every parameter outside its bound.
pub fn path_cost(ctx: &CostContext<'_>, x: &[f64]) -> f64 {
    let p1 = 10f64.powf(x[P1_IDX]);
    let q = 10f64.powf(x[Q_IDX]);
    let xcross = 10f64.powf(x[XCROSS_IDX]);
    let xtrans = 10f64.powf(10f64.powf(x[XTRANS_IDX]));
    let sites = &x[NUM_TERMS..];

    let mut cost = 0.0;
    let mut residuals = Vec::new();
    for range in &ctx.table.event_ranges {
        residuals.clear();
        residuals.extend(ctx.table.observations[range.clone()].iter().map(|obs| {
            let predicted = sites[obs.station_idx] + log_correction(p1, S2, xcross, xtrans, obs.distance)
                - attenuation(ctx.f0, q, obs.distance, ctx.phase_velocity);
            obs.amplitude - predicted
        }));
        if let Ok(center) = lp_mean(&residuals) {
            cost += lp_cost(&residuals, center);
        }
    }

    if let Ok(site_mean) = lp_mean(sites) {
        cost += site_mean * site_mean * ctx.epsilon * sites.len() as f64 * SITE_MEAN_WEIGHT;
    }

    cost + bound_penalty(x)
}

fn bounds_at(i: usize) -> (f64, f64) {
    if i < NUM_TERMS {
        BOUNDS[i]
    } else {
        SITE_BOUNDS
    }
}

fn bound_penalty(x: &[f64]) -> f64 {
    x.iter()
        .enumerate()
        .map(|(i, &v)| {
            let (lo, hi) = bounds_at(i);
            let excess = if v < lo {
                lo - v
            } else if v > hi {
                v - hi
            } else {
                0.0
            };
            BOUND_PENALTY * excess * excess
        })
        .sum()
}

/// Seed parameter vector for a band
pub fn seed_point(parameter_count: usize) -> Vec<f64> {
    let mut point = vec![0.0; parameter_count];
    point[..NUM_TERMS].copy_from_slice(&SEED);
    point
}

fn clamp_to_bounds(point: &mut [f64]) {
    for (i, v) in point.iter_mut().enumerate() {
        let (lo, hi) = bounds_at(i);
        *v = v.clamp(lo, hi);
    }
}

/// `(cost / N)^(1/1.2)` with `N = 1 + observation count`
fn residual(cost: f64, observations: usize) -> f64 {
    (cost / (1 + observations) as f64).powf(1.0 / LP_NORM)
}

fn start_seed(base: u64, band_idx: usize, start_idx: usize) -> u64 {
    base ^ (band_idx as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (start_idx as u64 + 1).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Updated parameters and per-band diagnostics
#[derive(Debug, Clone)]
pub struct PathCorrectionResult {
    /// Input parameters with fitted path terms written into converged bands
    pub parameters: BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    /// One entry per band that had multi-station events
    pub diagnostics: Vec<PathCalibrationMeasurement>,
}

/// Path/site optimizer over all bands
pub struct PathCorrectionOptimizer {
    distance: Arc<dyn DistanceCalculator>,
    config: OptimizerConfig,
    phase_velocity: f64,
}

impl PathCorrectionOptimizer {
    /// Create an optimizer
    ///
    /// # Arguments
    /// * `distance` - Event-station distance calculator
    /// * `config` - Starts, budget, tolerance, seed and epsilon table
    /// * `phase_velocity` - Velocity used in the attenuation term (km/s)
    pub fn new(distance: Arc<dyn DistanceCalculator>, config: OptimizerConfig, phase_velocity: f64) -> Self {
        Self {
            distance,
            config,
            phase_velocity,
        }
    }

    /// Fit every band that has multi-station events
    ///
    /// Bands without usable data keep their parameters and produce no
    /// diagnostic. A band where every start fails also keeps its
    /// parameters; its diagnostic has `converged == false` and the other
    /// bands are still fitted.
    pub fn measure_path_corrections(
        &self,
        spectra: &[SpectraMeasurement],
        params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    ) -> CalibrationResult<PathCorrectionResult> {
        let optimizer = PowellOptimizer::new(
            self.config.tolerance,
            self.config.tolerance,
            self.config.max_evaluations,
        )?;
        let base_seed = self.config.seed.unwrap_or_else(rand::random);

        let mut by_band: BTreeMap<FrequencyBand, Vec<&SpectraMeasurement>> = BTreeMap::new();
        for m in spectra {
            by_band.entry(m.band()).or_default().push(m);
        }

        let mut parameters = params.clone();
        let mut diagnostics = Vec::new();

        for (band_idx, (band, band_params)) in parameters.iter_mut().enumerate() {
            let Some(band_spectra) = by_band.get(band) else {
                continue;
            };
            let table = BandObservations::build(band_spectra, self.distance.as_ref());
            if table.is_empty() {
                debug!(band = %band, "No multi-station events; path fit skipped");
                continue;
            }

            let ctx = CostContext {
                table: &table,
                f0: band.geometric_center(),
                phase_velocity: self.phase_velocity,
                epsilon: self.config.epsilon_for(band),
            };
            let seed = seed_point(table.parameter_count());
            let initial_residual = residual(path_cost(&ctx, &seed), table.observations.len());

            let Some(best) = self.best_of_starts(&optimizer, &ctx, base_seed, band_idx) else {
                error!(
                    band = %band,
                    initial_residual,
                    "Unable to converge while optimizing path correction; parameters left unchanged"
                );
                diagnostics.push(PathCalibrationMeasurement {
                    low_frequency: band.low(),
                    high_frequency: band.high(),
                    initial_residual,
                    final_residual: initial_residual,
                    converged: false,
                });
                continue;
            };
            let mut point = best.point;
            clamp_to_bounds(&mut point);
            let final_residual = residual(path_cost(&ctx, &point), table.observations.len());

            band_params.s1 = 10f64.powf(point[P1_IDX]);
            band_params.s2 = S2;
            band_params.q = 10f64.powf(point[Q_IDX]);
            band_params.xc = 10f64.powf(point[XCROSS_IDX]);
            band_params.xt = 10f64.powf(10f64.powf(point[XTRANS_IDX]));

            info!(
                band = %band,
                events = table.event_ranges.len(),
                stations = table.stations.len(),
                initial_residual,
                final_residual,
                "Path correction fitted"
            );
            diagnostics.push(PathCalibrationMeasurement {
                low_frequency: band.low(),
                high_frequency: band.high(),
                initial_residual,
                final_residual,
                converged: true,
            });
        }

        Ok(PathCorrectionResult {
            parameters,
            diagnostics,
        })
    }

    /// Lowest-cost converged outcome over the random starts
    fn best_of_starts(
        &self,
        optimizer: &PowellOptimizer,
        ctx: &CostContext<'_>,
        base_seed: u64,
        band_idx: usize,
    ) -> Option<PowellOutcome> {
        let n = ctx.table.parameter_count();
        let outcomes: Vec<Option<PowellOutcome>> = (0..self.config.starting_points)
            .into_par_iter()
            .map(|start_idx| {
                let mut rng = StdRng::seed_from_u64(start_seed(base_seed, band_idx, start_idx));
                let start: Vec<f64> = (0..n)
                    .map(|i| {
                        let (lo, hi) = bounds_at(i);
                        rng.gen_range(lo..=hi)
                    })
                    .collect();
                match optimizer.minimize(|x| path_cost(ctx, x), &start) {
                    Ok(outcome) if outcome.value.is_finite() => {
                        debug!(start_idx, value = outcome.value, evaluations = outcome.evaluations, "Start converged");
                        Some(outcome)
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(start_idx, "Path optimizer start failed: {}", e);
                        None
                    }
                }
            })
            .collect();

        outcomes
            .into_iter()
            .flatten()
            .fold(None, |best: Option<PowellOutcome>, candidate| match best {
                Some(b) if b.value <= candidate.value => Some(b),
                _ => Some(candidate),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, Stream, Waveform};
    use chrono::{TimeZone, Utc};

    /// 100 km per degree of longitude difference
    struct LongitudeDistance;

    impl DistanceCalculator for LongitudeDistance {
        fn distance_km(&self, _: f64, lon1: f64, _: f64, lon2: f64) -> f64 {
            (lon2 - lon1).abs() * 100.0
        }
    }

    fn band() -> FrequencyBand {
        FrequencyBand::new(0.5, 0.7)
    }

    fn spectra(event: &str, event_lon: f64, station: &str, station_lon: f64, amplitude: f64) -> SpectraMeasurement {
        let origin = Utc.with_ymd_and_hms(2020, 5, 5, 0, 0, 0).unwrap();
        let waveform = Arc::new(Waveform {
            id: 0,
            event: Some(Event {
                event_id: event.to_string(),
                latitude: 0.0,
                longitude: event_lon,
                origin_time: origin,
            }),
            stream: Some(Stream {
                station: Station {
                    station_name: station.to_string(),
                    latitude: 0.0,
                    longitude: station_lon,
                },
                channel_name: String::new(),
            }),
            begin_time: origin,
            end_time: origin,
            sample_rate: 1.0,
            segment: vec![0.0],
            low_frequency: 0.5,
            high_frequency: 0.7,
            associated_picks: Vec::new(),
        });
        SpectraMeasurement {
            waveform,
            raw_at_start: amplitude,
            raw_at_measurement_time: amplitude,
            path_corrected: amplitude,
            path_and_site_corrected: 0.0,
            start_cut_sec: 0.0,
            end_cut_sec: 0.0,
            rms_fit: 0.0,
        }
    }

    fn dataset() -> Vec<SpectraMeasurement> {
        let mut data = Vec::new();
        for (e, elon, size) in [("E1", 0.0, 5.0), ("E2", -1.0, 4.6), ("E3", 0.5, 5.3)] {
            for (s, slon, site) in [("A", 1.0, 0.1), ("B", 2.5, -0.2), ("C", 4.0, 0.05)] {
                let d: f64 = (slon - elon) * 100.0;
                let amplitude = size + site - 0.9 * d.log10() - 0.0004 * d;
                data.push(spectra(e, elon, s, slon, amplitude));
            }
        }
        // single-station event is ignored
        data.push(spectra("E4", 0.0, "A", 1.0, 3.0));
        data
    }

    fn optimizer(seed: Option<u64>) -> PathCorrectionOptimizer {
        let config = OptimizerConfig {
            seed,
            ..OptimizerConfig::default()
        };
        PathCorrectionOptimizer::new(Arc::new(LongitudeDistance), config, 3.5)
    }

    fn params() -> BTreeMap<FrequencyBand, SharedFrequencyBandParameters> {
        let mut map = BTreeMap::new();
        map.insert(band(), SharedFrequencyBandParameters::for_band(band()));
        map.insert(
            FrequencyBand::new(1.0, 2.0),
            SharedFrequencyBandParameters::for_band(FrequencyBand::new(1.0, 2.0)),
        );
        map
    }

    #[test]
    fn test_table_groups_events_and_sorts_stations() {
        let data = dataset();
        let refs: Vec<&SpectraMeasurement> = data.iter().collect();
        let table = BandObservations::build(&refs, &LongitudeDistance);
        assert_eq!(table.event_ids, vec!["E1", "E2", "E3"]);
        let names: Vec<&str> = table.stations.iter().map(|s| s.station_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(table.observations.len(), 9);
        assert_eq!(table.event_ranges[1], 3..6);
        assert_eq!(table.observations[4].station_idx, 1);
        assert_eq!(table.observations[4].distance, 350.0);
        assert_eq!(table.parameter_count(), 7);
    }

    #[test]
    fn test_bound_violation_is_penalized() {
        let data = dataset();
        let refs: Vec<&SpectraMeasurement> = data.iter().collect();
        let table = BandObservations::build(&refs, &LongitudeDistance);
        let ctx = CostContext {
            table: &table,
            f0: band().geometric_center(),
            phase_velocity: 3.5,
            epsilon: 5.5,
        };
        let inside = seed_point(7);
        let mut outside = inside.clone();
        outside[Q_IDX] = 4.0;
        assert_eq!(bound_penalty(&inside), 0.0);
        assert!((bound_penalty(&outside) - 1000.0).abs() < 1e-9);
        assert!(path_cost(&ctx, &outside) > path_cost(&ctx, &inside));
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let data = dataset();
        let first = optimizer(Some(42)).measure_path_corrections(&data, &params()).unwrap();
        let second = optimizer(Some(42)).measure_path_corrections(&data, &params()).unwrap();
        assert_eq!(first.parameters, second.parameters);
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn test_fitted_parameters_within_bounds() {
        let data = dataset();
        let result = optimizer(Some(7)).measure_path_corrections(&data, &params()).unwrap();
        let p = &result.parameters[&band()];
        assert!(p.s1 >= 1e-10 && p.s1 <= 10f64.powf(-0.001));
        assert_eq!(p.s2, 1.0);
        assert!(p.q >= 1.0 && p.q <= 1000.0);
        assert!(p.xc >= 1.0 && p.xc <= 1000.0);
        assert!(p.xt >= 1.0 && p.xt <= 10f64.powf(10f64.powf(0.04)));

        assert_eq!(result.diagnostics.len(), 1);
        let diag = &result.diagnostics[0];
        assert_eq!(diag.band(), band());
        assert!(diag.converged);
        assert!(diag.initial_residual.is_finite());
        assert!(diag.final_residual.is_finite());
    }

    #[test]
    fn test_exhausted_budget_keeps_band_parameters() {
        let other = FrequencyBand::new(1.0, 2.0);
        let mut data = dataset();
        let moved: Vec<SpectraMeasurement> = dataset()
            .into_iter()
            .map(|mut m| {
                let mut waveform = (*m.waveform).clone();
                waveform.low_frequency = other.low();
                waveform.high_frequency = other.high();
                m.waveform = Arc::new(waveform);
                m
            })
            .collect();
        data.extend(moved);

        let mut preset = params();
        for p in preset.values_mut() {
            p.s1 = 0.8;
            p.q = 250.0;
            p.xc = 80.0;
            p.xt = 3.0;
        }
        let config = OptimizerConfig {
            seed: Some(3),
            max_evaluations: 10,
            ..OptimizerConfig::default()
        };
        let starved = PathCorrectionOptimizer::new(Arc::new(LongitudeDistance), config, 3.5);
        let result = starved.measure_path_corrections(&data, &preset).unwrap();

        assert_eq!(result.parameters, preset);
        assert_eq!(result.diagnostics.len(), 2);
        for diag in &result.diagnostics {
            assert!(!diag.converged);
            assert!(diag.initial_residual.is_finite());
            assert_eq!(diag.final_residual, diag.initial_residual);
        }
        let bands: Vec<FrequencyBand> = result.diagnostics.iter().map(|d| d.band()).collect();
        assert_eq!(bands, vec![band(), other]);
    }

    #[test]
    fn test_band_without_data_keeps_parameters() {
        let data = dataset();
        let result = optimizer(Some(1)).measure_path_corrections(&data, &params()).unwrap();
        let untouched = &result.parameters[&FrequencyBand::new(1.0, 2.0)];
        assert_eq!(untouched.s1, 0.0);
        assert_eq!(untouched.q, 0.0);
    }
}
