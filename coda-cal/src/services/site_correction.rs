//! Site terms from reference-event source spectra
//!
//! Four averaging passes per band over path-corrected amplitudes:
//!
//! 1. For every station that recorded a reference event, accumulate
//!    `predicted - observed`, where the prediction is the MDAC source
//!    amplitude of the reference magnitude at the band center.
//! 2. Average each event over stations from pass 1, with their corrections
//!    applied.
//! 3. For every event with an average from pass 2, every station that
//!    recorded it accumulates `event average - observed`, so the final
//!    terms draw on all tied events rather than the reference events alone.
//! 4. Re-average each event with the corrections from pass 3.
//!
//! The pass 4 event spectra feed the Mw fit. Stations never tied to a
//! reference event (directly or through a shared event) get no site term.

use crate::error::CalibrationResult;
use crate::models::{
    FrequencyBand, MdacParametersFi, MdacParametersPs, MeasuredMwParameters, ReferenceMwParameters,
    SiteFrequencyBandParameters, SpectraMeasurement, Station,
};
use crate::numerics::stats::MeanAccumulator;
use crate::services::mdac::{SourceSpectrumModel, DYNE_LOG10_ADJUSTMENT};
use crate::services::mw_calculator::{EventSpectrumEstimate, MwCalculator};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

// Distance argument for source-only spectra
const UNUSED_DISTANCE: f64 = -1.0;

type BandEventStation<'a> = BTreeMap<FrequencyBand, BTreeMap<&'a str, BTreeMap<&'a Station, f64>>>;
type Corrections<'a> = BTreeMap<FrequencyBand, BTreeMap<&'a Station, MeanAccumulator>>;
type EventAverages<'a> = BTreeMap<&'a str, BTreeMap<FrequencyBand, MeanAccumulator>>;

/// Site terms, event spectra and fitted magnitudes
#[derive(Debug, Clone, Default)]
pub struct SiteCorrectionResult {
    /// Site term per (band, station) tied to a reference event
    pub site_parameters: Vec<SiteFrequencyBandParameters>,
    /// Final event-level spectra the magnitudes were fit to
    pub estimates: Vec<EventSpectrumEstimate>,
    /// Magnitudes fitted by the configured [`MwCalculator`]
    pub measured_mws: Vec<MeasuredMwParameters>,
}

impl SiteCorrectionResult {
    /// Site terms keyed by band, then station name
    pub fn site_term_map(&self) -> HashMap<FrequencyBand, HashMap<String, f64>> {
        let mut map: HashMap<FrequencyBand, HashMap<String, f64>> = HashMap::new();
        for site in &self.site_parameters {
            map.entry(site.band())
                .or_default()
                .insert(site.station.station_name.clone(), site.site_term);
        }
        map
    }
}

/// Derives site corrections and event magnitudes
pub struct SiteCorrectionEngine {
    model: Arc<dyn SourceSpectrumModel>,
    mw_calculator: Arc<dyn MwCalculator>,
    phase: String,
}

impl SiteCorrectionEngine {
    /// Create an engine
    ///
    /// # Arguments
    /// * `model` - Source spectrum for reference-event predictions
    /// * `mw_calculator` - Fits magnitudes to the final event spectra
    /// * `phase` - Phase passed to the magnitude fit
    pub fn new(
        model: Arc<dyn SourceSpectrumModel>,
        mw_calculator: Arc<dyn MwCalculator>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            model,
            mw_calculator,
            phase: phase.into(),
        }
    }

    /// Derive site terms from reference events, then fit magnitudes
    pub fn measure_site_corrections(
        &self,
        spectra: &[SpectraMeasurement],
        reference_mws: &[ReferenceMwParameters],
        fi: &MdacParametersFi,
        ps: &MdacParametersPs,
    ) -> CalibrationResult<SiteCorrectionResult> {
        let data = group_spectra(spectra);

        let mut references: HashMap<&str, &ReferenceMwParameters> = HashMap::new();
        for reference in reference_mws {
            references.entry(reference.event_id.as_str()).or_insert(reference);
        }

        // 1) reference corrections
        let mut uniform_weight_events: BTreeSet<&str> = BTreeSet::new();
        let mut reference_corrections: Corrections = BTreeMap::new();
        for (band, events) in &data {
            let center = band.center_frequency();
            for (event_id, stations) in events {
                let Some(reference) = references.get(event_id) else {
                    continue;
                };
                let mut event_fi = fi.clone();
                if let Some(stress) = reference.ref_apparent_stress_in_mpa.filter(|s| *s != 0.0) {
                    event_fi.sigma = stress;
                    event_fi.psi = 0.0;
                    uniform_weight_events.insert(*event_id);
                }
                let spectrum =
                    self.model
                        .source_spectrum(ps, &event_fi, center, reference.ref_mw, UNUSED_DISTANCE);
                let reference_amplitude = spectrum[1].log10() + DYNE_LOG10_ADJUSTMENT;

                let band_corrections = reference_corrections.entry(*band).or_default();
                for (station, amplitude) in stations {
                    band_corrections
                        .entry(*station)
                        .or_default()
                        .add(reference_amplitude - amplitude);
                }
            }
        }

        // 2) event averages through reference-corrected stations
        let first_averages = average_events(&data, &reference_corrections);

        // 3) final corrections
        let mut corrections: Corrections = BTreeMap::new();
        for (band, events) in &data {
            for (event_id, stations) in events {
                let Some(event_average) = first_averages
                    .get(event_id)
                    .and_then(|bands| bands.get(band))
                    .and_then(MeanAccumulator::mean)
                else {
                    continue;
                };
                let band_corrections = corrections.entry(*band).or_default();
                for (station, amplitude) in stations {
                    band_corrections
                        .entry(*station)
                        .or_default()
                        .add(event_average - amplitude);
                }
            }
        }

        // 4) event averages with final corrections
        let final_averages = average_events(&data, &corrections);

        let estimates: Vec<EventSpectrumEstimate> = final_averages
            .into_iter()
            .map(|(event_id, bands)| EventSpectrumEstimate {
                event_id: event_id.to_string(),
                bands,
                uniform_weights: uniform_weight_events.contains(event_id),
            })
            .collect();

        // 5) magnitudes
        let measured_mws = self.mw_calculator.measure_mws(&estimates, &self.phase)?;

        let site_parameters: Vec<SiteFrequencyBandParameters> = corrections
            .iter()
            .flat_map(|(band, by_station)| {
                by_station.iter().filter_map(move |(station, accumulator)| {
                    accumulator.mean().map(|site_term| SiteFrequencyBandParameters {
                        low_frequency: band.low(),
                        high_frequency: band.high(),
                        station: (*station).clone(),
                        site_term,
                    })
                })
            })
            .collect();

        debug!(
            reference_events = references.len(),
            uniform_weight_events = uniform_weight_events.len(),
            "Site correction passes finished"
        );
        info!(
            site_terms = site_parameters.len(),
            events = estimates.len(),
            measured_mws = measured_mws.len(),
            "Site corrections measured"
        );

        Ok(SiteCorrectionResult {
            site_parameters,
            estimates,
            measured_mws,
        })
    }
}

/// band → event → station → path-corrected amplitude
fn group_spectra(spectra: &[SpectraMeasurement]) -> BandEventStation<'_> {
    let mut data: BandEventStation = BTreeMap::new();
    for m in spectra {
        let Some((event, station)) = m.waveform.event_and_station() else {
            continue;
        };
        data.entry(m.band())
            .or_default()
            .entry(event.event_id.as_str())
            .or_default()
            .insert(station, m.path_corrected);
    }
    data
}

/// Mean of `amplitude + correction` per event and band over corrected stations
fn average_events<'a>(data: &BandEventStation<'a>, corrections: &Corrections<'a>) -> EventAverages<'a> {
    let mut averages: EventAverages = BTreeMap::new();
    for (band, events) in data {
        let Some(band_corrections) = corrections.get(band) else {
            continue;
        };
        for (event_id, stations) in events {
            for (station, amplitude) in stations {
                if let Some(correction) = band_corrections.get(station).and_then(MeanAccumulator::mean) {
                    averages
                        .entry(*event_id)
                        .or_default()
                        .entry(*band)
                        .or_default()
                        .add(amplitude + correction);
                }
            }
        }
    }
    averages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, Stream, Waveform};
    use crate::services::mdac::tests::{fi, lg};
    use crate::services::mdac::MdacCalculator;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    /// Records the estimates it is asked to fit
    #[derive(Default)]
    struct RecordingMw {
        seen: Mutex<Vec<EventSpectrumEstimate>>,
    }

    impl MwCalculator for RecordingMw {
        fn measure_mws(
            &self,
            estimates: &[EventSpectrumEstimate],
            _phase: &str,
        ) -> CalibrationResult<Vec<MeasuredMwParameters>> {
            self.seen.lock().unwrap().extend(estimates.iter().cloned());
            Ok(estimates
                .iter()
                .map(|e| MeasuredMwParameters {
                    event_id: e.event_id.clone(),
                    mw: 0.0,
                    apparent_stress_in_mpa: 0.0,
                    misfit: 0.0,
                    data_count: 0,
                })
                .collect())
        }
    }

    fn spectra(event: &str, station: &str, band: FrequencyBand, path_corrected: f64) -> SpectraMeasurement {
        let origin = Utc.with_ymd_and_hms(2020, 3, 3, 0, 0, 0).unwrap();
        SpectraMeasurement {
            waveform: Arc::new(Waveform {
                id: 0,
                event: Some(Event {
                    event_id: event.to_string(),
                    latitude: 0.0,
                    longitude: 0.0,
                    origin_time: origin,
                }),
                stream: Some(Stream {
                    station: Station {
                        station_name: station.to_string(),
                        latitude: 0.0,
                        longitude: 1.0,
                    },
                    channel_name: String::new(),
                }),
                begin_time: origin,
                end_time: origin,
                sample_rate: 1.0,
                segment: vec![0.0],
                low_frequency: band.low(),
                high_frequency: band.high(),
                associated_picks: Vec::new(),
            }),
            raw_at_start: 0.0,
            raw_at_measurement_time: 0.0,
            path_corrected,
            path_and_site_corrected: 0.0,
            start_cut_sec: 0.0,
            end_cut_sec: 0.0,
            rms_fit: 0.0,
        }
    }

    fn band() -> FrequencyBand {
        FrequencyBand::new(0.5, 0.7)
    }

    fn reference(stress: Option<f64>) -> Vec<ReferenceMwParameters> {
        vec![ReferenceMwParameters {
            event_id: "R".to_string(),
            ref_mw: 4.0,
            ref_apparent_stress_in_mpa: stress,
        }]
    }

    fn predicted() -> f64 {
        MdacCalculator.source_spectrum(&lg(), &fi(), 0.6, 4.0, -1.0)[1].log10() + 7.0
    }

    fn site_term(result: &SiteCorrectionResult, station: &str, band: FrequencyBand) -> Option<f64> {
        result
            .site_parameters
            .iter()
            .find(|s| s.station.station_name == station && s.band() == band)
            .map(|s| s.site_term)
    }

    #[test]
    fn test_hand_computed_site_terms() {
        let data = vec![
            spectra("R", "A", band(), 2.0),
            spectra("R", "B", band(), 3.0),
            spectra("N", "A", band(), 2.5),
            spectra("N", "B", band(), 3.1),
            spectra("N", "C", band(), 1.0),
        ];
        let recorder = Arc::new(RecordingMw::default());
        let engine = SiteCorrectionEngine::new(Arc::new(MdacCalculator), recorder.clone(), "LG");
        let result = engine
            .measure_site_corrections(&data, &reference(None), &fi(), &lg())
            .unwrap();

        let p = predicted();
        // A: mean(p - 2.0, (p + 0.3) - 2.5), B: mean(p - 3.0, (p + 0.3) - 3.1)
        assert!((site_term(&result, "A", band()).unwrap() - (p - 2.1)).abs() < 1e-9);
        assert!((site_term(&result, "B", band()).unwrap() - (p - 2.9)).abs() < 1e-9);
        assert!((site_term(&result, "C", band()).unwrap() - (p - 0.7)).abs() < 1e-9);
        assert_eq!(result.site_parameters.len(), 3);

        let seen = recorder.seen.lock().unwrap();
        let n = seen.iter().find(|e| e.event_id == "N").unwrap();
        let n_band = n.bands[&band()];
        assert_eq!(n_band.count(), 3);
        assert!((n_band.mean().unwrap() - (p + 0.3)).abs() < 1e-9);
        let r = seen.iter().find(|e| e.event_id == "R").unwrap();
        assert!((r.bands[&band()].mean().unwrap() - p).abs() < 1e-9);
        assert!(!r.uniform_weights);
        assert_eq!(result.measured_mws.len(), 2);
    }

    #[test]
    fn test_no_site_term_without_reference_path() {
        let other = FrequencyBand::new(1.0, 2.0);
        let data = vec![
            spectra("R", "A", band(), 2.0),
            spectra("N", "A", band(), 2.5),
            // no reference event in this band
            spectra("N", "A", other, 2.2),
            spectra("M", "D", other, 1.7),
            // never shares an event with a corrected station
            spectra("M", "D", band(), 1.5),
        ];
        let engine = SiteCorrectionEngine::new(Arc::new(MdacCalculator), Arc::new(RecordingMw::default()), "LG");
        let result = engine
            .measure_site_corrections(&data, &reference(None), &fi(), &lg())
            .unwrap();

        assert!(site_term(&result, "A", band()).is_some());
        assert!(site_term(&result, "D", band()).is_none());
        assert!(site_term(&result, "A", other).is_none());
        assert!(site_term(&result, "D", other).is_none());
        assert!(result.estimates.iter().all(|e| e.event_id != "M"));
    }

    #[test]
    fn test_reference_stress_sets_uniform_weights() {
        let data = vec![spectra("R", "A", band(), 2.0), spectra("R", "B", band(), 3.0)];
        let engine = SiteCorrectionEngine::new(Arc::new(MdacCalculator), Arc::new(RecordingMw::default()), "LG");

        let result = engine
            .measure_site_corrections(&data, &reference(Some(3.0)), &fi(), &lg())
            .unwrap();
        assert!(result.estimates[0].uniform_weights);

        let mut stressed = fi();
        stressed.sigma = 3.0;
        let expected = MdacCalculator.source_spectrum(&lg(), &stressed, 0.6, 4.0, -1.0)[1].log10() + 7.0;
        assert!((site_term(&result, "A", band()).unwrap() - (expected - 2.0)).abs() < 1e-9);

        // zero stress is treated as unknown
        let result = engine
            .measure_site_corrections(&data, &reference(Some(0.0)), &fi(), &lg())
            .unwrap();
        assert!(!result.estimates[0].uniform_weights);
    }

    #[test]
    fn test_site_term_map_lookup() {
        let data = vec![spectra("R", "A", band(), 2.0), spectra("R", "B", band(), 3.0)];
        let engine = SiteCorrectionEngine::new(Arc::new(MdacCalculator), Arc::new(RecordingMw::default()), "LG");
        let result = engine
            .measure_site_corrections(&data, &reference(None), &fi(), &lg())
            .unwrap();
        let map = result.site_term_map();
        assert!((map[&band()]["B"] - (predicted() - 3.0)).abs() < 1e-9);
    }
}
