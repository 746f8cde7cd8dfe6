//! Intermediate and final measurement records
//!
//! Measurements that reference a stack hold it by `Arc` so the measurement
//! chain (peak velocity → synthetic → spectra) shares one copy of the
//! envelope samples. When serialized, the stack is written as a short
//! reference (id, event, station, band) rather than the full segment.

use super::{FrequencyBand, SharedFrequencyBandParameters, Waveform};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::sync::Arc;

#[derive(Serialize)]
struct WaveformRef<'a> {
    id: u64,
    event_id: Option<&'a str>,
    station_name: Option<&'a str>,
    low_frequency: f64,
    high_frequency: f64,
}

fn serialize_waveform_ref<S: Serializer>(
    waveform: &Arc<Waveform>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    WaveformRef {
        id: waveform.id,
        event_id: waveform.event.as_ref().map(|e| e.event_id.as_str()),
        station_name: waveform.station().map(|s| s.station_name.as_str()),
        low_frequency: waveform.low_frequency,
        high_frequency: waveform.high_frequency,
    }
    .serialize(serializer)
}

/// Peak amplitude, group velocity and SNR of one stack
#[derive(Debug, Clone, Serialize)]
pub struct PeakVelocityMeasurement {
    #[serde(serialize_with = "serialize_waveform_ref")]
    pub waveform: Arc<Waveform>,
    /// Peak time relative to origin (seconds)
    pub time_sec_from_origin: f64,
    /// Peak amplitude minus pre-event noise (log10 units)
    pub snr: f64,
    /// Group velocity of the peak (km/s)
    pub velocity: f64,
    /// Peak log10 amplitude
    pub amplitude: f64,
    /// Event-station distance (km)
    pub distance: f64,
    /// Mean noise level (log10 units)
    pub noise_level: f64,
}

/// Per-stack coda shape fit
#[derive(Debug, Clone, Serialize)]
pub struct ShapeMeasurement {
    #[serde(serialize_with = "serialize_waveform_ref")]
    pub waveform: Arc<Waveform>,
    pub distance: f64,
    pub measured_gamma: f64,
    pub measured_beta: f64,
    pub measured_intercept: f64,
    /// RMS residual of the straight-line fit
    pub measured_error: f64,
    /// Peak time minus modeled coda start (seconds)
    pub time_difference: f64,
}

/// Model-predicted coda envelope for one stack
#[derive(Debug, Clone, Serialize)]
pub struct SyntheticCoda {
    #[serde(serialize_with = "serialize_waveform_ref")]
    pub source_waveform: Arc<Waveform>,
    /// Parameter snapshot the synthetic was generated from
    pub source_model: SharedFrequencyBandParameters,
    pub segment: Vec<f64>,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub sample_rate: f64,
    pub measured_v: f64,
    pub measured_b: f64,
    pub measured_g: f64,
}

impl SyntheticCoda {
    pub fn band(&self) -> FrequencyBand {
        self.source_waveform.band()
    }
}

/// Coda amplitude of one stack with path and site corrections applied
#[derive(Debug, Clone, Serialize)]
pub struct SpectraMeasurement {
    #[serde(serialize_with = "serialize_waveform_ref")]
    pub waveform: Arc<Waveform>,
    /// Median of envelope minus synthetic over the coda window
    pub raw_at_start: f64,
    /// Raw amplitude projected to the band's measurement time
    pub raw_at_measurement_time: f64,
    pub path_corrected: f64,
    /// Path and site corrected amplitude (0 when no positive site term applies)
    pub path_and_site_corrected: f64,
    pub start_cut_sec: f64,
    pub end_cut_sec: f64,
    /// CVRMSD between envelope and shifted synthetic
    pub rms_fit: f64,
}

impl SpectraMeasurement {
    pub fn band(&self) -> FrequencyBand {
        self.waveform.band()
    }
}

/// Path optimizer diagnostics for one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathCalibrationMeasurement {
    pub low_frequency: f64,
    pub high_frequency: f64,
    pub initial_residual: f64,
    pub final_residual: f64,
    /// False when no random start produced a converged fit
    pub converged: bool,
}

impl PathCalibrationMeasurement {
    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low_frequency, self.high_frequency)
    }
}
