//! Automatic end-of-coda picking
//!
//! Stacks without an analyst F pick (or whose F pick was itself automatic)
//! get a new one from the SNR end-time picker. An `AP` pick at the envelope
//! peak marks the F pick as automatic so later runs may replace it.

use crate::models::{
    FrequencyBand, PeakVelocityMeasurement, PickType, SharedFrequencyBandParameters, Waveform,
    WaveformPick,
};
use crate::numerics::stats::{index_slope, mean};
use crate::services::time_series::TimeSeries;
use coda_common::time::add_seconds;
use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// F pick time recorded when no usable end could be found
pub const BAD_PICK: f64 = 0.0;

/// Finds where a coda envelope decays into noise
pub trait EndTimePicker: Send + Sync {
    /// Seconds after `start_index` at which the coda ends
    ///
    /// None when the envelope is too short or starts below the noise
    /// threshold.
    #[allow(clippy::too_many_arguments)]
    fn end_time(
        &self,
        data: &[f64],
        sample_rate: f64,
        start_index: usize,
        min_length: f64,
        max_length: f64,
        min_snr: f64,
        noise: f64,
    ) -> Option<f64>;
}

/// Rolling-window SNR end picker
///
/// Walks forward from the peak until the mean of the last `window` seconds
/// drops to `noise + min_snr`, or the envelope turns upward sharply (a
/// later arrival riding on the coda).
#[derive(Debug, Clone, Copy)]
pub struct CodaSnrEndTimePicker {
    window: f64,
    spike_slope: f64,
}

impl CodaSnrEndTimePicker {
    /// Create a picker
    ///
    /// # Arguments
    /// * `window` - Sliding window length (seconds)
    /// * `spike_slope` - Upward envelope slope that ends the coda
    pub fn new(window: f64, spike_slope: f64) -> Self {
        Self { window, spike_slope }
    }
}

impl Default for CodaSnrEndTimePicker {
    fn default() -> Self {
        Self::new(40.0, 0.1)
    }
}

impl EndTimePicker for CodaSnrEndTimePicker {
    fn end_time(
        &self,
        data: &[f64],
        sample_rate: f64,
        start_index: usize,
        min_length: f64,
        max_length: f64,
        min_snr: f64,
        noise: f64,
    ) -> Option<f64> {
        if !(sample_rate > 0.0) {
            return None;
        }
        let obs_window = ((self.window * sample_rate) as usize).max(1);
        let spike_window = (((self.window / 4.0) * sample_rate) as usize).max(2);
        let min_samples = (min_length.max(0.0) * sample_rate) as usize;

        let len = data.len();
        if len <= start_index || len - start_index <= min_samples {
            return None;
        }
        let stop = if max_length > 0.0 {
            len.min(start_index + (max_length * sample_rate) as usize)
        } else {
            len
        };

        let threshold = noise + min_snr;
        if data[start_index] < threshold {
            return None;
        }

        let mut obs: VecDeque<f64> = VecDeque::with_capacity(obs_window + 1);
        let mut spike: VecDeque<f64> = VecDeque::with_capacity(spike_window + 1);
        let mut pick = start_index;

        for i in start_index..stop {
            push_bounded(&mut obs, data[i], obs_window);
            push_bounded(&mut spike, data[i], spike_window);

            if obs.len() >= obs_window {
                let window_mean = mean(obs.make_contiguous()).unwrap_or(f64::INFINITY);
                if window_mean <= threshold {
                    let first = i.saturating_sub(obs_window);
                    pick = (first..i)
                        .find(|&j| j > 0 && data[j] <= threshold)
                        .unwrap_or(pick);
                    break;
                } else if data[i] <= threshold {
                    pick = i;
                    break;
                }
                pick = i;
            }

            if spike.len() >= spike_window {
                if let Some(slope) = index_slope(spike.make_contiguous()) {
                    if slope > self.spike_slope {
                        pick = i.saturating_sub(spike.len() + 1).max(start_index);
                        break;
                    }
                }
            }
        }

        trace!(start_index, pick, threshold, "SNR end pick");
        Some((pick - start_index) as f64 / sample_rate)
    }
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64, capacity: usize) {
    window.push_back(value);
    while window.len() > capacity {
        window.pop_front();
    }
}

/// Whether a stack should be (re)picked: no F pick yet, or an automatic one
pub fn needs_auto_pick(waveform: &Waveform) -> bool {
    waveform.end_pick().is_none() || waveform.is_auto_picked()
}

/// Pick one measurement's stack, returning the measurement unchanged when
/// it keeps its existing picks
pub fn auto_pick_measurement(
    measurement: &PeakVelocityMeasurement,
    params: Option<&SharedFrequencyBandParameters>,
    picker: &dyn EndTimePicker,
) -> PeakVelocityMeasurement {
    let waveform = &measurement.waveform;
    let (params, origin) = match (params, waveform.event.as_ref()) {
        (Some(params), Some(event)) if needs_auto_pick(waveform) => (params, event.origin_time),
        _ => return measurement.clone(),
    };

    let mut series = TimeSeries::from_waveform(waveform);
    if series.sample_rate() > 1.0 {
        match series.interpolate(1.0) {
            Ok(resampled) => series = resampled,
            Err(e) => {
                warn!(waveform_id = waveform.id, "Unable to resample for auto-pick: {}", e);
                return measurement.clone();
            }
        }
    }

    let peak_time = measurement.time_sec_from_origin;
    let start_index = series
        .index_for_time(add_seconds(origin, peak_time))
        .max(0) as usize;

    let offset = picker.end_time(
        series.data(),
        series.sample_rate(),
        start_index,
        params.min_length,
        params.max_length,
        params.min_snr,
        measurement.noise_level,
    );

    let end_time = match offset {
        Some(offset) if offset >= params.min_length => {
            if params.max_length > 0.0 && offset > params.max_length {
                peak_time + params.max_length
            } else {
                peak_time + offset
            }
        }
        _ => BAD_PICK,
    };
    debug!(waveform_id = waveform.id, peak_time, end_time, "Auto-picked coda end");

    let mut picked = (**waveform).clone();
    picked
        .associated_picks
        .retain(|p| p.pick_type != PickType::F && p.pick_type != PickType::Ap);
    picked
        .associated_picks
        .push(WaveformPick::new(PickType::F, end_time));
    picked
        .associated_picks
        .push(WaveformPick::new(PickType::Ap, peak_time));

    let mut updated = measurement.clone();
    updated.waveform = Arc::new(picked);
    updated
}

/// Auto-pick every eligible measurement
pub fn auto_pick_measurements(
    measurements: &[PeakVelocityMeasurement],
    params: &BTreeMap<FrequencyBand, SharedFrequencyBandParameters>,
    picker: &dyn EndTimePicker,
) -> Vec<PeakVelocityMeasurement> {
    measurements
        .par_iter()
        .map(|m| auto_pick_measurement(m, params.get(&m.waveform.band()), picker))
        .collect()
}
