//! Uniformly sampled time series with cut / resample operations

use crate::models::Waveform;
use chrono::{DateTime, Utc};
use coda_common::time::{add_seconds, seconds_between};
use thiserror::Error;

// Sample-grid rounding slack
const INDEX_EPSILON: f64 = 1e-6;

/// Time series errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeSeriesError {
    /// Requested window does not overlap the samples
    #[error("Cut window [{start}, {end}] does not overlap series [{begin}, {series_end}]")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        begin: DateTime<Utc>,
        series_end: DateTime<Utc>,
    },

    /// Sample rate is zero, negative or non-finite
    #[error("Invalid sample rate: {0}")]
    InvalidRate(f64),

    /// No samples
    #[error("Series is empty")]
    Empty,
}

/// Uniformly sampled series anchored at an absolute begin time
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    begin_time: DateTime<Utc>,
    sample_rate: f64,
    data: Vec<f64>,
}

impl TimeSeries {
    pub fn new(begin_time: DateTime<Utc>, sample_rate: f64, data: Vec<f64>) -> Self {
        Self {
            begin_time,
            sample_rate,
            data,
        }
    }

    pub fn from_waveform(waveform: &Waveform) -> Self {
        Self::new(waveform.begin_time, waveform.sample_rate, waveform.segment.clone())
    }

    pub fn begin_time(&self) -> DateTime<Utc> {
        self.begin_time
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn delta(&self) -> f64 {
        1.0 / self.sample_rate
    }

    /// Time of the last sample
    pub fn end_time(&self) -> DateTime<Utc> {
        add_seconds(self.begin_time, self.length_seconds())
    }

    /// Seconds spanned from first to last sample
    pub fn length_seconds(&self) -> f64 {
        if self.data.is_empty() {
            0.0
        } else {
            (self.data.len() - 1) as f64 * self.delta()
        }
    }

    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        add_seconds(self.begin_time, index as f64 * self.delta())
    }

    /// Nearest sample index for an absolute time (may be out of range)
    pub fn index_for_time(&self, time: DateTime<Utc>) -> isize {
        (seconds_between(self.begin_time, time) * self.sample_rate).round() as isize
    }

    /// Samples within `[start, end]`, clipped to the series extent
    pub fn cut(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeSeries, TimeSeriesError> {
        self.check_rate()?;
        if self.data.is_empty() {
            return Err(TimeSeriesError::Empty);
        }

        let empty = || TimeSeriesError::EmptyWindow {
            start,
            end,
            begin: self.begin_time,
            series_end: self.end_time(),
        };

        if start >= end {
            return Err(empty());
        }

        let last = (self.data.len() - 1) as f64;
        let start_pos = (seconds_between(self.begin_time, start) * self.sample_rate - INDEX_EPSILON).ceil();
        let end_pos = (seconds_between(self.begin_time, end) * self.sample_rate + INDEX_EPSILON).floor();

        let start_idx = start_pos.max(0.0);
        let end_idx = end_pos.min(last);
        if start_idx > end_idx || end_pos < 0.0 || start_pos > last {
            return Err(empty());
        }

        let (start_idx, end_idx) = (start_idx as usize, end_idx as usize);
        Ok(TimeSeries::new(
            self.time_at(start_idx),
            self.sample_rate,
            self.data[start_idx..=end_idx].to_vec(),
        ))
    }

    /// Linear resampling to `new_rate` over the same time span
    pub fn interpolate(&self, new_rate: f64) -> Result<TimeSeries, TimeSeriesError> {
        self.check_rate()?;
        if !(new_rate > 0.0) || !new_rate.is_finite() {
            return Err(TimeSeriesError::InvalidRate(new_rate));
        }
        if self.data.is_empty() {
            return Err(TimeSeriesError::Empty);
        }
        if new_rate == self.sample_rate {
            return Ok(self.clone());
        }

        let count = (self.length_seconds() * new_rate + INDEX_EPSILON).floor() as usize + 1;
        let last = self.data.len() - 1;
        let data = (0..count)
            .map(|i| {
                let position = i as f64 / new_rate * self.sample_rate;
                let lower = (position.floor() as usize).min(last);
                let upper = (lower + 1).min(last);
                let fraction = position - lower as f64;
                self.data[lower] + (self.data[upper] - self.data[lower]) * fraction
            })
            .collect();

        Ok(TimeSeries::new(self.begin_time, new_rate, data))
    }

    /// Offset in seconds from begin and value of the first maximum
    pub fn max_point(&self) -> Option<(f64, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in self.data.iter().enumerate() {
            match best {
                Some((_, bv)) if v <= bv => {}
                _ => best = Some((i, v)),
            }
        }
        best.map(|(i, v)| (i as f64 * self.delta(), v))
    }

    pub fn mean(&self) -> Option<f64> {
        crate::numerics::stats::mean(&self.data)
    }

    pub fn median(&self) -> Option<f64> {
        crate::numerics::stats::median(&self.data)
    }

    fn check_rate(&self) -> Result<(), TimeSeriesError> {
        if self.sample_rate > 0.0 && self.sample_rate.is_finite() {
            Ok(())
        } else {
            Err(TimeSeriesError::InvalidRate(self.sample_rate))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn begin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    }

    fn ramp(rate: f64, n: usize) -> TimeSeries {
        TimeSeries::new(begin(), rate, (0..n).map(|i| i as f64).collect())
    }

    #[test]
    fn test_end_time_and_length() {
        let series = ramp(2.0, 11);
        assert_eq!(series.length_seconds(), 5.0);
        assert_eq!(seconds_between(begin(), series.end_time()), 5.0);
    }

    #[test]
    fn test_cut_inside() {
        let series = ramp(1.0, 100);
        let cut = series
            .cut(add_seconds(begin(), 10.0), add_seconds(begin(), 20.0))
            .unwrap();
        assert_eq!(cut.len(), 11);
        assert_eq!(cut.data()[0], 10.0);
        assert_eq!(cut.data()[10], 20.0);
        assert_eq!(cut.begin_time(), add_seconds(begin(), 10.0));
    }

    #[test]
    fn test_cut_clips_to_extent() {
        let series = ramp(1.0, 10);
        let cut = series
            .cut(add_seconds(begin(), -5.0), add_seconds(begin(), 50.0))
            .unwrap();
        assert_eq!(cut.len(), 10);
    }

    #[test]
    fn test_cut_outside_is_error() {
        let series = ramp(1.0, 10);
        let result = series.cut(add_seconds(begin(), 20.0), add_seconds(begin(), 30.0));
        assert!(matches!(result, Err(TimeSeriesError::EmptyWindow { .. })));
        let result = series.cut(add_seconds(begin(), 5.0), add_seconds(begin(), 5.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_interpolate_down() {
        let series = ramp(4.0, 41); // 10 seconds
        let resampled = series.interpolate(1.0).unwrap();
        assert_eq!(resampled.len(), 11);
        assert!((resampled.data()[3] - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_interpolate_up_is_linear() {
        let series = ramp(1.0, 3);
        let resampled = series.interpolate(2.0).unwrap();
        assert_eq!(resampled.data(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn test_interpolate_rejects_bad_rate() {
        assert!(ramp(1.0, 3).interpolate(0.0).is_err());
    }

    #[test]
    fn test_max_point_first_occurrence() {
        let series = TimeSeries::new(begin(), 2.0, vec![1.0, 5.0, 3.0, 5.0]);
        assert_eq!(series.max_point(), Some((0.5, 5.0)));
    }

    #[test]
    fn test_index_for_time() {
        let series = ramp(2.0, 10);
        assert_eq!(series.index_for_time(add_seconds(begin(), 1.5)), 3);
        assert_eq!(series.index_for_time(add_seconds(begin(), -1.0)), -2);
    }
}
