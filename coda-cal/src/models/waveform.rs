//! Stacked coda envelope ("stack") and its event/station context

use super::FrequencyBand;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Seismic event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub origin_time: DateTime<Utc>,
}

/// Recording station
///
/// Identity is the station name; coordinates are carried along but do not
/// participate in equality, so a station is a stable map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PartialEq for Station {
    fn eq(&self, other: &Self) -> bool {
        self.station_name == other.station_name
    }
}

impl Eq for Station {}

impl Hash for Station {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.station_name.hash(state);
    }
}

impl PartialOrd for Station {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Station {
    fn cmp(&self, other: &Self) -> Ordering {
        self.station_name.cmp(&other.station_name)
    }
}

/// Station channel a waveform was recorded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub station: Station,
    #[serde(default)]
    pub channel_name: String,
}

/// Pick classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PickType {
    /// End of coda ("F" pick)
    F,
    /// Automatic coda start marker, present when the F pick was auto-picked
    Ap,
    /// Any other analyst pick
    #[serde(other)]
    Other,
}

/// Phase pick in seconds relative to event origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformPick {
    pub pick_type: PickType,
    #[serde(default)]
    pub pick_name: String,
    pub pick_time_sec_from_origin: f64,
}

impl WaveformPick {
    pub fn new(pick_type: PickType, pick_time_sec_from_origin: f64) -> Self {
        let pick_name = match pick_type {
            PickType::F => "f",
            PickType::Ap => "ap",
            PickType::Other => "",
        };
        Self {
            pick_type,
            pick_name: pick_name.to_string(),
            pick_time_sec_from_origin,
        }
    }
}

/// Processed log10 coda envelope for one (event, station, band)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    pub id: u64,
    pub event: Option<Event>,
    pub stream: Option<Stream>,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Samples per second
    pub sample_rate: f64,
    /// log10 envelope samples
    pub segment: Vec<f64>,
    pub low_frequency: f64,
    pub high_frequency: f64,
    #[serde(default)]
    pub associated_picks: Vec<WaveformPick>,
}

impl Waveform {
    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::new(self.low_frequency, self.high_frequency)
    }

    pub fn station(&self) -> Option<&Station> {
        self.stream.as_ref().map(|s| &s.station)
    }

    /// Event and station, if both are attached
    pub fn event_and_station(&self) -> Option<(&Event, &Station)> {
        match (&self.event, self.station()) {
            (Some(event), Some(station)) => Some((event, station)),
            _ => None,
        }
    }

    /// A waveform can be measured only with event, station and samples
    pub fn is_valid(&self) -> bool {
        self.event_and_station().is_some() && !self.segment.is_empty() && self.sample_rate > 0.0
    }

    /// First end-of-coda pick, if any
    pub fn end_pick(&self) -> Option<&WaveformPick> {
        self.associated_picks
            .iter()
            .find(|p| p.pick_type == PickType::F)
    }

    pub fn is_auto_picked(&self) -> bool {
        self.associated_picks
            .iter()
            .any(|p| p.pick_type == PickType::Ap)
    }
}
