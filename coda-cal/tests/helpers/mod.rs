//! Test helper utilities
//!
//! Dataset fixtures shared by the coda-cal integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use coda_cal::models::{
    Event, MdacParametersFi, MdacParametersPs, PickType, ReferenceMwParameters,
    SharedFrequencyBandParameters, Station, Stream, Waveform, WaveformPick,
};
use coda_cal::services::coda_model::synthetic_point;
use coda_cal::services::{DistanceCalculator, Wgs84Distance};
use coda_cal::CalibrationDataset;

pub const LOW: f64 = 0.5;
pub const HIGH: f64 = 0.7;

/// Seconds of pre-origin noise in each stack
pub const LEAD: i64 = 60;
/// Coda length from arrival to F pick
pub const CODA_SECONDS: f64 = 300.0;
pub const ARRIVAL_VELOCITY: f64 = 3.5;

pub fn fi() -> MdacParametersFi {
    MdacParametersFi {
        sigma: 0.3,
        del_sigma: 0.0,
        psi: 0.0,
        del_psi: 0.0,
        zeta: 1.0,
        m0ref: 1e16,
        alphas: 6000.0,
        betas: 3500.0,
        rhos: 2700.0,
        rad_pat_p: 0.44,
        rad_pat_s: 0.6,
        alpha_r: 6000.0,
        beta_r: 3500.0,
        rhor: 2700.0,
    }
}

pub fn lg() -> MdacParametersPs {
    MdacParametersPs {
        phase: "LG".to_string(),
        q0: 0.0,
        del_q0: 0.0,
        gamma0: 0.0,
        del_gamma0: 0.0,
        u0: 0.0,
        eta: 0.0,
        del_eta: 0.0,
        dist_crit: 0.0,
        snr: 0.0,
    }
}

pub fn band_parameters() -> SharedFrequencyBandParameters {
    let mut params =
        SharedFrequencyBandParameters::for_band(coda_cal::models::FrequencyBand::new(LOW, HIGH));
    params.min_snr = 1.0;
    params
}

pub fn station(name: &str, longitude: f64) -> Station {
    Station {
        station_name: name.to_string(),
        latitude: 0.0,
        longitude,
    }
}

pub fn event(event_id: &str, origin_time: DateTime<Utc>) -> Event {
    Event {
        event_id: event_id.to_string(),
        latitude: 0.0,
        longitude: 0.0,
        origin_time,
    }
}

pub fn origin(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2022, 3, 14, hour, 0, 0).unwrap()
}

/// One-sample-per-second log10 envelope: zero until the 3.5 km/s arrival,
/// then `level + synthetic_point(0.8, -0.004, t)` up to well past the F pick
pub fn coda_stack(id: u64, event: &Event, station: &Station, level: f64) -> Waveform {
    let distance = Wgs84Distance.distance_km(
        event.latitude,
        event.longitude,
        station.latitude,
        station.longitude,
    );
    let arrival = (distance / ARRIVAL_VELOCITY).ceil();
    let f_pick = arrival + CODA_SECONDS;
    let samples = LEAD as usize + f_pick as usize + 100;

    let segment: Vec<f64> = (0..samples)
        .map(|i| {
            let seconds = i as f64 - LEAD as f64;
            if seconds < arrival {
                0.0
            } else {
                level + synthetic_point(0.8, -0.004, seconds - arrival + 1.0)
            }
        })
        .collect();

    let begin_time = event.origin_time - Duration::seconds(LEAD);
    Waveform {
        id,
        event: Some(event.clone()),
        stream: Some(Stream {
            station: station.clone(),
            channel_name: "BHZ".to_string(),
        }),
        begin_time,
        end_time: begin_time + Duration::seconds(samples as i64 - 1),
        sample_rate: 1.0,
        segment,
        low_frequency: LOW,
        high_frequency: HIGH,
        associated_picks: vec![WaveformPick::new(PickType::F, f_pick)],
    }
}

/// Three co-located events recorded at two stations
///
/// Event levels are offset by `offsets` (E1, E2, E3); station B sits
/// 0.3 log units below station A. E1 is the Mw 4.0 reference.
pub fn three_event_dataset(offsets: [f64; 3]) -> CalibrationDataset {
    let stations = [(station("STA", 2.0), 0.0), (station("STB", 3.0), -0.3)];
    let events = [
        event("E1", origin(1)),
        event("E2", origin(5)),
        event("E3", origin(9)),
    ];

    let mut stacks = Vec::new();
    let mut id = 1;
    for (event, offset) in events.iter().zip(offsets) {
        for (station, site) in &stations {
            stacks.push(coda_stack(id, event, station, 2.0 + offset + site));
            id += 1;
        }
    }

    CalibrationDataset {
        stacks,
        shared_parameters: vec![band_parameters()],
        site_parameters: Vec::new(),
        mdac_fi: fi(),
        mdac_ps: vec![lg()],
        reference_mws: vec![ReferenceMwParameters {
            event_id: "E1".to_string(),
            ref_mw: 4.0,
            ref_apparent_stress_in_mpa: None,
        }],
    }
}

/// [`three_event_dataset`] with every stack repeated in a 1-2 Hz band
///
/// Both bands start from the same preset path terms (S1 0.8, Q 250,
/// Xc 80, Xt 3).
pub fn two_band_dataset(offsets: [f64; 3]) -> CalibrationDataset {
    let mut dataset = three_event_dataset(offsets);
    let next_id = dataset.stacks.len() as u64 + 1;
    let repeated: Vec<Waveform> = dataset
        .stacks
        .iter()
        .enumerate()
        .map(|(i, stack)| {
            let mut stack = stack.clone();
            stack.id = next_id + i as u64;
            stack.low_frequency = 1.0;
            stack.high_frequency = 2.0;
            stack
        })
        .collect();
    dataset.stacks.extend(repeated);

    let mut upper =
        SharedFrequencyBandParameters::for_band(coda_cal::models::FrequencyBand::new(1.0, 2.0));
    upper.min_snr = 1.0;
    dataset.shared_parameters.push(upper);
    for params in &mut dataset.shared_parameters {
        params.s1 = 0.8;
        params.q = 250.0;
        params.xc = 80.0;
        params.xt = 3.0;
    }
    dataset
}

/// Dataset with band and MDAC records but no stacks
pub fn empty_dataset() -> CalibrationDataset {
    CalibrationDataset {
        stacks: Vec::new(),
        shared_parameters: vec![band_parameters()],
        site_parameters: Vec::new(),
        mdac_fi: fi(),
        mdac_ps: vec![lg()],
        reference_mws: Vec::new(),
    }
}
