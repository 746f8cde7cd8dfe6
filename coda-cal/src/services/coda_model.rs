//! Empirical coda envelope model
//!
//! `log10 A(t) = 1 - gamma(r) * log10(t) + beta(r) * t` with each of
//! velocity, beta and gamma following `x(r) = x0 - x1 / (x2 + r)`.

use crate::models::SharedFrequencyBandParameters;

/// Value returned for `t <= 0`, where the envelope is undefined
pub const UNDEFINED_AMPLITUDE: f64 = -10.0;

// log10(A0) is fixed at 1
const LOG10_A0: f64 = 1.0;

/// `x0 - x1 / (x2 + distance)`; `x0` when the denominator vanishes
pub fn distance_function(x0: f64, x1: f64, x2: f64, distance: f64) -> f64 {
    let denominator = x2 + distance;
    if denominator == 0.0 {
        return x0;
    }
    x0 - x1 / denominator
}

/// Synthetic envelope value `t` seconds after coda start
pub fn synthetic_point(gamma: f64, beta: f64, t: f64) -> f64 {
    if t <= 0.0 {
        return UNDEFINED_AMPLITUDE;
    }
    LOG10_A0 - gamma * t.log10() + beta * t
}

pub fn velocity_at(params: &SharedFrequencyBandParameters, distance: f64) -> f64 {
    distance_function(params.velocity0, params.velocity1, params.velocity2, distance)
}

pub fn beta_at(params: &SharedFrequencyBandParameters, distance: f64) -> f64 {
    distance_function(params.beta0, params.beta1, params.beta2, distance)
}

pub fn gamma_at(params: &SharedFrequencyBandParameters, distance: f64) -> f64 {
    distance_function(params.gamma0, params.gamma1, params.gamma2, distance)
}

/// Model envelope value at a measurement time and distance
pub fn point_at_time_and_distance(
    params: &SharedFrequencyBandParameters,
    measurement_time: f64,
    distance: f64,
) -> f64 {
    synthetic_point(gamma_at(params, distance), beta_at(params, distance), measurement_time)
}
