//! Extended Street-Herrmann geometric spreading and attenuation

use std::f64::consts::{E, PI};

/// log10 of Euler's number, folded into the attenuation term
pub fn efact() -> f64 {
    E.log10()
}

/// Extended Street-Herrmann log-amplitude spreading at `distance` km
///
/// Spreading decays with exponent `s1` out to `xcross / xtrans`, with `s2`
/// beyond `xcross * xtrans`, and with a linearly varying exponent across
/// the transition region between them. The three pieces meet continuously.
pub fn log_correction(s1: f64, s2: f64, xcross: f64, xtrans: f64, distance: f64) -> f64 {
    let xstart = xcross / xtrans;
    let xend = xcross * xtrans;

    if distance <= xstart {
        -s1 * distance.log10()
    } else if distance >= xend {
        let ds = s2 - s1;
        -s1 * xstart.log10() - (s1 + ds / 2.0) * (xend / xstart).log10()
            - s2 * (distance / xend).log10()
    } else {
        let slope = (s2 - s1) / (xend / xstart).log10();
        let ds = slope * (distance / xstart).log10();
        -s1 * xstart.log10() - (s1 + ds / 2.0) * (distance / xstart).log10()
    }
}

/// Anelastic attenuation in log10 units at the band's geometric center
pub fn attenuation(f0: f64, q: f64, distance: f64, phase_velocity: f64) -> f64 {
    distance * PI * f0 * efact() / (q * phase_velocity)
}

/// Positive path correction added to raw amplitudes
///
/// `-log_correction + attenuation`, or 0 when either the spreading term or
/// Q is zero (an uncalibrated band).
#[allow(clippy::too_many_arguments)]
pub fn path_correction(
    low_frequency: f64,
    high_frequency: f64,
    s1: f64,
    s2: f64,
    xcross: f64,
    xtrans: f64,
    q: f64,
    distance: f64,
    phase_velocity: f64,
) -> f64 {
    let esh = log_correction(s1, s2, xcross, xtrans, distance);
    if esh == 0.0 || q == 0.0 || !esh.is_finite() {
        return 0.0;
    }
    let f0 = (low_frequency * high_frequency).sqrt();
    -esh + attenuation(f0, q, distance, phase_velocity)
}
