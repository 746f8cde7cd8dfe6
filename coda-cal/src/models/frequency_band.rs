//! Frequency band map key

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A (low, high) frequency range in Hz
///
/// Constructed values are always normalized so that `low <= high`; a band
/// built with swapped bounds compares and hashes equal to the ordered one.
/// Equality and hashing use the bit patterns of the normalized values, so a
/// band is a stable `HashMap`/`BTreeMap` key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "RawFrequencyBand")]
pub struct FrequencyBand {
    low: f64,
    high: f64,
}

#[derive(Deserialize)]
struct RawFrequencyBand {
    low: f64,
    high: f64,
}

impl From<RawFrequencyBand> for FrequencyBand {
    fn from(raw: RawFrequencyBand) -> Self {
        FrequencyBand::new(raw.low, raw.high)
    }
}

impl FrequencyBand {
    /// Create a band, swapping the bounds if given in descending order
    pub fn new(a: f64, b: f64) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self {
            low: normalize_zero(low),
            high: normalize_zero(high),
        }
    }

    /// Create a band, rejecting non-finite or degenerate bounds
    pub fn try_new(a: f64, b: f64) -> Option<Self> {
        if !a.is_finite() || !b.is_finite() || a == b {
            return None;
        }
        Some(Self::new(a, b))
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// Arithmetic center `(low + high) / 2`, used for source-spectrum evaluation
    pub fn center_frequency(&self) -> f64 {
        (self.low + self.high) / 2.0
    }

    /// Geometric center `sqrt(low * high)`, used by the attenuation term
    pub fn geometric_center(&self) -> f64 {
        (self.low * self.high).sqrt()
    }
}

// -0.0 and 0.0 have different bit patterns but must be the same key
fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}

impl PartialEq for FrequencyBand {
    fn eq(&self, other: &Self) -> bool {
        self.low.to_bits() == other.low.to_bits() && self.high.to_bits() == other.high.to_bits()
    }
}

impl Eq for FrequencyBand {}

impl Hash for FrequencyBand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.low.to_bits().hash(state);
        self.high.to_bits().hash(state);
    }
}

impl PartialOrd for FrequencyBand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrequencyBand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.low
            .total_cmp(&other.low)
            .then_with(|| self.high.total_cmp(&other.high))
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;

    fn hash_of(band: &FrequencyBand) -> u64 {
        let mut hasher = DefaultHasher::new();
        band.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_swapped_bounds_are_equal() {
        let a = FrequencyBand::new(0.5, 0.7);
        let b = FrequencyBand::new(0.7, 0.5);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert!(a.low() < a.high());
        assert!(b.low() < b.high());
    }

    #[test]
    fn test_band_as_map_key() {
        let mut map = HashMap::new();
        map.insert(FrequencyBand::new(1.0, 1.5), "one");
        assert_eq!(map.get(&FrequencyBand::new(1.5, 1.0)), Some(&"one"));
        assert_eq!(map.get(&FrequencyBand::new(1.0, 2.0)), None);
    }

    #[test]
    fn test_try_new_rejects_degenerate() {
        assert!(FrequencyBand::try_new(1.0, 1.0).is_none());
        assert!(FrequencyBand::try_new(f64::NAN, 1.0).is_none());
        assert!(FrequencyBand::try_new(0.1, f64::INFINITY).is_none());
        assert!(FrequencyBand::try_new(2.0, 1.0).is_some());
    }

    #[test]
    fn test_negative_zero_is_same_key() {
        assert_eq!(FrequencyBand::new(-0.0, 1.0), FrequencyBand::new(0.0, 1.0));
    }

    #[test]
    fn test_centers() {
        let band = FrequencyBand::new(1.0, 4.0);
        assert_eq!(band.center_frequency(), 2.5);
        assert_eq!(band.geometric_center(), 2.0);
    }

    #[test]
    fn test_deserialize_normalizes() {
        let band: FrequencyBand = serde_json::from_str(r#"{"low": 0.7, "high": 0.5}"#).unwrap();
        assert_eq!(band.low(), 0.5);
        assert_eq!(band.high(), 0.7);
    }

    #[test]
    fn test_ordering_by_low_then_high() {
        let mut bands = vec![
            FrequencyBand::new(1.0, 1.5),
            FrequencyBand::new(0.5, 0.7),
            FrequencyBand::new(0.5, 0.6),
        ];
        bands.sort();
        assert_eq!(bands[0], FrequencyBand::new(0.5, 0.6));
        assert_eq!(bands[2], FrequencyBand::new(1.0, 1.5));
    }
}
