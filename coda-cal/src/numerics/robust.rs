//! Robust central value under an L1.2 loss

use super::{BrentOptimizer, NumericsError};

/// Exponent of the robust loss
pub const LP_NORM: f64 = 1.2;

const BRENT_REL: f64 = 1e-10;
const BRENT_ABS: f64 = 1e-14;
const BRENT_MAX_EVALUATIONS: usize = 1_000_000;

/// Value `x0` minimizing `sum(|x_i - x0|^1.2)` over `[min, max]`
///
/// - one value: that value
/// - two values, or all values equal: the midpoint of min and max
/// - otherwise: Brent search on `[min, max]` starting from the midpoint
pub fn lp_mean(values: &[f64]) -> Result<f64, NumericsError> {
    let (min, max) = values
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .ok_or(NumericsError::NoData)?;

    if values.len() == 1 {
        return Ok(min);
    }

    let mid = 0.5 * (min + max);
    if values.len() == 2 || min == max {
        return Ok(mid);
    }

    let brent = BrentOptimizer::new(BRENT_REL, BRENT_ABS)?;
    let optimum = brent.minimize(
        |x0| lp_cost(values, x0),
        min,
        max,
        mid,
        BRENT_MAX_EVALUATIONS,
    )?;
    Ok(optimum.point)
}

/// Sum of `|x_i - x0|^1.2`
pub fn lp_cost(values: &[f64], x0: f64) -> f64 {
    values.iter().map(|v| (v - x0).abs().powf(LP_NORM)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_error() {
        assert_eq!(lp_mean(&[]), Err(NumericsError::NoData));
    }

    #[test]
    fn test_single_value() {
        assert_eq!(lp_mean(&[3.25]).unwrap(), 3.25);
    }

    #[test]
    fn test_two_values_midpoint() {
        assert_eq!(lp_mean(&[1.0, 4.0]).unwrap(), 2.5);
    }

    #[test]
    fn test_constant_values() {
        assert_eq!(lp_mean(&[2.0, 2.0, 2.0]).unwrap(), 2.0);
    }

    #[test]
    fn test_symmetric_values_center() {
        let center = lp_mean(&[-1.0, 0.0, 1.0]).unwrap();
        assert!(center.abs() < 1e-6, "got {}", center);
    }

    #[test]
    fn test_resists_outlier() {
        let values = [1.0, 1.1, 0.9, 1.05, 20.0];
        let arithmetic: f64 = values.iter().sum::<f64>() / values.len() as f64;
        let robust = lp_mean(&values).unwrap();
        assert!(robust < arithmetic, "robust {} arithmetic {}", robust, arithmetic);
        assert!(robust > 0.9 && robust < 3.0, "got {}", robust);
    }

    #[test]
    fn test_result_minimizes_cost() {
        let values = [0.3, 2.0, 2.1, 5.0];
        let center = lp_mean(&values).unwrap();
        let best = lp_cost(&values, center);
        assert!(best <= lp_cost(&values, center + 0.01) + 1e-9);
        assert!(best <= lp_cost(&values, center - 0.01) + 1e-9);
    }
}
