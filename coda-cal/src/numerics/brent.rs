//! Brent univariate minimizer
//!
//! Golden-section search with parabolic interpolation. Stops when the
//! current point is within `rel * |x| + abs` of the interval midpoint.

use super::{EvaluationCounter, NumericsError, PointValue};

const GOLDEN_SECTION: f64 = 0.381_966_011_250_105_1; // 0.5 * (3 - sqrt(5))

/// Brent minimizer with fixed tolerances
#[derive(Debug, Clone, Copy)]
pub struct BrentOptimizer {
    relative_threshold: f64,
    absolute_threshold: f64,
}

impl BrentOptimizer {
    /// Create a minimizer
    ///
    /// `rel` must be at least twice machine epsilon and `abs` strictly positive.
    pub fn new(rel: f64, abs: f64) -> Result<Self, NumericsError> {
        if rel < 2.0 * f64::EPSILON {
            return Err(NumericsError::InvalidArguments(format!(
                "relative threshold {} too small",
                rel
            )));
        }
        if abs <= 0.0 {
            return Err(NumericsError::InvalidArguments(format!(
                "absolute threshold {} must be positive",
                abs
            )));
        }
        Ok(Self {
            relative_threshold: rel,
            absolute_threshold: abs,
        })
    }

    /// Minimize `f` on `[lo, hi]` starting from `start`
    pub fn minimize<F>(
        &self,
        mut f: F,
        lo: f64,
        hi: f64,
        start: f64,
        max_evaluations: usize,
    ) -> Result<PointValue, NumericsError>
    where
        F: FnMut(f64) -> f64,
    {
        let mut counter = EvaluationCounter::new(max_evaluations);
        self.minimize_counted(&mut f, lo, hi, start, &mut counter)
    }

    /// Minimize, charging evaluations to an external budget
    pub fn minimize_counted<F>(
        &self,
        f: &mut F,
        lo: f64,
        hi: f64,
        start: f64,
        counter: &mut EvaluationCounter,
    ) -> Result<PointValue, NumericsError>
    where
        F: FnMut(f64) -> f64,
    {
        let (mut a, mut b) = if lo < hi { (lo, hi) } else { (hi, lo) };

        let mut x = start;
        let mut v = x;
        let mut w = x;
        let mut d: f64 = 0.0;
        let mut e: f64 = 0.0;

        counter.increment()?;
        let mut fx = f(x);
        let mut fv = fx;
        let mut fw = fx;

        let mut previous: Option<PointValue> = None;
        let mut current = PointValue { point: x, value: fx };
        let mut best = current;

        loop {
            let m = 0.5 * (a + b);
            let tol1 = self.relative_threshold * x.abs() + self.absolute_threshold;
            let tol2 = 2.0 * tol1;

            let stop = (x - m).abs() <= tol2 - 0.5 * (b - a);
            if stop {
                return Ok(best_of(best, best_of_opt(previous, current)));
            }

            if e.abs() > tol1 {
                // Fit parabola
                let mut r = (x - w) * (fx - fv);
                let mut q = (x - v) * (fx - fw);
                let mut p = (x - v) * q - (x - w) * r;
                q = 2.0 * (q - r);

                if q > 0.0 {
                    p = -p;
                } else {
                    q = -q;
                }

                r = e;
                e = d;

                if p > q * (a - x) && p < q * (b - x) && p.abs() < (0.5 * q * r).abs() {
                    // Parabolic interpolation step
                    d = p / q;
                    let u = x + d;

                    // f must not be evaluated too close to a or b
                    if u - a < tol2 || b - u < tol2 {
                        d = if x <= m { tol1 } else { -tol1 };
                    }
                } else {
                    // Golden section step
                    e = if x < m { b - x } else { a - x };
                    d = GOLDEN_SECTION * e;
                }
            } else {
                e = if x < m { b - x } else { a - x };
                d = GOLDEN_SECTION * e;
            }

            // f must not be evaluated too close to x
            let u = if d.abs() < tol1 {
                if d >= 0.0 {
                    x + tol1
                } else {
                    x - tol1
                }
            } else {
                x + d
            };

            counter.increment()?;
            let fu = f(u);

            previous = Some(current);
            current = PointValue { point: u, value: fu };
            best = best_of(best, best_of_opt(previous, current));

            if fu <= fx {
                if u < x {
                    b = x;
                } else {
                    a = x;
                }
                v = w;
                fv = fw;
                w = x;
                fw = fx;
                x = u;
                fx = fu;
            } else {
                if u < x {
                    a = u;
                } else {
                    b = u;
                }
                if fu <= fw || w == x {
                    v = w;
                    fv = fw;
                    w = u;
                    fw = fu;
                } else if fu <= fv || v == x || v == w {
                    v = u;
                    fv = fu;
                }
            }
        }
    }
}

fn best_of(a: PointValue, b: PointValue) -> PointValue {
    if a.value <= b.value {
        a
    } else {
        b
    }
}

fn best_of_opt(a: Option<PointValue>, b: PointValue) -> PointValue {
    match a {
        Some(a) => best_of(a, b),
        None => b,
    }
}
