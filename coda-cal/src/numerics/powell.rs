//! Powell conjugate-direction minimizer
//!
//! Each iteration runs a line search along every direction in the set, then
//! replaces the direction of largest decrease with the net displacement when
//! the extrapolated point shows the new direction is worth keeping. Line
//! searches bracket the minimum by downhill expansion before handing the
//! bracket to [`BrentOptimizer`].

use super::{BrentOptimizer, EvaluationCounter, NumericsError, PointValue};

const GOLD: f64 = 1.618_034;
const EPS_MIN: f64 = 1e-21;
const GROW_LIMIT: f64 = 100.0;
const MAX_BRACKET_EVALUATIONS: usize = 500;
const INITIAL_BRACKET_RANGE: f64 = 1.0;

/// Converged point and objective value
#[derive(Debug, Clone, PartialEq)]
pub struct PowellOutcome {
    pub point: Vec<f64>,
    pub value: f64,
    pub evaluations: usize,
    pub iterations: usize,
}

/// Powell minimizer
///
/// Stops when an iteration's decrease satisfies
/// `2 * (f_prev - f) <= rel * (|f_prev| + |f|) + abs`, or when the value
/// checker (same tolerances, max-relative form) reports convergence.
#[derive(Debug, Clone, Copy)]
pub struct PowellOptimizer {
    relative_threshold: f64,
    absolute_threshold: f64,
    line_relative: f64,
    line_absolute: f64,
    max_evaluations: usize,
}

impl PowellOptimizer {
    /// Create a minimizer; line search tolerances are the square roots of
    /// the main ones.
    pub fn new(rel: f64, abs: f64, max_evaluations: usize) -> Result<Self, NumericsError> {
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
            line_relative: rel.sqrt(),
            line_absolute: abs.sqrt(),
            max_evaluations,
        })
    }

    /// Minimize `f` starting at `start`
    pub fn minimize<F>(&self, mut f: F, start: &[f64]) -> Result<PowellOutcome, NumericsError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let n = start.len();
        if n == 0 {
            return Err(NumericsError::InvalidArguments(
                "start point is empty".to_string(),
            ));
        }

        let line = BrentOptimizer::new(self.line_relative, self.line_absolute)?;
        let mut counter = EvaluationCounter::new(self.max_evaluations);

        // Initial direction set: the unit vectors
        let mut direc: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let mut d = vec![0.0; n];
                d[i] = 1.0;
                d
            })
            .collect();

        let mut x = start.to_vec();
        counter.increment()?;
        let mut f_val = f(&x);
        let mut x1 = x.clone();
        let mut iterations = 0usize;

        loop {
            iterations += 1;

            let f_x = f_val;
            let mut delta = 0.0;
            let mut big_ind = 0usize;

            for (i, d) in direc.iter().enumerate() {
                let f_x2 = f_val;
                let optimum = line_search(&mut f, &line, &x, d, &mut counter)?;
                f_val = optimum.value;
                x = step(&x, d, optimum.point);

                if f_x2 - f_val > delta {
                    delta = f_x2 - f_val;
                    big_ind = i;
                }
            }

            let mut stop = 2.0 * (f_x - f_val)
                <= self.relative_threshold * (f_x.abs() + f_val.abs()) + self.absolute_threshold;

            if !stop {
                stop = values_converged(
                    f_x,
                    f_val,
                    self.relative_threshold,
                    self.absolute_threshold,
                );
            }

            if stop {
                let (point, value) = if f_val < f_x {
                    (x, f_val)
                } else {
                    (x1, f_x)
                };
                return Ok(PowellOutcome {
                    point,
                    value,
                    evaluations: counter.count(),
                    iterations,
                });
            }

            let d: Vec<f64> = x.iter().zip(&x1).map(|(xi, x1i)| xi - x1i).collect();
            let x2: Vec<f64> = x.iter().zip(&x1).map(|(xi, x1i)| 2.0 * xi - x1i).collect();

            x1 = x.clone();
            counter.increment()?;
            let f_x2 = f(&x2);

            if f_x > f_x2 {
                let mut t = 2.0 * (f_x + f_x2 - 2.0 * f_val);
                let mut temp = f_x - f_val - delta;
                t *= temp * temp;
                temp = f_x - f_x2;
                t -= delta * temp * temp;

                if t < 0.0 {
                    let optimum = line_search(&mut f, &line, &x, &d, &mut counter)?;
                    f_val = optimum.value;
                    let new_direction: Vec<f64> = d.iter().map(|di| di * optimum.point).collect();
                    x = x.iter().zip(&new_direction).map(|(xi, di)| xi + di).collect();

                    let last = n - 1;
                    direc[big_ind] = direc[last].clone();
                    direc[last] = new_direction;
                }
            }
        }
    }
}

fn values_converged(previous: f64, current: f64, rel: f64, abs: f64) -> bool {
    let difference = (previous - current).abs();
    let size = previous.abs().max(current.abs());
    difference <= size * rel || difference <= abs
}

fn step(x: &[f64], d: &[f64], alpha: f64) -> Vec<f64> {
    x.iter().zip(d).map(|(xi, di)| xi + alpha * di).collect()
}

/// Minimize `f(x + alpha * d)` over alpha
fn line_search<F>(
    f: &mut F,
    line: &BrentOptimizer,
    x: &[f64],
    d: &[f64],
    counter: &mut EvaluationCounter,
) -> Result<PointValue, NumericsError>
where
    F: FnMut(&[f64]) -> f64,
{
    let mut along = |alpha: f64| f(&step(x, d, alpha));
    let bracket = bracket_minimum(&mut along, 0.0, INITIAL_BRACKET_RANGE, counter)?;
    line.minimize_counted(&mut along, bracket.lo, bracket.hi, bracket.mid, counter)
}

/// Interval known to contain a local minimum, with an interior point
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bracket {
    lo: f64,
    mid: f64,
    hi: f64,
}

/// Downhill bracket expansion with parabolic extrapolation
fn bracket_minimum<F>(
    f: &mut F,
    x_a_start: f64,
    x_b_start: f64,
    counter: &mut EvaluationCounter,
) -> Result<Bracket, NumericsError>
where
    F: FnMut(f64) -> f64,
{
    let mut local = EvaluationCounter::new(MAX_BRACKET_EVALUATIONS);
    let mut eval = |x: f64, local: &mut EvaluationCounter| -> Result<f64, NumericsError> {
        local.increment()?;
        counter.increment()?;
        Ok(f(x))
    };

    let mut x_a = x_a_start;
    let mut x_b = x_b_start;
    let mut f_a = eval(x_a, &mut local)?;
    let mut f_b = eval(x_b, &mut local)?;

    if f_a < f_b {
        std::mem::swap(&mut x_a, &mut x_b);
        std::mem::swap(&mut f_a, &mut f_b);
    }

    let mut x_c = x_b + GOLD * (x_b - x_a);
    let mut f_c = eval(x_c, &mut local)?;

    while f_c < f_b {
        let tmp1 = (x_b - x_a) * (f_b - f_c);
        let tmp2 = (x_b - x_c) * (f_b - f_a);

        let val = tmp2 - tmp1;
        let denom = if val.abs() < EPS_MIN { 2.0 * EPS_MIN } else { val };

        let mut w = x_b - ((x_b - x_c) * tmp2 - (x_b - x_a) * tmp1) / (2.0 * denom);
        let w_lim = x_b + GROW_LIMIT * (x_c - x_b);

        let mut f_w;
        if (w - x_c) * (x_b - w) > 0.0 {
            f_w = eval(w, &mut local)?;
            // only positions matter once the bracket is closed
            if f_w < f_c {
                x_a = x_b;
                x_b = w;
                break;
            } else if f_w > f_b {
                x_c = w;
                break;
            }
            w = x_c + GOLD * (x_c - x_b);
            f_w = eval(w, &mut local)?;
        } else if (w - w_lim) * (w_lim - x_c) >= 0.0 {
            w = w_lim;
            f_w = eval(w, &mut local)?;
        } else if (w - w_lim) * (x_c - w) > 0.0 {
            f_w = eval(w, &mut local)?;
            if f_w < f_c {
                x_b = x_c;
                x_c = w;
                w = x_c + GOLD * (x_c - x_b);
                f_b = f_c;
                f_c = f_w;
                f_w = eval(w, &mut local)?;
            }
        } else {
            w = x_c + GOLD * (x_c - x_b);
            f_w = eval(w, &mut local)?;
        }

        x_a = x_b;
        f_a = f_b;
        x_b = x_c;
        f_b = f_c;
        x_c = w;
        f_c = f_w;
    }

    let (lo, hi) = if x_a <= x_c { (x_a, x_c) } else { (x_c, x_a) };
    Ok(Bracket { lo, mid: x_b, hi })
}
