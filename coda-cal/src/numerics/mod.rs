//! Derivative-free optimization and robust statistics
//!
//! - `brent`: univariate minimization on an interval
//! - `powell`: multivariate conjugate-direction minimization with a
//!   bracketing line search
//! - `robust`: L1.2 central value
//! - `stats`: running means, medians, least squares lines, CVRMSD

pub mod brent;
pub mod powell;
pub mod robust;
pub mod stats;

use thiserror::Error;

pub use brent::BrentOptimizer;
pub use powell::{PowellOptimizer, PowellOutcome};
pub use robust::lp_mean;

/// Numerical routine failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NumericsError {
    /// Objective evaluation budget exhausted
    #[error("Maximal evaluation count ({0}) exceeded")]
    TooManyEvaluations(usize),

    /// Search arguments are unusable
    #[error("Invalid search arguments: {0}")]
    InvalidArguments(String),

    /// Empty input where at least one value is required
    #[error("No data")]
    NoData,
}

/// Point/value pair returned by minimizers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointValue {
    pub point: f64,
    pub value: f64,
}

/// Counts objective evaluations against a budget
#[derive(Debug, Clone)]
pub struct EvaluationCounter {
    count: usize,
    max: usize,
}

impl EvaluationCounter {
    pub fn new(max: usize) -> Self {
        Self { count: 0, max }
    }

    /// Record one evaluation, failing once the budget is exceeded
    pub fn increment(&mut self) -> Result<(), NumericsError> {
        self.count += 1;
        if self.count > self.max {
            return Err(NumericsError::TooManyEvaluations(self.max));
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
