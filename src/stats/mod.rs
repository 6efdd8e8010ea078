//! Statistics engine: descriptive summaries, correlation matrices and
//! hypothesis tests. Everything here is read-only over a [`Table`].
//!
//! [`Table`]: crate::data::model::Table

pub mod correlation;
pub mod hypothesis;
pub mod summary;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::error::{EngineError, Result};

/// Outcome of one statistical test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticalResult {
    pub test: String,
    pub statistic: f64,
    pub p_value: Option<f64>,
    /// Fractional for Welch's t-test; the first (between-group) degrees of
    /// freedom for ANOVA.
    pub dof: Option<f64>,
    pub columns: Vec<String>,
}

impl StatisticalResult {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.is_some_and(|p| p < alpha)
    }
}

fn undefined(e: impl std::fmt::Display) -> EngineError {
    EngineError::UndefinedStatistic(e.to_string())
}

/// Two-sided p-value of `t` under Student's t with `dof` degrees of freedom.
pub(crate) fn t_two_sided(t: f64, dof: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof).map_err(undefined)?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// Two-sided critical value for a `level` confidence interval.
pub(crate) fn t_critical(level: f64, dof: f64) -> Result<f64> {
    let dist = StudentsT::new(0.0, 1.0, dof).map_err(undefined)?;
    Ok(dist.inverse_cdf(1.0 - (1.0 - level) / 2.0))
}
