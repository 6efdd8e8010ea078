//! Ordinary least squares via the normal equations.

use ndarray::{Array1, Array2};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor};

use crate::error::{EngineError, Result};
use crate::stats::t_critical;

/// Goodness-of-fit figures for a linear fit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionMetrics {
    pub r_squared: f64,
    pub adj_r_squared: f64,
    /// Residual standard error, sqrt(SSE / (n − p − 1)).
    pub residual_std_error: f64,
    pub f_statistic: f64,
    pub f_p_value: f64,
    pub n_obs: usize,
}

/// Trained coefficients plus what the confidence band needs.
#[derive(Debug, Clone)]
pub(crate) struct LinearFit {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    /// (X'X)⁻¹ of the design matrix with its leading column of ones.
    xtx_inv: Array2<f64>,
    rse: f64,
    t_crit: f64,
}

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
fn invert(m: &Array2<f64>) -> Result<Array2<f64>> {
    let n = m.nrows();
    let mut a = m.clone();
    let mut inv = Array2::<f64>::eye(n);
    let scale = m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() <= 1e-12 * scale {
            return Err(EngineError::SingularMatrix);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
                inv.swap([pivot, k], [col, k]);
            }
        }
        let p = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= p;
            inv[[col, k]] /= p;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Ok(inv)
}

/// Fit `y ≈ b0 + X·b` on complete rows. Needs at least `p + 2` rows so the
/// residual variance has one degree of freedom.
pub(crate) fn fit(
    x: &[Vec<f64>],
    y: &[f64],
    confidence_level: f64,
) -> Result<(LinearFit, RegressionMetrics)> {
    let n = x.len();
    let p = x.first().map_or(0, Vec::len);
    if n < p + 2 {
        return Err(EngineError::insufficient("linear regression rows", p + 2, n));
    }

    let mut design = Array2::<f64>::ones((n, p + 1));
    for (i, row) in x.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            design[[i, j + 1]] = *v;
        }
    }
    let target = Array1::from(y.to_vec());

    let xt = design.t();
    let xtx_inv = invert(&xt.dot(&design))?;
    let beta = xtx_inv.dot(&xt.dot(&target));

    let fitted = design.dot(&beta);
    let mean_y = y.iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean_y).powi(2)).sum();
    let ss_res: f64 = y.iter().zip(fitted.iter()).map(|(v, f)| (v - f).powi(2)).sum();
    if ss_tot == 0.0 {
        return Err(EngineError::UndefinedStatistic(
            "regression target has zero variance".into(),
        ));
    }

    let df_res = (n - p - 1) as f64;
    let r_squared = 1.0 - ss_res / ss_tot;
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_res;
    let rse = (ss_res / df_res).sqrt();

    let (f_statistic, f_p_value) = if p == 0 {
        (0.0, 1.0)
    } else if ss_res <= f64::EPSILON * ss_tot {
        (f64::INFINITY, 0.0)
    } else {
        let f = ((ss_tot - ss_res) / p as f64) / (ss_res / df_res);
        let dist = FisherSnedecor::new(p as f64, df_res)
            .map_err(|e| EngineError::UndefinedStatistic(e.to_string()))?;
        (f, dist.sf(f))
    };

    let fit = LinearFit {
        intercept: beta[0],
        coefficients: beta.iter().skip(1).copied().collect(),
        xtx_inv,
        rse,
        t_crit: t_critical(confidence_level, df_res)?,
    };
    let metrics = RegressionMetrics {
        r_squared,
        adj_r_squared,
        residual_std_error: rse,
        f_statistic,
        f_p_value,
        n_obs: n,
    };
    Ok((fit, metrics))
}

impl LinearFit {
    /// Point prediction with the confidence interval of the mean response.
    pub(crate) fn predict(&self, row: &[f64]) -> (f64, f64, f64) {
        let x0: Array1<f64> = std::iter::once(1.0).chain(row.iter().copied()).collect();
        let value = self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, v)| b * v)
                .sum::<f64>();
        let leverage = x0.dot(&self.xtx_inv.dot(&x0)).max(0.0);
        let half = self.t_crit * self.rse * leverage.sqrt();
        (value, value - half, value + half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_line() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 1.0).collect();
        let (fit, metrics) = super::fit(&x, &y, 0.95).unwrap();
        assert_relative_eq!(fit.coefficients[0], 2.0, epsilon = 1e-9);
        assert_relative_eq!(fit.intercept, 1.0, epsilon = 1e-9);
        assert_relative_eq!(metrics.r_squared, 1.0, epsilon = 1e-12);
        let (v, lo, hi) = fit.predict(&[20.0]);
        assert_relative_eq!(v, 41.0, epsilon = 1e-8);
        assert!(hi - lo < 1e-6);
    }

    #[test]
    fn interval_widens_away_from_the_data() {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..12)
            .map(|i| 3.0 * i as f64 - 2.0 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let (fit, metrics) = super::fit(&x, &y, 0.95).unwrap();
        let (_, lo_mid, hi_mid) = fit.predict(&[5.5]);
        let (_, lo_far, hi_far) = fit.predict(&[40.0]);
        assert!(hi_far - lo_far > hi_mid - lo_mid);
        assert!(metrics.f_p_value < 1e-6);
        assert!(metrics.adj_r_squared <= metrics.r_squared);
    }

    #[test]
    fn collinear_features_are_singular() {
        let x: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..6).map(|i| i as f64 + (i % 3) as f64).collect();
        assert!(matches!(super::fit(&x, &y, 0.95), Err(EngineError::SingularMatrix)));
    }

    #[test]
    fn too_few_rows_is_insufficient() {
        let x = vec![vec![1.0, 2.0], vec![2.0, 1.0], vec![3.0, 5.0]];
        let y = vec![1.0, 2.0, 3.0];
        assert!(matches!(
            super::fit(&x, &y, 0.95),
            Err(EngineError::InsufficientData { required: 4, actual: 3, .. })
        ));
    }
}
