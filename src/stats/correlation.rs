use serde::{Deserialize, Serialize};

use crate::data::model::Table;
use crate::error::Result;
use crate::numeric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    /// Pearson over average ranks.
    Spearman,
}

/// Square matrix of pairwise correlations. `None` marks an undefined cell
/// (zero variance or fewer than two complete pairs).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub method: CorrelationMethod,
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}

/// Rows where both numeric columns are present.
pub(crate) fn paired(table: &Table, a: &str, b: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let xs = table.numeric_values(a)?;
    let ys = table.numeric_values(b)?;
    Ok(xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| x.zip(y))
        .unzip())
}

pub(crate) fn correlate(xs: &[f64], ys: &[f64], method: CorrelationMethod) -> Option<f64> {
    match method {
        CorrelationMethod::Pearson => numeric::pearson(xs, ys),
        CorrelationMethod::Spearman => {
            numeric::pearson(&numeric::average_ranks(xs), &numeric::average_ranks(ys))
        }
    }
}

/// Pairwise correlation over `columns` (every numeric column when empty),
/// using pairwise-complete observations.
pub fn correlation_matrix(
    table: &Table,
    columns: &[String],
    method: CorrelationMethod,
) -> Result<CorrelationMatrix> {
    let columns = if columns.is_empty() {
        table.numeric_column_names()
    } else {
        columns.to_vec()
    };

    let k = columns.len();
    let mut values = vec![vec![None; k]; k];
    for i in 0..k {
        for j in i..k {
            let (xs, ys) = paired(table, &columns[i], &columns[j])?;
            let r = correlate(&xs, &ys, method);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    log::debug!("Computed {k}x{k} {method:?} correlation matrix");
    Ok(CorrelationMatrix {
        method,
        columns,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;
    use crate::error::EngineError;
    use approx::assert_relative_eq;

    fn table() -> Table {
        Table::new(vec![
            Column::numeric("x", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), None]),
            Column::numeric("y", vec![Some(2.0), Some(4.0), Some(6.0), Some(8.0), Some(1.0)]),
            Column::numeric("z", vec![Some(1.0), Some(8.0), Some(27.0), Some(64.0), Some(0.0)]),
            Column::numeric("flat", vec![Some(5.0); 5]),
        ])
        .unwrap()
    }

    #[test]
    fn pearson_matrix_is_symmetric() {
        let m = correlation_matrix(&table(), &[], CorrelationMethod::Pearson).unwrap();
        assert_eq!(m.columns.len(), 4);
        assert_relative_eq!(m.get("x", "y").unwrap(), 1.0);
        assert_eq!(m.get("x", "z"), m.get("z", "x"));
    }

    #[test]
    fn zero_variance_is_undefined_not_an_error() {
        let m = correlation_matrix(&table(), &[], CorrelationMethod::Pearson).unwrap();
        assert_eq!(m.get("flat", "x"), None);
        assert_eq!(m.get("flat", "flat"), None);
    }

    #[test]
    fn spearman_sees_monotonic_relation() {
        let cols = vec!["y".to_string(), "z".to_string()];
        let m = correlation_matrix(&table(), &cols, CorrelationMethod::Spearman).unwrap();
        assert_relative_eq!(m.get("y", "z").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn non_numeric_column_is_rejected() {
        let t = Table::new(vec![Column::categorical("c", vec![Some("a")])]).unwrap();
        let err = correlation_matrix(&t, &["c".to_string()], CorrelationMethod::Pearson).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }
}
