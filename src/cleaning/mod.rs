//! Cleaning engine: imputation, duplicate removal, outlier handling and type
//! conversion. Every operation here is pure: it reads a [`Table`] and returns
//! a new one plus a [`CleaningSummary`]. Committing is the caller's job.

pub mod conversion;
pub mod duplicates;
pub mod imputation;
pub mod outliers;

use serde::Serialize;

use crate::data::model::Table;

/// Structured report every mutating cleaning operation returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleaningSummary {
    pub operation: String,
    pub rows_before: usize,
    pub rows_after: usize,
    /// Cells whose value changed (rows removed count every cell of the row).
    pub cells_affected: usize,
    pub columns_affected: Vec<String>,
    /// Human-readable notes such as KNN fallbacks.
    pub notices: Vec<String>,
}

impl CleaningSummary {
    pub(crate) fn new(operation: &str, rows_before: usize) -> Self {
        Self {
            operation: operation.to_string(),
            rows_before,
            rows_after: rows_before,
            cells_affected: 0,
            columns_affected: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn rows_removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Missing cells of one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingCount {
    pub column: String,
    pub missing: usize,
    pub percent: f64,
}

/// Missing-value count and share for every column, in table order.
pub fn missing_report(table: &Table) -> Vec<MissingCount> {
    table
        .columns()
        .iter()
        .map(|c| {
            let missing = c.missing_count();
            MissingCount {
                column: c.name().to_string(),
                missing,
                percent: if table.n_rows() == 0 {
                    0.0
                } else {
                    missing as f64 / table.n_rows() as f64 * 100.0
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;

    #[test]
    fn reports_missing_share() {
        let t = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), None, None, Some(2.0)]),
            Column::categorical("b", vec![Some("x"), Some("y"), Some("z"), Some("w")]),
        ])
        .unwrap();
        let report = missing_report(&t);
        assert_eq!(report[0].missing, 2);
        assert_eq!(report[0].percent, 50.0);
        assert_eq!(report[1].missing, 0);
    }
}
