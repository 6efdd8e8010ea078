use chrono::NaiveDateTime;
use serde::Serialize;

use crate::cleaning::imputation::mode;
use crate::data::model::{CellValue, Column, ColumnType, Table};
use crate::numeric;

/// Descriptive statistics for one column, shaped by its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSummary {
    Numeric {
        column: String,
        count: usize,
        missing: usize,
        mean: Option<f64>,
        std: Option<f64>,
        min: Option<f64>,
        q1: Option<f64>,
        median: Option<f64>,
        q3: Option<f64>,
        max: Option<f64>,
    },
    /// Categorical, text and boolean columns.
    Categorical {
        column: String,
        count: usize,
        missing: usize,
        distinct: usize,
        mode: Option<CellValue>,
        mode_frequency: usize,
    },
    DateTime {
        column: String,
        count: usize,
        missing: usize,
        min: Option<NaiveDateTime>,
        max: Option<NaiveDateTime>,
    },
}

impl ColumnSummary {
    pub fn column(&self) -> &str {
        match self {
            ColumnSummary::Numeric { column, .. }
            | ColumnSummary::Categorical { column, .. }
            | ColumnSummary::DateTime { column, .. } => column,
        }
    }
}

/// Summaries for every column in table order.
pub fn describe(table: &Table) -> Vec<ColumnSummary> {
    table.columns().iter().map(describe_column).collect()
}

pub fn describe_column(col: &Column) -> ColumnSummary {
    let missing = col.missing_count();
    let count = col.len() - missing;
    let column = col.name().to_string();

    match col.column_type() {
        ColumnType::Numeric => {
            let mut xs: Vec<f64> = col.values().iter().filter_map(CellValue::as_f64).collect();
            xs.sort_by(f64::total_cmp);
            let q = |p: f64| numeric::quantile_sorted(&xs, p);
            ColumnSummary::Numeric {
                column,
                count,
                missing,
                mean: numeric::mean(&xs),
                std: numeric::std_dev(&xs),
                min: xs.first().copied(),
                q1: q(0.25),
                median: q(0.5),
                q3: q(0.75),
                max: xs.last().copied(),
            }
        }
        ColumnType::DateTime => {
            let stamps = col.values().iter().filter_map(|v| match v {
                CellValue::DateTime(d) => Some(*d),
                _ => None,
            });
            let (min, max) = stamps.fold((None, None), |(lo, hi): (Option<NaiveDateTime>, Option<NaiveDateTime>), d| {
                (
                    Some(lo.map_or(d, |l| l.min(d))),
                    Some(hi.map_or(d, |h| h.max(d))),
                )
            });
            ColumnSummary::DateTime {
                column,
                count,
                missing,
                min,
                max,
            }
        }
        ColumnType::Categorical | ColumnType::Text | ColumnType::Boolean => {
            let mut distinct: Vec<&CellValue> =
                col.values().iter().filter(|v| !v.is_missing()).collect();
            distinct.sort();
            distinct.dedup();
            let top = mode(col.values());
            ColumnSummary::Categorical {
                column,
                count,
                missing,
                distinct: distinct.len(),
                mode_frequency: top.as_ref().map_or(0, |(_, n)| *n),
                mode: top.map(|(v, _)| v),
            }
        }
    }
}
