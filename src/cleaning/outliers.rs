use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::CleaningSummary;
use crate::data::model::{CellValue, ColumnType, Table};
use crate::error::{EngineError, Result};
use crate::numeric;

// ---------------------------------------------------------------------------
// Detection and handling strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutlierMethod {
    /// Flag |x − mean| / std > threshold.
    ZScore { threshold: f64 },
    /// Flag values outside Q1 − m·IQR ..= Q3 + m·IQR.
    Iqr { multiplier: f64 },
}

impl OutlierMethod {
    pub fn zscore() -> Self {
        OutlierMethod::ZScore { threshold: 3.0 }
    }

    pub fn iqr() -> Self {
        OutlierMethod::Iqr { multiplier: 1.5 }
    }

    fn validate(&self) -> Result<()> {
        let v = match self {
            OutlierMethod::ZScore { threshold } => *threshold,
            OutlierMethod::Iqr { multiplier } => *multiplier,
        };
        if v > 0.0 {
            Ok(())
        } else {
            Err(EngineError::InvalidParameter(format!(
                "outlier threshold must be positive, got {v}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Drop every row flagged in any selected column.
    Remove,
    /// Clip flagged cells to the violated bound.
    Cap,
    ReplaceMedian,
    ReplaceMean,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Flags for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutliers {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierReport {
    pub method: OutlierMethod,
    /// Only columns with at least one flagged cell.
    pub columns: Vec<ColumnOutliers>,
}

impl OutlierReport {
    /// Union of flagged rows across columns, ascending.
    pub fn flagged_rows(&self) -> BTreeSet<usize> {
        self.columns.iter().flat_map(|c| c.rows.iter().copied()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Detect outliers independently in each of `columns` (numeric only).
///
/// Columns with at most one value are skipped. Under Z-score a zero standard
/// deviation flags nothing.
pub fn detect_outliers(
    table: &Table,
    columns: &[String],
    method: OutlierMethod,
) -> Result<OutlierReport> {
    method.validate()?;
    let mut report = OutlierReport {
        method,
        columns: Vec::new(),
    };

    for name in columns {
        let col = table.column(name)?;
        if col.column_type() != ColumnType::Numeric {
            return Err(EngineError::type_mismatch(name, "numeric", col.column_type()));
        }
        let values = col.as_f64s()?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.len() <= 1 {
            log::debug!("Skipping outlier detection on '{name}': too few values");
            continue;
        }

        let bounds = match method {
            OutlierMethod::ZScore { threshold } => {
                let m = numeric::mean(&present);
                let s = numeric::std_dev(&present).filter(|s| *s > 0.0);
                m.zip(s).map(|(m, s)| (m - threshold * s, m + threshold * s))
            }
            OutlierMethod::Iqr { multiplier } => {
                let q1 = numeric::quantile(&present, 0.25);
                let q3 = numeric::quantile(&present, 0.75);
                q1.zip(q3).map(|(q1, q3)| {
                    let iqr = q3 - q1;
                    (q1 - multiplier * iqr, q3 + multiplier * iqr)
                })
            }
        };
        let Some((lower, upper)) = bounds else {
            continue;
        };

        let rows: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_some_and(|x| x < lower || x > upper))
            .map(|(i, _)| i)
            .collect();
        if !rows.is_empty() {
            report.columns.push(ColumnOutliers {
                column: name.clone(),
                lower,
                upper,
                rows,
            });
        }
    }

    log::info!(
        "Outlier detection ({:?}) flagged {} rows across {} columns",
        method,
        report.flagged_rows().len(),
        report.columns.len()
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Handling
// ---------------------------------------------------------------------------

/// Apply `policy` to the cells flagged in `report`.
pub fn handle_outliers(
    table: &Table,
    report: &OutlierReport,
    policy: OutlierPolicy,
) -> Result<(Table, CleaningSummary)> {
    let mut summary = CleaningSummary::new(
        match policy {
            OutlierPolicy::Remove => "remove_outliers",
            OutlierPolicy::Cap => "cap_outliers",
            OutlierPolicy::ReplaceMedian => "replace_outliers_median",
            OutlierPolicy::ReplaceMean => "replace_outliers_mean",
        },
        table.n_rows(),
    );
    summary.columns_affected = report.columns.iter().map(|c| c.column.clone()).collect();

    if policy == OutlierPolicy::Remove {
        let flagged = report.flagged_rows();
        let keep: Vec<usize> = (0..table.n_rows()).filter(|r| !flagged.contains(r)).collect();
        summary.rows_after = keep.len();
        summary.cells_affected = flagged.len() * table.n_cols();
        return Ok((table.take_rows(&keep), summary));
    }

    let mut out = table.clone();
    for flagged in &report.columns {
        let col = table.column(&flagged.column)?;
        let values = col.as_f64s()?;
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let replacement = match policy {
            OutlierPolicy::ReplaceMedian => numeric::median(&present),
            OutlierPolicy::ReplaceMean => numeric::mean(&present),
            _ => None,
        };

        let mut updates = Vec::with_capacity(flagged.rows.len());
        for &row in &flagged.rows {
            let Some(x) = values.get(row).copied().flatten() else {
                continue;
            };
            let new = match policy {
                OutlierPolicy::Cap => x.clamp(flagged.lower, flagged.upper),
                _ => replacement.unwrap_or(x),
            };
            updates.push((row, CellValue::Number(new)));
        }
        summary.cells_affected += updates.len();
        out = out.replace_column(col.with_cells(&updates)?)?;
    }
    Ok((out, summary))
}
