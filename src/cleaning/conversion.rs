use std::collections::HashSet;

use serde::Serialize;

use super::CleaningSummary;
use crate::config::EngineConfig;
use crate::data::model::{parse_bool, parse_datetime, CellValue, Column, ColumnType, Table};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Type inference
// ---------------------------------------------------------------------------

/// Thresholds deciding when text is categorical rather than free text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeInference {
    pub categorical_max_unique: usize,
    pub categorical_unique_ratio: f64,
}

impl Default for TypeInference {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for TypeInference {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            categorical_max_unique: cfg.categorical_max_unique,
            categorical_unique_ratio: cfg.categorical_unique_ratio,
        }
    }
}

fn all_present<F: Fn(&CellValue) -> bool>(values: &[CellValue], pred: F) -> bool {
    values.iter().filter(|v| !v.is_missing()).all(pred)
}

/// Most specific type every non-missing cell can be read as. Checked in
/// order: datetime, numeric, boolean, categorical, text. `None` when all
/// cells are missing.
pub fn detect_type(values: &[CellValue], inference: &TypeInference) -> Option<ColumnType> {
    if values.iter().all(CellValue::is_missing) {
        return None;
    }
    let is_datetime = all_present(values, |v| match v {
        CellValue::DateTime(_) => true,
        CellValue::Text(s) => parse_datetime(s).is_some(),
        _ => false,
    });
    if is_datetime {
        return Some(ColumnType::DateTime);
    }
    let is_numeric = all_present(values, |v| match v {
        CellValue::Number(_) => true,
        CellValue::Text(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    });
    if is_numeric {
        return Some(ColumnType::Numeric);
    }
    let is_boolean = all_present(values, |v| match v {
        CellValue::Bool(_) => true,
        CellValue::Text(s) => parse_bool(s).is_some(),
        _ => false,
    });
    if is_boolean {
        return Some(ColumnType::Boolean);
    }

    let distinct: HashSet<&CellValue> = values.iter().filter(|v| !v.is_missing()).collect();
    let limit = (inference.categorical_max_unique as f64)
        .min(values.len() as f64 * inference.categorical_unique_ratio);
    if (distinct.len() as f64) < limit {
        Some(ColumnType::Categorical)
    } else {
        Some(ColumnType::Text)
    }
}

// ---------------------------------------------------------------------------
// Suggestions and explicit conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSuggestion {
    pub column: String,
    pub current: ColumnType,
    pub suggested: ColumnType,
}

/// Columns whose cells read as a different type than the declared one.
pub fn suggest_types(table: &Table, inference: &TypeInference) -> Vec<TypeSuggestion> {
    table
        .columns()
        .iter()
        .filter_map(|col| {
            let suggested = detect_type(col.values(), inference)?;
            (suggested != col.column_type()).then(|| TypeSuggestion {
                column: col.name().to_string(),
                current: col.column_type(),
                suggested,
            })
        })
        .collect()
}

/// Convert one column to `target`. Fails with `Conversion` listing every
/// cell that has no reading as `target`; nothing is dropped silently.
pub fn convert_column(
    table: &Table,
    column: &str,
    target: ColumnType,
) -> Result<(Table, CleaningSummary)> {
    let col = table.column(column)?;
    let converted = Column::coerce(column, target, col.values().to_vec())?;

    let mut summary = CleaningSummary::new("convert_type", table.n_rows());
    summary.cells_affected = col
        .values()
        .iter()
        .zip(converted.values())
        .filter(|(a, b)| a != b)
        .count();
    summary.columns_affected = vec![column.to_string()];
    log::info!(
        "Converted '{column}' from {} to {target} ({} cells changed)",
        col.column_type(),
        summary.cells_affected
    );
    Ok((table.replace_column(converted)?, summary))
}
