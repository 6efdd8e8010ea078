//! Categorical → numeric encodings.
//!
//! Every encoding returns the transformed table together with an
//! [`EncodingMap`] that can rebuild the original column exactly. Label codes
//! follow the order in which categories first appear in the column; the same
//! order is used for one-hot dummy columns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::cleaning::CleaningSummary;
use crate::data::model::{parse_bool, CellValue, Column, ColumnType, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EncodingMethod {
    /// One binary column per category, named `{column}_{category}`.
    OneHot {
        #[serde(default)]
        drop_first: bool,
    },
    /// Integer code per category, in first-appearance order.
    Label,
    /// Rank in a caller-supplied ordering.
    Ordinal { order: Vec<String> },
}

impl EncodingMethod {
    pub fn name(&self) -> &'static str {
        match self {
            EncodingMethod::OneHot { .. } => "one_hot",
            EncodingMethod::Label => "label",
            EncodingMethod::Ordinal { .. } => "ordinal",
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding map
// ---------------------------------------------------------------------------

/// How one categorical column was encoded, with enough detail to reverse it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EncodingMap {
    OneHot {
        column: String,
        original_type: ColumnType,
        /// Category and the dummy column that marks it, in dummy order.
        dummies: Vec<(CellValue, String)>,
        /// Category without a dummy column when `drop_first` was requested.
        dropped: Option<CellValue>,
    },
    Label {
        column: String,
        original_type: ColumnType,
        /// `categories[code]` is the category encoded as `code`.
        categories: Vec<CellValue>,
    },
    Ordinal {
        column: String,
        original_type: ColumnType,
        /// `order[rank]` is the category ranked `rank`.
        order: Vec<CellValue>,
    },
}

impl EncodingMap {
    /// Name of the source column.
    pub fn column(&self) -> &str {
        match self {
            EncodingMap::OneHot { column, .. }
            | EncodingMap::Label { column, .. }
            | EncodingMap::Ordinal { column, .. } => column,
        }
    }

    pub fn original_type(&self) -> ColumnType {
        match self {
            EncodingMap::OneHot { original_type, .. }
            | EncodingMap::Label { original_type, .. }
            | EncodingMap::Ordinal { original_type, .. } => *original_type,
        }
    }

    /// Columns holding the encoded values in an encoded table.
    pub fn encoded_columns(&self) -> Vec<String> {
        match self {
            EncodingMap::OneHot { dummies, .. } => dummies.iter().map(|(_, n)| n.clone()).collect(),
            EncodingMap::Label { column, .. } | EncodingMap::Ordinal { column, .. } => {
                vec![column.clone()]
            }
        }
    }

    /// Encode a single category: one value for label/ordinal, one indicator
    /// per dummy column for one-hot.
    pub fn encode_value(&self, category: &CellValue) -> Result<Vec<f64>> {
        let unknown = || EngineError::UnknownCategory {
            column: self.column().to_string(),
            category: category.to_string(),
        };
        match self {
            EncodingMap::OneHot { dummies, dropped, .. } => {
                if dropped.as_ref() == Some(category) {
                    return Ok(vec![0.0; dummies.len()]);
                }
                let hit = dummies.iter().position(|(c, _)| c == category).ok_or_else(unknown)?;
                Ok((0..dummies.len()).map(|i| if i == hit { 1.0 } else { 0.0 }).collect())
            }
            EncodingMap::Label { categories: cats, .. } | EncodingMap::Ordinal { order: cats, .. } => {
                let code = cats.iter().position(|c| c == category).ok_or_else(unknown)?;
                Ok(vec![code as f64])
            }
        }
    }

    /// Rebuild the original column from an encoded table.
    pub fn decode(&self, table: &Table) -> Result<Column> {
        let values = match self {
            EncodingMap::OneHot { dummies, dropped, .. } => {
                let cols = dummies
                    .iter()
                    .map(|(_, name)| table.numeric_values(name))
                    .collect::<Result<Vec<_>>>()?;
                (0..table.n_rows())
                    .map(|row| {
                        let cells: Vec<Option<f64>> = cols.iter().map(|c| c[row]).collect();
                        if cells.iter().all(Option::is_none) {
                            return Ok(CellValue::Missing);
                        }
                        match cells.iter().position(|v| *v == Some(1.0)) {
                            Some(i) => Ok(dummies[i].0.clone()),
                            None => dropped.clone().ok_or_else(|| {
                                EngineError::InvalidParameter(format!(
                                    "row {row} has no active dummy for '{}'",
                                    self.column()
                                ))
                            }),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            EncodingMap::Label { column, categories: cats, .. }
            | EncodingMap::Ordinal { column, order: cats, .. } => table
                .numeric_values(column)?
                .into_iter()
                .map(|code| match code {
                    None => Ok(CellValue::Missing),
                    Some(c) if c >= 0.0 && c.fract() == 0.0 && (c as usize) < cats.len() => {
                        Ok(cats[c as usize].clone())
                    }
                    Some(c) => Err(EngineError::UnknownCategory {
                        column: column.clone(),
                        category: c.to_string(),
                    }),
                })
                .collect::<Result<Vec<_>>>()?,
        };
        Column::new(self.column(), self.original_type(), values)
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encoded table, the map that reverses it and a change summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingOutcome {
    pub table: Table,
    pub map: EncodingMap,
    pub summary: CleaningSummary,
}

/// Distinct non-missing cells in first-appearance order.
fn categories_in_order(values: &[CellValue]) -> Vec<CellValue> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in values.iter().filter(|v| !v.is_missing()) {
        if seen.insert(v) {
            out.push(v.clone());
        }
    }
    out
}

/// Encode `column` of `table` with `method`. Only categorical, text and
/// boolean columns can be encoded.
pub fn encode(table: &Table, column: &str, method: &EncodingMethod) -> Result<EncodingOutcome> {
    let idx = table.column_index(column)?;
    let col = &table.columns()[idx];
    let ty = col.column_type();
    if !ty.is_categorical_like() {
        return Err(EngineError::type_mismatch(column, "categorical, text or boolean", ty));
    }

    let mut summary = CleaningSummary::new(&format!("encode_{}", method.name()), table.n_rows());
    summary.cells_affected = col.len() - col.missing_count();

    let (out, map) = match method {
        EncodingMethod::OneHot { drop_first } => one_hot(table, idx, *drop_first)?,
        EncodingMethod::Label => {
            let categories = categories_in_order(col.values());
            let map = EncodingMap::Label {
                column: column.to_string(),
                original_type: ty,
                categories,
            };
            (table.replace_column(codes(col, &map)?)?, map)
        }
        EncodingMethod::Ordinal { order } => {
            let order = ordinal_order(column, ty, order)?;
            let map = EncodingMap::Ordinal {
                column: column.to_string(),
                original_type: ty,
                order,
            };
            (table.replace_column(codes(col, &map)?)?, map)
        }
    };

    summary.columns_affected = map.encoded_columns();
    log::info!(
        "Encoded '{column}' with {} into {} column(s)",
        method.name(),
        summary.columns_affected.len()
    );
    Ok(EncodingOutcome {
        table: out,
        map,
        summary,
    })
}

/// Numeric code column for label/ordinal maps; same name, missing stays missing.
fn codes(col: &Column, map: &EncodingMap) -> Result<Column> {
    let values = col
        .values()
        .iter()
        .map(|v| {
            if v.is_missing() {
                Ok(None)
            } else {
                Ok(map.encode_value(v)?.first().copied())
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Column::numeric(col.name(), values))
}

fn ordinal_order(column: &str, ty: ColumnType, order: &[String]) -> Result<Vec<CellValue>> {
    if order.is_empty() {
        return Err(EngineError::InvalidParameter(
            "ordinal encoding needs a category order".into(),
        ));
    }
    let mut out: Vec<CellValue> = Vec::with_capacity(order.len());
    for raw in order {
        let cell = if ty == ColumnType::Boolean {
            parse_bool(raw).map(CellValue::Bool).ok_or_else(|| {
                EngineError::InvalidParameter(format!("'{raw}' is not a boolean for '{column}'"))
            })?
        } else {
            CellValue::text(raw.as_str())
        };
        if out.contains(&cell) {
            return Err(EngineError::InvalidParameter(format!(
                "category '{raw}' appears twice in the ordinal order"
            )));
        }
        out.push(cell);
    }
    Ok(out)
}

fn one_hot(table: &Table, idx: usize, drop_first: bool) -> Result<(Table, EncodingMap)> {
    let col = &table.columns()[idx];
    let mut categories = categories_in_order(col.values());
    let dropped = if drop_first && !categories.is_empty() {
        if categories.len() < 2 {
            return Err(EngineError::InvalidParameter(format!(
                "drop_first on '{}' would leave no dummy columns",
                col.name()
            )));
        }
        Some(categories.remove(0))
    } else {
        None
    };

    let dummies: Vec<(CellValue, String)> = categories
        .into_iter()
        .map(|c| {
            let name = format!("{}_{}", col.name(), c);
            (c, name)
        })
        .collect();
    for (_, name) in &dummies {
        if table.has_column(name) {
            return Err(EngineError::InvalidParameter(format!(
                "one-hot column '{name}' already exists"
            )));
        }
    }

    let new_columns: Vec<Column> = dummies
        .iter()
        .map(|(cat, name)| {
            Column::numeric(
                name.as_str(),
                col.values().iter().map(|v| {
                    if v.is_missing() {
                        None
                    } else {
                        Some(if v == cat { 1.0 } else { 0.0 })
                    }
                }),
            )
        })
        .collect();

    let map = EncodingMap::OneHot {
        column: col.name().to_string(),
        original_type: col.column_type(),
        dummies,
        dropped,
    };
    Ok((table.splice_columns(idx, 1, new_columns)?, map))
}
