use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// CellValue – a single cell in a column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value. `Missing` is the designated missing marker;
/// `NaN` numbers never survive construction through [`CellValue::number`].
#[derive(Debug, Clone)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    Missing,
}

// -- Manual Eq/Ord/Hash so CellValue can key BTreeMaps and HashMaps --

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Missing => 0,
                Bool(_) => 1,
                Number(_) => 2,
                DateTime(_) => 3,
                Text(_) => 4,
            }
        }
        match (self, other) {
            (Missing, Missing) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Number(a), Number(b)) => a.total_cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => discriminant(self).cmp(&discriminant(other)),
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Text(s) => s.hash(state),
            CellValue::Number(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::DateTime(d) => d.hash(state),
            CellValue::Missing => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Missing => write!(f, ""),
        }
    }
}

impl CellValue {
    /// Build a numeric cell, mapping `NaN` to `Missing`.
    pub fn number(v: f64) -> Self {
        if v.is_nan() {
            CellValue::Missing
        } else {
            CellValue::Number(v)
        }
    }

    /// `Number(NaN)` becomes `Missing`; every other cell is unchanged.
    fn normalized(self) -> Self {
        match self {
            CellValue::Number(n) => CellValue::number(n),
            other => other,
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    /// Interpret the value as an `f64` where that is lossless.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether this cell may live in a column of type `ty`.
    pub fn fits(&self, ty: ColumnType) -> bool {
        matches!(
            (self, ty),
            (CellValue::Missing, _)
                | (CellValue::Number(_), ColumnType::Numeric)
                | (CellValue::Text(_), ColumnType::Categorical | ColumnType::Text)
                | (CellValue::Bool(_), ColumnType::Boolean)
                | (CellValue::DateTime(_), ColumnType::DateTime)
        )
    }
}

// ---------------------------------------------------------------------------
// Datetime parsing shared by the loader, conversion and time series engines
// ---------------------------------------------------------------------------

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// Parse a textual timestamp in any of the accepted layouts.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a textual boolean literal (`true`/`t`/`yes`/`y`/`1` and negatives).
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ColumnType
// ---------------------------------------------------------------------------

/// Declared semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    DateTime,
    Boolean,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::DateTime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        };
        write!(f, "{name}")
    }
}

impl ColumnType {
    /// Categorical-like types can be grouped, encoded and cross-tabulated.
    pub fn is_categorical_like(self) -> bool {
        matches!(
            self,
            ColumnType::Categorical | ColumnType::Text | ColumnType::Boolean
        )
    }
}

// ---------------------------------------------------------------------------
// Column – named, typed sequence of cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    ty: ColumnType,
    values: Vec<CellValue>,
}

impl Column {
    /// Build a column, rejecting any cell that does not fit `ty`.
    pub fn new(name: impl Into<String>, ty: ColumnType, values: Vec<CellValue>) -> Result<Self> {
        let name = name.into();
        let values: Vec<CellValue> = values.into_iter().map(CellValue::normalized).collect();
        let bad: Vec<usize> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.fits(ty))
            .map(|(i, _)| i)
            .collect();
        if !bad.is_empty() {
            return Err(EngineError::Conversion {
                column: name,
                target: ty,
                rows: bad,
            });
        }
        Ok(Column { name, ty, values })
    }

    /// Numeric column from optional floats (`None` and `NaN` become missing).
    pub fn numeric(name: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        Column {
            name: name.into(),
            ty: ColumnType::Numeric,
            values: values
                .into_iter()
                .map(|v| v.map(CellValue::number).unwrap_or(CellValue::Missing))
                .collect(),
        }
    }

    /// Categorical column from optional strings.
    pub fn categorical<S: Into<String>>(
        name: impl Into<String>,
        values: impl IntoIterator<Item = Option<S>>,
    ) -> Self {
        Column {
            name: name.into(),
            ty: ColumnType::Categorical,
            values: values
                .into_iter()
                .map(|v| v.map(|s| CellValue::Text(s.into())).unwrap_or(CellValue::Missing))
                .collect(),
        }
    }

    /// Coerce raw cells into `ty`, converting where a lossless reading exists.
    /// Cells that cannot be read as `ty` are reported by row position.
    pub fn coerce(name: impl Into<String>, ty: ColumnType, raw: Vec<CellValue>) -> Result<Self> {
        let name = name.into();
        let mut bad = Vec::new();
        let values: Vec<CellValue> = raw
            .into_iter()
            .enumerate()
            .map(|(row, v)| match coerce_cell(v, ty) {
                Some(c) => c,
                None => {
                    bad.push(row);
                    CellValue::Missing
                }
            })
            .collect();
        if !bad.is_empty() {
            return Err(EngineError::Conversion {
                column: name,
                target: ty,
                rows: bad,
            });
        }
        Ok(Column { name, ty, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }

    /// Same cells under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cells as optional floats. Fails unless the column is numeric.
    pub fn as_f64s(&self) -> Result<Vec<Option<f64>>> {
        if self.ty != ColumnType::Numeric {
            return Err(EngineError::type_mismatch(&self.name, "numeric", self.ty));
        }
        Ok(self.values.iter().map(CellValue::as_f64).collect())
    }

    /// Non-missing numeric cells in row order.
    pub fn present_f64s(&self) -> Result<Vec<f64>> {
        Ok(self.as_f64s()?.into_iter().flatten().collect())
    }

    /// New column keeping only `rows`, in the given order.
    pub fn take(&self, rows: &[usize]) -> Column {
        Column {
            name: self.name.clone(),
            ty: self.ty,
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
        }
    }

    /// Copy of this column with the given cells replaced.
    pub fn with_cells(&self, updates: &[(usize, CellValue)]) -> Result<Column> {
        let mut values = self.values.clone();
        for (row, v) in updates {
            let v = v.clone().normalized();
            if !v.fits(self.ty) {
                return Err(EngineError::InvalidParameter(format!(
                    "value '{v}' does not fit {} column '{}'",
                    self.ty, self.name
                )));
            }
            if *row >= values.len() {
                return Err(EngineError::InvalidParameter(format!(
                    "row {row} out of bounds for column '{}'",
                    self.name
                )));
            }
            values[*row] = v;
        }
        Ok(Column {
            name: self.name.clone(),
            ty: self.ty,
            values,
        })
    }
}

fn coerce_cell(v: CellValue, ty: ColumnType) -> Option<CellValue> {
    let v = v.normalized();
    if v.fits(ty) {
        return Some(v);
    }
    match (v, ty) {
        (CellValue::Number(n), ColumnType::Categorical | ColumnType::Text) => {
            Some(CellValue::Text(n.to_string()))
        }
        (CellValue::Bool(b), ColumnType::Categorical | ColumnType::Text) => {
            Some(CellValue::Text(b.to_string()))
        }
        (CellValue::DateTime(d), ColumnType::Categorical | ColumnType::Text) => {
            Some(CellValue::Text(CellValue::DateTime(d).to_string()))
        }
        (CellValue::Bool(b), ColumnType::Numeric) => Some(CellValue::Number(if b { 1.0 } else { 0.0 })),
        (CellValue::Number(n), ColumnType::Boolean) if n == 0.0 || n == 1.0 => {
            Some(CellValue::Bool(n == 1.0))
        }
        (CellValue::Text(s), ColumnType::Numeric) => {
            let t = s.trim();
            if t.is_empty() {
                Some(CellValue::Missing)
            } else {
                t.parse::<f64>().ok().map(CellValue::number)
            }
        }
        (CellValue::Text(s), ColumnType::Boolean) => {
            if s.trim().is_empty() {
                Some(CellValue::Missing)
            } else {
                parse_bool(&s).map(CellValue::Bool)
            }
        }
        (CellValue::Text(s), ColumnType::DateTime) => {
            if s.trim().is_empty() {
                Some(CellValue::Missing)
            } else {
                parse_datetime(&s).map(CellValue::DateTime)
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Table – ordered columns sharing one row index
// ---------------------------------------------------------------------------

/// An ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = HashSet::new();
        for col in &columns {
            if col.len() != n_rows {
                return Err(EngineError::LengthMismatch {
                    column: col.name.clone(),
                    expected: n_rows,
                    actual: col.len(),
                });
            }
            if !seen.insert(col.name.as_str()) {
                return Err(EngineError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Table { columns, n_rows })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| EngineError::ColumnNotFound(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        Ok(&self.columns[self.column_index(name)?])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Optional floats for a numeric column.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.column(name)?.as_f64s()
    }

    /// Names of all numeric columns in table order.
    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.ty == ColumnType::Numeric)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Cells of one row across all columns.
    pub fn row(&self, row: usize) -> Vec<&CellValue> {
        self.columns.iter().map(|c| &c.values[row]).collect()
    }

    /// New table keeping only `rows` (in order) across every column.
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            n_rows: rows.len(),
        }
    }

    /// New table with only the named columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|n| self.column(n).cloned())
            .collect::<Result<Vec<_>>>()?;
        Table::new(columns)
    }

    /// Copy of the table with the column of the same name replaced.
    pub fn replace_column(&self, column: Column) -> Result<Table> {
        let idx = self.column_index(&column.name)?;
        self.splice_columns(idx, 1, vec![column])
    }

    /// Replace `remove` columns starting at `at` with `insert`.
    pub fn splice_columns(&self, at: usize, remove: usize, insert: Vec<Column>) -> Result<Table> {
        if at + remove > self.columns.len() {
            return Err(EngineError::InvalidParameter(format!(
                "column range {at}..{} out of bounds",
                at + remove
            )));
        }
        let mut columns = self.columns.clone();
        columns.splice(at..at + remove, insert);
        Table::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_becomes_missing() {
        assert_eq!(CellValue::number(f64::NAN), CellValue::Missing);
        let col = Column::numeric("x", vec![Some(1.0), Some(f64::NAN), None]);
        assert_eq!(col.missing_count(), 2);
    }

    #[test]
    fn nan_cells_are_missing_through_every_constructor() {
        let cells = vec![CellValue::Number(f64::NAN), CellValue::Number(1.0), CellValue::Missing];
        let built = Column::new("x", ColumnType::Numeric, cells.clone()).unwrap();
        assert_eq!(built.missing_count(), 2);
        assert_eq!(built.values()[0], CellValue::Missing);

        let coerced = Column::coerce("x", ColumnType::Numeric, cells).unwrap();
        assert_eq!(coerced.missing_count(), 2);

        let patched = built.with_cells(&[(1, CellValue::Number(f64::NAN))]).unwrap();
        assert_eq!(patched.missing_count(), 3);
    }

    #[test]
    fn column_rejects_mixed_cells() {
        let err = Column::new(
            "x",
            ColumnType::Numeric,
            vec![CellValue::Number(1.0), CellValue::text("a")],
        )
        .unwrap_err();
        match err {
            EngineError::Conversion { rows, .. } => assert_eq!(rows, vec![1]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn coerce_parses_numeric_text() {
        let col = Column::coerce(
            "x",
            ColumnType::Numeric,
            vec![CellValue::text("1.5"), CellValue::text(""), CellValue::Number(2.0)],
        )
        .unwrap();
        assert_eq!(col.as_f64s().unwrap(), vec![Some(1.5), None, Some(2.0)]);
    }

    #[test]
    fn table_rejects_ragged_and_duplicate_columns() {
        let a = Column::numeric("a", vec![Some(1.0), Some(2.0)]);
        let b = Column::numeric("b", vec![Some(1.0)]);
        assert!(matches!(
            Table::new(vec![a.clone(), b]),
            Err(EngineError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Table::new(vec![a.clone(), a]),
            Err(EngineError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn take_rows_preserves_alignment() {
        let t = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(2.0), Some(3.0)]),
            Column::categorical("b", vec![Some("x"), Some("y"), Some("z")]),
        ])
        .unwrap();
        let sub = t.take_rows(&[2, 0]);
        assert_eq!(sub.n_rows(), 2);
        assert_eq!(sub.row(0), vec![&CellValue::Number(3.0), &CellValue::text("z")]);
    }

    #[test]
    fn parses_common_datetime_layouts() {
        assert!(parse_datetime("2024-03-01").is_some());
        assert!(parse_datetime("2024-03-01 12:30:00").is_some());
        assert!(parse_datetime("03/01/2024").is_some());
        assert!(parse_datetime("2024-03-01T12:30:00Z").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn ordering_is_total_across_variants() {
        let mut v = vec![
            CellValue::text("b"),
            CellValue::Number(2.0),
            CellValue::Missing,
            CellValue::Number(-1.0),
        ];
        v.sort();
        assert_eq!(v[0], CellValue::Missing);
        assert_eq!(v[1], CellValue::Number(-1.0));
        assert_eq!(v[3], CellValue::text("b"));
    }
}
