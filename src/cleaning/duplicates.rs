use std::collections::{HashMap, HashSet};

use super::CleaningSummary;
use crate::data::model::{CellValue, Table};
use crate::error::Result;

/// Resolve the key columns: `None` means every column.
fn key_columns(table: &Table, subset: Option<&[String]>) -> Result<Vec<usize>> {
    match subset {
        None => Ok((0..table.n_cols()).collect()),
        Some(names) => names.iter().map(|n| table.column_index(n)).collect(),
    }
}

fn row_key<'a>(table: &'a Table, cols: &[usize], row: usize) -> Vec<&'a CellValue> {
    cols.iter()
        .map(|&c| &table.columns()[c].values()[row])
        .collect()
}

/// Row positions of every row that shares its key with another row
/// (all occurrences, first ones included), in row order.
pub fn find_duplicates(table: &Table, subset: Option<&[String]>) -> Result<Vec<usize>> {
    let cols = key_columns(table, subset)?;
    let mut counts: HashMap<Vec<&CellValue>, usize> = HashMap::new();
    for row in 0..table.n_rows() {
        *counts.entry(row_key(table, &cols, row)).or_default() += 1;
    }
    Ok((0..table.n_rows())
        .filter(|&row| counts[&row_key(table, &cols, row)] > 1)
        .collect())
}

/// Drop rows whose key (over `subset`, default all columns) was already seen,
/// keeping the first occurrence in row order. Missing cells compare equal.
pub fn remove_duplicates(
    table: &Table,
    subset: Option<&[String]>,
) -> Result<(Table, CleaningSummary)> {
    let cols = key_columns(table, subset)?;
    let mut seen: HashSet<Vec<&CellValue>> = HashSet::new();
    let keep: Vec<usize> = (0..table.n_rows())
        .filter(|&row| seen.insert(row_key(table, &cols, row)))
        .collect();

    let mut summary = CleaningSummary::new("remove_duplicates", table.n_rows());
    summary.rows_after = keep.len();
    summary.cells_affected = summary.rows_removed() * table.n_cols();
    if summary.rows_removed() > 0 {
        summary.columns_affected = table.column_names();
    }
    log::info!(
        "Removed {} duplicate rows (key columns: {})",
        summary.rows_removed(),
        cols.len()
    );
    Ok((table.take_rows(&keep), summary))
}
