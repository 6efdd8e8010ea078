use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Date32Array, Float32Array, Float64Array, Int32Array,
    Int64Array, StringArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{CellValue, Column, ColumnType, Table};
use crate::cleaning::conversion::{detect_type, TypeInference};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one column per field
/// * `.json`    – records orientation: `[{ "col": value, ... }, ...]`
/// * `.parquet` – flat schema of scalar columns
pub fn load_file(path: &Path, inference: &TypeInference) -> Result<Table> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path, inference),
        "json" => load_json(path, inference),
        "parquet" | "pq" => load_parquet(path, inference),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    log::info!(
        "Loaded {} rows x {} columns from {}",
        table.n_rows(),
        table.n_cols(),
        path.display()
    );
    Ok(table)
}

/// Build a typed column from raw cells, inferring the most specific type.
fn typed_column(name: &str, raw: Vec<CellValue>, inference: &TypeInference) -> Result<Column> {
    let ty = detect_type(&raw, inference).unwrap_or(ColumnType::Text);
    Column::coerce(name, ty, raw).with_context(|| format!("column '{name}' as {ty}"))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// Parse CSV text (header row required). Empty fields are missing.
pub fn parse_csv<R: std::io::Read>(reader: R, inference: &TypeInference) -> Result<Table> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut raw: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        for (col_idx, cells) in raw.iter_mut().enumerate() {
            let field = record.get(col_idx).unwrap_or("").trim();
            cells.push(if field.is_empty() {
                CellValue::Missing
            } else {
                CellValue::text(field)
            });
        }
    }

    let columns = headers
        .iter()
        .zip(raw)
        .map(|(name, cells)| typed_column(name, cells, inference))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(columns)?)
}

fn load_csv(path: &Path, inference: &TypeInference) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening CSV")?;
    parse_csv(file, inference)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Parse records-oriented JSON:
///
/// ```json
/// [
///   { "age": 25, "color": "red" },
///   { "age": null, "color": "blue" }
/// ]
/// ```
/// Column order follows first appearance of each key.
pub fn parse_json_records(text: &str, inference: &TypeInference) -> Result<Table> {
    let root: JsonValue = serde_json::from_str(text).context("parsing JSON")?;
    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut names: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .iter()
        .map(|name| {
            let raw: Vec<CellValue> = records
                .iter()
                .map(|rec| rec.get(name).map(json_to_cell).unwrap_or(CellValue::Missing))
                .collect();
            typed_column(name, raw, inference)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(columns)?)
}

fn load_json(path: &Path, inference: &TypeInference) -> Result<Table> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    parse_json_records(&text, inference)
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) if s.trim().is_empty() => CellValue::Missing,
        JsonValue::String(s) => CellValue::text(s.clone()),
        JsonValue::Number(n) => n.as_f64().map(CellValue::number).unwrap_or(CellValue::Missing),
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Missing,
        other => CellValue::text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with scalar columns.
///
/// Integer and float columns become numeric, booleans boolean, dates and
/// timestamps datetime; string columns go through the same inference as CSV.
fn load_parquet(path: &Path, inference: &TypeInference) -> Result<Table> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut names: Vec<String> = Vec::new();
    let mut raw: Vec<Vec<CellValue>> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        if names.is_empty() {
            names = schema.fields().iter().map(|f| f.name().clone()).collect();
            raw = vec![Vec::new(); names.len()];
        }
        for (col_idx, cells) in raw.iter_mut().enumerate() {
            let col = batch.column(col_idx);
            for row in 0..batch.num_rows() {
                cells.push(extract_cell(col, row)?);
            }
        }
    }

    let columns = names
        .iter()
        .zip(raw)
        .map(|(name, cells)| typed_column(name, cells, inference))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(columns)?)
}

// -- Parquet / Arrow helpers --

/// Downcast `col` to the concrete array type or fail with the observed type.
fn downcast<'a, T: 'static>(col: &'a Arc<dyn Array>) -> Result<&'a T> {
    col.as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("unexpected array layout for {:?}", col.data_type()))
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> Result<CellValue> {
    if col.is_null(row) {
        return Ok(CellValue::Missing);
    }
    let cell = match col.data_type() {
        DataType::Utf8 => CellValue::text(downcast::<StringArray>(col)?.value(row)),
        DataType::LargeUtf8 => CellValue::text(col.as_string::<i64>().value(row)),
        DataType::Int32 => CellValue::number(downcast::<Int32Array>(col)?.value(row) as f64),
        DataType::Int64 => CellValue::number(downcast::<Int64Array>(col)?.value(row) as f64),
        DataType::Float32 => CellValue::number(downcast::<Float32Array>(col)?.value(row) as f64),
        DataType::Float64 => CellValue::number(downcast::<Float64Array>(col)?.value(row)),
        DataType::Boolean => CellValue::Bool(downcast::<BooleanArray>(col)?.value(row)),
        DataType::Date32 => {
            let days = downcast::<Date32Array>(col)?.value(row);
            NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(CellValue::DateTime)
                .unwrap_or(CellValue::Missing)
        }
        DataType::Timestamp(unit, _) => {
            let micros = match unit {
                TimeUnit::Second => {
                    to_micros(downcast::<TimestampSecondArray>(col)?.value(row), 1_000_000)?
                }
                TimeUnit::Millisecond => {
                    to_micros(downcast::<TimestampMillisecondArray>(col)?.value(row), 1_000)?
                }
                TimeUnit::Microsecond => downcast::<TimestampMicrosecondArray>(col)?.value(row),
                TimeUnit::Nanosecond => {
                    downcast::<TimestampNanosecondArray>(col)?.value(row) / 1_000
                }
            };
            DateTime::from_timestamp_micros(micros)
                .map(|dt| CellValue::DateTime(dt.naive_utc()))
                .unwrap_or(CellValue::Missing)
        }
        other => bail!("Unsupported parquet column type {other:?}"),
    };
    Ok(cell)
}

fn to_micros(value: i64, per_unit: i64) -> Result<i64> {
    value
        .checked_mul(per_unit)
        .with_context(|| format!("timestamp {value} is out of range"))
}

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[cfg(test)]
mod tests {
    use super::*;

    fn inference() -> TypeInference {
        TypeInference::default()
    }

    #[test]
    fn csv_infers_column_types() {
        let text = "age,color,joined,active\n25,red,2024-01-01,yes\n,blue,2024-01-02,no\n35,red,2024-01-03,yes\n";
        let table = parse_csv(text.as_bytes(), &inference()).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.column("age").unwrap().column_type(), ColumnType::Numeric);
        assert_eq!(table.column("age").unwrap().missing_count(), 1);
        assert_eq!(table.column("joined").unwrap().column_type(), ColumnType::DateTime);
        assert_eq!(table.column("active").unwrap().column_type(), ColumnType::Boolean);
    }

    #[test]
    fn json_records_keep_first_seen_key_order() {
        let text = r#"[{"b": 1, "a": "x"}, {"a": "y", "c": true}]"#;
        let table = parse_json_records(text, &inference()).unwrap();
        assert_eq!(table.column_names(), vec!["b", "a", "c"]);
        assert_eq!(table.column("b").unwrap().missing_count(), 1);
        assert_eq!(table.column("c").unwrap().column_type(), ColumnType::Boolean);
    }

    #[test]
    fn rejects_non_array_json() {
        assert!(parse_json_records(r#"{"a": 1}"#, &inference()).is_err());
    }

    #[test]
    fn parquet_round_trip_keeps_types_and_missing_cells() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap();
        let table = Table::new(vec![
            Column::new(
                "when",
                ColumnType::DateTime,
                vec![CellValue::DateTime(start), CellValue::Missing, CellValue::DateTime(start)],
            )
            .unwrap(),
            Column::numeric("amount", vec![Some(1.5), None, Some(-3.0)]),
            Column::new(
                "paid",
                ColumnType::Boolean,
                vec![CellValue::Bool(true), CellValue::Bool(false), CellValue::Missing],
            )
            .unwrap(),
        ])
        .unwrap();

        let path = std::env::temp_dir().join(format!("rusty_lens_round_trip_{}.parquet", std::process::id()));
        std::fs::write(&path, crate::data::export::to_parquet_bytes(&table).unwrap()).unwrap();
        let loaded = load_file(&path, &inference());
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.unwrap(), table);
    }

    #[test]
    fn out_of_range_timestamp_is_an_error() {
        let col: Arc<dyn Array> = Arc::new(TimestampSecondArray::from(vec![i64::MAX]));
        let err = extract_cell(&col, 0).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        let ok: Arc<dyn Array> = Arc::new(TimestampSecondArray::from(vec![86_400]));
        let expected = NaiveDate::from_ymd_opt(1970, 1, 2).and_then(|d| d.and_hms_opt(0, 0, 0)).unwrap();
        assert_eq!(extract_cell(&ok, 0).unwrap(), CellValue::DateTime(expected));
    }

    #[test]
    fn unsupported_extension_fails() {
        let err = load_file(Path::new("data.xlsx"), &inference()).unwrap_err();
        assert!(err.to_string().contains(".xlsx"));
    }
}
