use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use super::model::{CellValue, Column, ColumnType, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Cell serialization
// ---------------------------------------------------------------------------

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(v) => serializer.serialize_f64(*v),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::DateTime(d) => {
                serializer.serialize_str(&d.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
            CellValue::Missing => serializer.serialize_none(),
        }
    }
}

/// Serializes a table as a sequence of `{column: value}` records, keeping
/// column order.
struct Records<'a>(&'a Table);

struct Record<'a> {
    table: &'a Table,
    row: usize,
}

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.n_rows()))?;
        for row in 0..self.0.n_rows() {
            seq.serialize_element(&Record {
                table: self.0,
                row,
            })?;
        }
        seq.end()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.n_cols()))?;
        for col in self.table.columns() {
            map.serialize_entry(col.name(), &col.values()[self.row])?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Row-oriented and record formats
// ---------------------------------------------------------------------------

/// CSV text with a header row. Missing cells are written as empty fields.
pub fn to_csv_string(table: &Table) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.column_names())?;
    for row in 0..table.n_rows() {
        writer.write_record(table.row(row).iter().map(|c| c.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| EngineError::InvalidParameter(e.to_string()))
}

/// JSON array of `{column: value}` records. Missing cells are `null`.
pub fn to_json_records(table: &Table) -> Result<String> {
    Ok(serde_json::to_string(&Records(table))?)
}

/// Key-value records: one `(column, value)` list per row, in column order.
pub fn to_records(table: &Table) -> Vec<Vec<(String, CellValue)>> {
    (0..table.n_rows())
        .map(|row| {
            table
                .columns()
                .iter()
                .map(|c| (c.name().to_string(), c.values()[row].clone()))
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Numeric => DataType::Float64,
        ColumnType::Categorical | ColumnType::Text => DataType::Utf8,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
    }
}

fn arrow_array(col: &Column) -> ArrayRef {
    let values = col.values();
    match col.column_type() {
        ColumnType::Numeric => Arc::new(Float64Array::from(
            values.iter().map(CellValue::as_f64).collect::<Vec<_>>(),
        )),
        ColumnType::Categorical | ColumnType::Text => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Text(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::Boolean => Arc::new(BooleanArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        ColumnType::DateTime => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    CellValue::DateTime(d) => Some(d.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
    }
}

/// Encode the table as an in-memory Parquet file.
pub fn to_parquet_bytes(table: &Table) -> Result<Vec<u8>> {
    let schema = Arc::new(Schema::new(
        table
            .columns()
            .iter()
            .map(|c| Field::new(c.name(), arrow_type(c.column_type()), true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = table.columns().iter().map(arrow_array).collect();
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}
