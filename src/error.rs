use thiserror::Error;

use crate::data::model::ColumnType;

// ---------------------------------------------------------------------------
// EngineError – every failure an engine operation can report
// ---------------------------------------------------------------------------

/// Typed failure returned by every store, cleaning, encoding, statistics,
/// modeling and time-series operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no dataset has been loaded")]
    NotLoaded,

    #[error("column '{column}' is {actual}, expected {expected}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: ColumnType,
    },

    #[error("cannot convert column '{column}' to {target}: {} unconvertible cell(s) at rows {rows:?}", rows.len())]
    Conversion {
        column: String,
        target: ColumnType,
        rows: Vec<usize>,
    },

    #[error("unknown category '{category}' in column '{column}'")]
    UnknownCategory { column: String, category: String },

    #[error("insufficient data for {context}: need {required}, have {actual}")]
    InsufficientData {
        context: String,
        required: usize,
        actual: usize,
    },

    #[error("feature mismatch: model expects {expected:?}, got {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("column '{column}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("version {0} does not exist")]
    UnknownVersion(u64),

    #[error("design matrix is singular")]
    SingularMatrix,

    #[error("statistic is undefined: {0}")]
    UndefinedStatistic(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Shorthand for a `TypeMismatch` on `column`.
    pub fn type_mismatch(column: &str, expected: &str, actual: ColumnType) -> Self {
        EngineError::TypeMismatch {
            column: column.to_string(),
            expected: expected.to_string(),
            actual,
        }
    }

    /// Shorthand for an `InsufficientData` error.
    pub fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
        EngineError::InsufficientData {
            context: context.into(),
            required,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_message_lists_rows() {
        let err = EngineError::Conversion {
            column: "price".into(),
            target: ColumnType::Numeric,
            rows: vec![2, 5],
        };
        let msg = err.to_string();
        assert!(msg.contains("price"));
        assert!(msg.contains("2 unconvertible"));
        assert!(msg.contains("[2, 5]"));
    }

    #[test]
    fn insufficient_helper_fills_fields() {
        match EngineError::insufficient("t-test", 2, 1) {
            EngineError::InsufficientData {
                context,
                required,
                actual,
            } => {
                assert_eq!(context, "t-test");
                assert_eq!(required, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
