//! Mutating operations as one closed enum, so the session can run, preview
//! and record any of them the same way.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::cleaning::conversion::convert_column;
use crate::cleaning::duplicates::remove_duplicates;
use crate::cleaning::imputation::{impute, ImputeStrategy};
use crate::cleaning::outliers::{detect_outliers, handle_outliers, OutlierMethod, OutlierPolicy, OutlierReport};
use crate::cleaning::CleaningSummary;
use crate::config::EngineConfig;
use crate::data::model::{ColumnType, Table};
use crate::encoding::{encode, EncodingMap, EncodingMethod};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Impute {
        columns: Vec<String>,
        strategy: ImputeStrategy,
    },
    RemoveDuplicates {
        /// Key columns; `None` compares whole rows.
        #[serde(default)]
        subset: Option<Vec<String>>,
    },
    HandleOutliers {
        /// Empty selects every numeric column.
        #[serde(default)]
        columns: Vec<String>,
        /// `None` uses Z-score with the configured threshold.
        #[serde(default)]
        method: Option<OutlierMethod>,
        policy: OutlierPolicy,
    },
    ConvertType {
        column: String,
        target: ColumnType,
    },
    Encode {
        column: String,
        method: EncodingMethod,
    },
}

/// Result of applying an operation to a table, not yet committed.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub table: Table,
    pub summary: CleaningSummary,
    /// Set by `Encode`.
    pub encoding: Option<EncodingMap>,
    /// Set by `HandleOutliers`.
    pub outliers: Option<OutlierReport>,
}

impl Applied {
    fn plain((table, summary): (Table, CleaningSummary)) -> Self {
        Self {
            table,
            summary,
            encoding: None,
            outliers: None,
        }
    }
}

impl Operation {
    /// Name recorded in version metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Impute { .. } => "impute",
            Operation::RemoveDuplicates { .. } => "remove_duplicates",
            Operation::HandleOutliers { .. } => "handle_outliers",
            Operation::ConvertType { .. } => "convert_type",
            Operation::Encode { .. } => "encode",
        }
    }

    /// Parameters recorded in version metadata.
    pub fn params(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }

    /// Compute the new table. Never touches a store.
    pub fn apply(&self, table: &Table, config: &EngineConfig) -> Result<Applied> {
        match self {
            Operation::Impute { columns, strategy } => {
                Ok(Applied::plain(impute(table, columns, strategy)?))
            }
            Operation::RemoveDuplicates { subset } => {
                Ok(Applied::plain(remove_duplicates(table, subset.as_deref())?))
            }
            Operation::HandleOutliers {
                columns,
                method,
                policy,
            } => {
                let columns = if columns.is_empty() {
                    table.numeric_column_names()
                } else {
                    columns.clone()
                };
                let method = method.unwrap_or_else(|| config.zscore_method());
                let report = detect_outliers(table, &columns, method)?;
                let mut applied = Applied::plain(handle_outliers(table, &report, *policy)?);
                applied.outliers = Some(report);
                Ok(applied)
            }
            Operation::ConvertType { column, target } => {
                Ok(Applied::plain(convert_column(table, column, *target)?))
            }
            Operation::Encode { column, method } => {
                let outcome = encode(table, column, method)?;
                Ok(Applied {
                    table: outcome.table,
                    summary: outcome.summary,
                    encoding: Some(outcome.map),
                    outliers: None,
                })
            }
        }
    }
}
