use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::cleaning::conversion::{suggest_types, TypeInference, TypeSuggestion};
use crate::cleaning::duplicates::find_duplicates;
use crate::cleaning::outliers::{detect_outliers, OutlierMethod, OutlierReport};
use crate::cleaning::{missing_report, MissingCount};
use crate::config::EngineConfig;
use crate::data::model::Table;
use crate::data::{export, loader};
use crate::encoding::EncodingMap;
use crate::error::Result;
use crate::modeling::split::Split;
use crate::modeling::{fit_linear_regression, fit_random_forest, FittedModel};
use crate::ops::{Applied, Operation};
use crate::stats::correlation::{correlation_matrix, CorrelationMatrix, CorrelationMethod};
use crate::stats::summary::{describe, ColumnSummary};
use crate::store::{DatasetStore, OpMetadata, Version, VersionId};
use crate::timeseries::{decompose, forecast_moving_average, Decomposition, Forecast};

// ---------------------------------------------------------------------------
// Session – one user's working dataset
// ---------------------------------------------------------------------------

/// One user's dataset store, configuration and latest encoding maps.
///
/// Mutating operations go through [`Session::run`], which commits only after
/// the whole new table has been computed. Everything else reads the current
/// snapshot and leaves the store untouched.
#[derive(Debug)]
pub struct Session {
    store: DatasetStore,
    config: EngineConfig,
    /// Latest map per encoded source column.
    encodings: BTreeMap<String, EncodingMap>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            store: DatasetStore::with_history_limit(config.history_limit),
            config,
            encodings: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    // -- Loading and history ------------------------------------------------

    /// Replace the working dataset and start a new history.
    pub fn load_table(&mut self, table: Table) -> Version {
        self.encodings.clear();
        self.store.load(table)
    }

    /// Parse a CSV, JSON or Parquet file and load it.
    pub fn load_path(&mut self, path: &Path) -> anyhow::Result<Version> {
        let table = loader::load_file(path, &TypeInference::from(&self.config))?;
        Ok(self.load_table(table))
    }

    pub fn current(&self) -> Result<Arc<Table>> {
        self.store.current()
    }

    pub fn history(&self) -> Result<Vec<Version>> {
        self.store.history()
    }

    pub fn revert(&mut self, id: VersionId) -> Result<Arc<Table>> {
        self.store.revert(id)
    }

    // -- Mutating operations ------------------------------------------------

    /// Apply `op` to the current table and commit the result.
    pub fn run(&mut self, op: &Operation) -> Result<(Version, Applied)> {
        let current = self.store.current()?;
        let applied = op.apply(&current, &self.config)?;
        let version = self
            .store
            .commit(applied.table.clone(), OpMetadata::new(op.name(), op.params()))?;
        if let Some(map) = &applied.encoding {
            self.encodings.insert(map.column().to_string(), map.clone());
        }
        Ok((version, applied))
    }

    /// Apply `op` without committing.
    pub fn preview(&self, op: &Operation) -> Result<Applied> {
        let table = self.store.current()?;
        op.apply(&table, &self.config)
    }

    /// Latest encoding map for `column`, if it was encoded in this session.
    pub fn encoding(&self, column: &str) -> Option<&EncodingMap> {
        self.encodings.get(column)
    }

    // -- Read-only analysis -------------------------------------------------

    /// Run any read-only computation on the current snapshot.
    pub fn analyze<T>(&self, f: impl FnOnce(&Table) -> Result<T>) -> Result<T> {
        let table = self.store.current()?;
        f(table.as_ref())
    }

    pub fn missing_report(&self) -> Result<Vec<MissingCount>> {
        self.analyze(|t| Ok(missing_report(t)))
    }

    pub fn find_duplicates(&self, subset: Option<&[String]>) -> Result<Vec<usize>> {
        self.analyze(|t| find_duplicates(t, subset))
    }

    /// Outliers by `method`, or Z-score at the configured threshold.
    pub fn detect_outliers(
        &self,
        columns: &[String],
        method: Option<OutlierMethod>,
    ) -> Result<OutlierReport> {
        let method = method.unwrap_or_else(|| self.config.zscore_method());
        self.analyze(|t| detect_outliers(t, columns, method))
    }

    pub fn suggest_types(&self) -> Result<Vec<TypeSuggestion>> {
        let inference = TypeInference::from(&self.config);
        self.analyze(|t| Ok(suggest_types(t, &inference)))
    }

    pub fn describe(&self) -> Result<Vec<ColumnSummary>> {
        self.analyze(|t| Ok(describe(t)))
    }

    pub fn correlation(
        &self,
        columns: &[String],
        method: CorrelationMethod,
    ) -> Result<CorrelationMatrix> {
        self.analyze(|t| correlation_matrix(t, columns, method))
    }

    pub fn fit_linear_regression(&self, target: &str, features: &[String]) -> Result<FittedModel> {
        let level = self.config.confidence_level;
        self.analyze(|t| fit_linear_regression(t, target, features, level))
    }

    /// Random forest with the configured tree count and seed; `split`
    /// defaults to the configured random hold-out.
    pub fn fit_random_forest(
        &self,
        target: &str,
        features: &[String],
        split: Option<Split>,
    ) -> Result<FittedModel> {
        let split = split.unwrap_or_else(|| self.config.default_split());
        let params = self.config.forest_params();
        let min_rows = self.config.min_training_rows;
        self.analyze(|t| fit_random_forest(t, target, features, &split, &params, min_rows))
    }

    pub fn decompose(
        &self,
        time: &str,
        value: &str,
        window: usize,
        period: usize,
    ) -> Result<Decomposition> {
        self.analyze(|t| decompose(t, time, value, window, period))
    }

    pub fn forecast(
        &self,
        time: &str,
        value: &str,
        window: usize,
        horizon: usize,
    ) -> Result<Forecast> {
        self.analyze(|t| forecast_moving_average(t, time, value, window, horizon))
    }

    // -- Export -------------------------------------------------------------

    pub fn export_csv(&self) -> Result<String> {
        self.analyze(export::to_csv_string)
    }

    pub fn export_json(&self) -> Result<String> {
        self.analyze(export::to_json_records)
    }

    pub fn export_parquet(&self) -> Result<Vec<u8>> {
        self.analyze(export::to_parquet_bytes)
    }
}
