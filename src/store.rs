use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::data::model::Table;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Versions
// ---------------------------------------------------------------------------

/// Monotonic version sequence number, unique within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VersionId(pub u64);

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The operation that produced a version and the parameters it ran with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpMetadata {
    pub name: String,
    pub params: JsonValue,
}

impl OpMetadata {
    pub fn new(name: impl Into<String>, params: JsonValue) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// Immutable snapshot of the working table. Cloning shares the table.
#[derive(Debug, Clone)]
pub struct Version {
    pub id: VersionId,
    pub table: Arc<Table>,
    pub operation: OpMetadata,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// DatasetStore – append-only version chain
// ---------------------------------------------------------------------------

/// Owns the canonical working table and its history.
///
/// Every commit appends; nothing already committed is modified. Mutating
/// methods take `&mut self`, so commits to one store are serialized by the
/// borrow checker. Readers clone a [`Version`] (or its `Arc<Table>`) and keep
/// a consistent snapshot regardless of later commits.
#[derive(Debug, Default)]
pub struct DatasetStore {
    versions: VecDeque<Version>,
    next_id: u64,
    history_limit: Option<usize>,
}

impl DatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that evicts its oldest versions beyond `limit` (never the current).
    pub fn with_history_limit(limit: Option<usize>) -> Self {
        Self {
            history_limit: limit.map(|l| l.max(1)),
            ..Self::default()
        }
    }

    /// Start a fresh history rooted at `table`.
    pub fn load(&mut self, table: Table) -> Version {
        self.versions.clear();
        log::info!(
            "Loading dataset: {} rows x {} columns",
            table.n_rows(),
            table.n_cols()
        );
        let params = serde_json::json!({
            "rows": table.n_rows(),
            "columns": table.n_cols(),
        });
        self.append(table, OpMetadata::new("load", params))
    }

    /// Most recent committed table.
    pub fn current(&self) -> Result<Arc<Table>> {
        self.current_version().map(|v| v.table.clone())
    }

    /// Most recent committed version.
    pub fn current_version(&self) -> Result<&Version> {
        self.versions.back().ok_or(EngineError::NotLoaded)
    }

    /// Append `table` as the new current version.
    pub fn commit(&mut self, table: Table, operation: OpMetadata) -> Result<Version> {
        if self.versions.is_empty() {
            return Err(EngineError::NotLoaded);
        }
        log::info!(
            "Committing '{}': {} rows x {} columns",
            operation.name,
            table.n_rows(),
            table.n_cols()
        );
        Ok(self.append(table, operation))
    }

    /// Versions oldest first.
    pub fn history(&self) -> Result<Vec<Version>> {
        if self.versions.is_empty() {
            return Err(EngineError::NotLoaded);
        }
        Ok(self.versions.iter().cloned().collect())
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    pub fn get(&self, id: VersionId) -> Result<&Version> {
        if self.versions.is_empty() {
            return Err(EngineError::NotLoaded);
        }
        self.versions
            .iter()
            .find(|v| v.id == id)
            .ok_or(EngineError::UnknownVersion(id.0))
    }

    /// Make the table of version `id` current again by appending it as a new
    /// `revert` version. Returns that table.
    pub fn revert(&mut self, id: VersionId) -> Result<Arc<Table>> {
        let target = self.get(id)?.table.clone();
        log::info!("Reverting to {id}");
        let version = Version {
            id: VersionId(self.next_id),
            table: target.clone(),
            operation: OpMetadata::new("revert", serde_json::json!({ "to": id.0 })),
            created_at: Utc::now(),
        };
        self.push(version);
        Ok(target)
    }

    fn append(&mut self, table: Table, operation: OpMetadata) -> Version {
        let version = Version {
            id: VersionId(self.next_id),
            table: Arc::new(table),
            operation,
            created_at: Utc::now(),
        };
        self.push(version.clone());
        version
    }

    fn push(&mut self, version: Version) {
        self.next_id += 1;
        self.versions.push_back(version);
        if let Some(limit) = self.history_limit {
            while self.versions.len() > limit {
                if let Some(evicted) = self.versions.pop_front() {
                    log::debug!("Evicting {} from history", evicted.id);
                }
            }
        }
    }
}
