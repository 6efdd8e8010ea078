use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cleaning::imputation::KnnParams;
use crate::cleaning::outliers::OutlierMethod;
use crate::error::{EngineError, Result};
use crate::modeling::forest::ForestParams;
use crate::modeling::split::Split;

// ---------------------------------------------------------------------------
// EngineConfig – tunable defaults consumed by every engine
// ---------------------------------------------------------------------------

/// Defaults applied when a request leaves a parameter unspecified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// |z| above this flags a Z-score outlier.
    pub zscore_threshold: f64,
    /// Whisker multiplier for IQR outliers.
    pub iqr_multiplier: f64,
    /// Neighbourhood size for KNN imputation.
    pub knn_k: usize,
    /// Minimum training rows for random forest fits.
    pub min_training_rows: usize,
    /// Held-out fraction for the default random split.
    pub test_fraction: f64,
    /// Seed used when a randomized request does not bring its own.
    pub seed: u64,
    /// Confidence level for regression intervals.
    pub confidence_level: f64,
    /// Trees per random forest.
    pub forest_trees: usize,
    /// Maximum retained versions; `None` keeps every version.
    pub history_limit: Option<usize>,
    /// Text columns with fewer distinct values than this may be categorical.
    pub categorical_max_unique: usize,
    /// ...and fewer distinct values than this share of the rows.
    pub categorical_unique_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 3.0,
            iqr_multiplier: 1.5,
            knn_k: 5,
            min_training_rows: 10,
            test_fraction: 0.2,
            seed: 42,
            confidence_level: 0.95,
            forest_trees: 100,
            history_limit: None,
            categorical_max_unique: 50,
            categorical_unique_ratio: 0.5,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON config file.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Ok(Self::from_json_str(&text)?)
    }

    pub fn zscore_method(&self) -> OutlierMethod {
        OutlierMethod::ZScore {
            threshold: self.zscore_threshold,
        }
    }

    pub fn iqr_method(&self) -> OutlierMethod {
        OutlierMethod::Iqr {
            multiplier: self.iqr_multiplier,
        }
    }

    pub fn knn_params(&self) -> KnnParams {
        KnnParams::new(self.knn_k)
    }

    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_trees: self.forest_trees,
            seed: self.seed,
            ..ForestParams::default()
        }
    }

    /// Seeded random split holding out `test_fraction` of the rows.
    pub fn default_split(&self) -> Split {
        Split::random(self.test_fraction, self.seed)
    }

    /// Reject values no engine can work with.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: &str) -> Result<()> {
            Err(EngineError::InvalidParameter(msg.to_string()))
        }
        if !(self.zscore_threshold > 0.0) {
            return bad("zscore_threshold must be positive");
        }
        if !(self.iqr_multiplier > 0.0) {
            return bad("iqr_multiplier must be positive");
        }
        if self.knn_k == 0 {
            return bad("knn_k must be at least 1");
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return bad("test_fraction must lie in (0, 1)");
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return bad("confidence_level must lie in (0, 1)");
        }
        if self.forest_trees == 0 {
            return bad("forest_trees must be at least 1");
        }
        if self.history_limit == Some(0) {
            return bad("history_limit must keep at least one version");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"knn_k": 3, "seed": 7}"#).unwrap();
        assert_eq!(cfg.knn_k, 3);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.zscore_threshold, 3.0);
        assert_eq!(cfg.history_limit, None);
        assert_eq!(cfg.default_split(), Split::random(0.2, 7));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{"test_fraction": 1.5}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert!(EngineConfig::from_json_str(r#"{"history_limit": 0}"#).is_err());
    }
}
