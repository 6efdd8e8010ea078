//! Modeling engine: linear regression and random forest classification
//! over numeric (usually encoded) feature columns.
//!
//! ```text
//!   Table ──► design rows ──► linear::fit / forest::Forest::fit ──► FittedModel
//!                                                                     │
//!   PredictionInput (manual values or batch table) ──► predict ◄──────┘
//! ```

pub mod forest;
pub mod linear;
pub mod metrics;
pub mod split;

use serde::Serialize;

use self::forest::{Forest, ForestParams};
use self::linear::{LinearFit, RegressionMetrics};
use self::split::Split;
use crate::data::model::{CellValue, ColumnType, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Public artifact types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RandomForest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationMetrics {
    pub train_accuracy: f64,
    /// Held-out scores; `None` when the split left no test rows.
    pub test_accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub n_train: usize,
    pub n_test: usize,
    pub classes: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelMetrics {
    Regression(RegressionMetrics),
    Classification(ClassificationMetrics),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    Regression { value: f64, lower: f64, upper: f64 },
    /// `confidence` is the averaged tree vote share of `label`.
    Class { label: CellValue, confidence: f64 },
}

/// Feature values to predict from. Names and order must match the model.
#[derive(Debug, Clone, Copy)]
pub enum PredictionInput<'a> {
    Manual(&'a [(String, f64)]),
    Batch(&'a Table),
}

#[derive(Debug, Clone)]
enum Trained {
    Linear(LinearFit),
    Forest { forest: Forest, classes: Vec<CellValue> },
}

/// Immutable result of one training run.
#[derive(Debug, Clone)]
pub struct FittedModel {
    kind: ModelKind,
    target: String,
    features: Vec<String>,
    metrics: ModelMetrics,
    trained: Trained,
}

impl FittedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn metrics(&self) -> &ModelMetrics {
        &self.metrics
    }

    /// Intercept of a linear model.
    pub fn intercept(&self) -> Option<f64> {
        match &self.trained {
            Trained::Linear(fit) => Some(fit.intercept),
            Trained::Forest { .. } => None,
        }
    }

    /// Per-feature coefficients of a linear model.
    pub fn coefficients(&self) -> Option<Vec<(String, f64)>> {
        match &self.trained {
            Trained::Linear(fit) => Some(self.named(&fit.coefficients)),
            Trained::Forest { .. } => None,
        }
    }

    /// Normalized impurity-reduction importances of a forest.
    pub fn importances(&self) -> Option<Vec<(String, f64)>> {
        match &self.trained {
            Trained::Forest { forest, .. } => Some(self.named(forest.importances())),
            Trained::Linear(_) => None,
        }
    }

    fn named(&self, values: &[f64]) -> Vec<(String, f64)> {
        self.features.iter().cloned().zip(values.iter().copied()).collect()
    }

    /// Predict one value per input row.
    pub fn predict(&self, input: PredictionInput<'_>) -> Result<Vec<Prediction>> {
        let rows = self.input_rows(input)?;
        Ok(rows
            .iter()
            .map(|row| match &self.trained {
                Trained::Linear(fit) => {
                    let (value, lower, upper) = fit.predict(row);
                    Prediction::Regression {
                        value,
                        lower,
                        upper,
                    }
                }
                Trained::Forest { forest, classes } => {
                    let (class, confidence) = forest.predict(row);
                    Prediction::Class {
                        label: classes[class].clone(),
                        confidence,
                    }
                }
            })
            .collect())
    }

    fn input_rows(&self, input: PredictionInput<'_>) -> Result<Vec<Vec<f64>>> {
        let mismatch = |actual: Vec<String>| EngineError::FeatureMismatch {
            expected: self.features.clone(),
            actual,
        };
        match input {
            PredictionInput::Manual(values) => {
                let names: Vec<String> = values.iter().map(|(n, _)| n.clone()).collect();
                if names != self.features {
                    return Err(mismatch(names));
                }
                Ok(vec![values.iter().map(|(_, v)| *v).collect()])
            }
            PredictionInput::Batch(table) => {
                let names = table.column_names();
                if names != self.features {
                    return Err(mismatch(names));
                }
                let cols = self
                    .features
                    .iter()
                    .map(|f| table.numeric_values(f))
                    .collect::<Result<Vec<_>>>()?;
                (0..table.n_rows())
                    .map(|r| {
                        cols.iter()
                            .zip(&self.features)
                            .map(|(c, name)| {
                                c[r].ok_or_else(|| {
                                    EngineError::InvalidParameter(format!(
                                        "row {r} is missing feature '{name}'"
                                    ))
                                })
                            })
                            .collect()
                    })
                    .collect()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

fn check_columns(table: &Table, target: &str, features: &[String]) -> Result<()> {
    if features.is_empty() {
        return Err(EngineError::InvalidParameter("no feature columns selected".into()));
    }
    if features.iter().any(|f| f == target) {
        return Err(EngineError::InvalidParameter(format!(
            "target '{target}' cannot also be a feature"
        )));
    }
    for f in features {
        let ty = table.column(f)?.column_type();
        if ty != ColumnType::Numeric {
            return Err(EngineError::type_mismatch(f, "numeric (encode it first)", ty));
        }
    }
    Ok(())
}

/// Feature rows for every table row; `None` where any feature is missing.
fn feature_rows(table: &Table, features: &[String]) -> Result<Vec<Option<Vec<f64>>>> {
    let cols = features
        .iter()
        .map(|f| table.numeric_values(f))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..table.n_rows())
        .map(|r| cols.iter().map(|c| c[r]).collect::<Option<Vec<f64>>>())
        .collect())
}

/// Ordinary least squares of numeric `target` on `features`. Rows with a
/// missing target or feature are dropped.
pub fn fit_linear_regression(
    table: &Table,
    target: &str,
    features: &[String],
    confidence_level: f64,
) -> Result<FittedModel> {
    check_columns(table, target, features)?;
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(EngineError::InvalidParameter(format!(
            "confidence level must be in (0, 1), got {confidence_level}"
        )));
    }
    let y_col = table.numeric_values(target)?;
    let (x, y): (Vec<Vec<f64>>, Vec<f64>) = feature_rows(table, features)?
        .into_iter()
        .zip(y_col)
        .filter_map(|(row, y)| row.zip(y))
        .unzip();

    let (fit, metrics) = linear::fit(&x, &y, confidence_level)?;
    log::info!(
        "Fitted linear regression of '{target}' on {} feature(s): R² = {:.4} (n = {})",
        features.len(),
        metrics.r_squared,
        metrics.n_obs
    );
    Ok(FittedModel {
        kind: ModelKind::LinearRegression,
        target: target.to_string(),
        features: features.to_vec(),
        metrics: ModelMetrics::Regression(metrics),
        trained: Trained::Linear(fit),
    })
}

/// Random forest classifier of `target` on numeric `features`.
///
/// Fails with `InsufficientData` when fewer than `min_rows` training rows
/// remain after the split.
pub fn fit_random_forest(
    table: &Table,
    target: &str,
    features: &[String],
    split: &Split,
    params: &ForestParams,
    min_rows: usize,
) -> Result<FittedModel> {
    check_columns(table, target, features)?;
    let target_col = table.column(target)?;
    if target_col.column_type() == ColumnType::DateTime {
        return Err(EngineError::type_mismatch(
            target,
            "categorical, boolean or numeric",
            ColumnType::DateTime,
        ));
    }

    let rows = feature_rows(table, features)?;
    let usable: Vec<usize> = (0..table.n_rows())
        .filter(|&r| rows[r].is_some() && !target_col.values()[r].is_missing())
        .collect();
    let (train, test) = split.resolve(&usable)?;
    if train.len() < min_rows {
        return Err(EngineError::insufficient("random forest training rows", min_rows, train.len()));
    }

    // Class indices follow sorted label order.
    let mut classes: Vec<CellValue> = usable.iter().map(|&r| target_col.values()[r].clone()).collect();
    classes.sort();
    classes.dedup();
    let class_of = |r: usize| {
        classes
            .binary_search(&target_col.values()[r])
            .unwrap_or_default()
    };
    let row_of = |r: usize| rows[r].clone().unwrap_or_default();

    let x_train: Vec<Vec<f64>> = train.iter().map(|&r| row_of(r)).collect();
    let y_train: Vec<usize> = train.iter().map(|&r| class_of(r)).collect();
    let forest = Forest::fit(&x_train, &y_train, classes.len(), params)?;

    let predict_all = |idx: &[usize]| -> Vec<usize> {
        idx.iter().map(|&r| forest.predict(&row_of(r)).0).collect()
    };
    let train_pred = predict_all(&train);
    let y_test: Vec<usize> = test.iter().map(|&r| class_of(r)).collect();
    let test_pred = predict_all(&test);
    let scores = metrics::macro_scores(&y_test, &test_pred);

    let metrics = ClassificationMetrics {
        train_accuracy: metrics::accuracy(&y_train, &train_pred).unwrap_or(0.0),
        test_accuracy: metrics::accuracy(&y_test, &test_pred),
        precision: scores.map(|s| s.0),
        recall: scores.map(|s| s.1),
        f1: scores.map(|s| s.2),
        n_train: train.len(),
        n_test: test.len(),
        classes: classes.clone(),
    };
    log::info!(
        "Trained random forest ({} trees) for '{target}': train acc {:.3}, test acc {}",
        params.n_trees,
        metrics.train_accuracy,
        metrics
            .test_accuracy
            .map_or_else(|| "n/a".to_string(), |a| format!("{a:.3}"))
    );

    Ok(FittedModel {
        kind: ModelKind::RandomForest,
        target: target.to_string(),
        features: features.to_vec(),
        metrics: ModelMetrics::Classification(metrics),
        trained: Trained::Forest { forest, classes },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;
    use approx::assert_relative_eq;

    fn line() -> Table {
        Table::new(vec![
            Column::numeric("x", (0..10).map(|i| Some(i as f64))),
            Column::numeric("y", (0..10).map(|i| Some(2.0 * i as f64 + 1.0))),
        ])
        .unwrap()
    }

    fn iris_like() -> Table {
        let n = 60;
        Table::new(vec![
            Column::numeric("a", (0..n).map(|i| Some((i % 20) as f64 + (i / 20) as f64 * 30.0))),
            Column::numeric("b", (0..n).map(|i| Some(((i * 13) % 7) as f64))),
            Column::categorical(
                "species",
                (0..n).map(|i| Some(["setosa", "versicolor", "virginica"][i / 20])),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn linear_regression_recovers_line() {
        let model = fit_linear_regression(&line(), "y", &["x".to_string()], 0.95).unwrap();
        assert_eq!(model.kind(), ModelKind::LinearRegression);
        let coef = model.coefficients().unwrap();
        assert_relative_eq!(coef[0].1, 2.0, epsilon = 1e-9);
        assert_relative_eq!(model.intercept().unwrap(), 1.0, epsilon = 1e-9);
        match model.metrics() {
            ModelMetrics::Regression(m) => assert_relative_eq!(m.r_squared, 1.0, epsilon = 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn manual_prediction_checks_feature_names() {
        let model = fit_linear_regression(&line(), "y", &["x".to_string()], 0.95).unwrap();
        let ok = model
            .predict(PredictionInput::Manual(&[("x".to_string(), 4.0)]))
            .unwrap();
        match &ok[0] {
            Prediction::Regression { value, .. } => assert_relative_eq!(*value, 9.0, epsilon = 1e-9),
            other => panic!("unexpected {other:?}"),
        }
        let err = model
            .predict(PredictionInput::Manual(&[("z".to_string(), 4.0)]))
            .unwrap_err();
        assert!(matches!(err, EngineError::FeatureMismatch { .. }));
    }

    #[test]
    fn batch_prediction_requires_same_columns() {
        let model = fit_linear_regression(&line(), "y", &["x".to_string()], 0.95).unwrap();
        let err = model.predict(PredictionInput::Batch(&line())).unwrap_err();
        assert!(matches!(err, EngineError::FeatureMismatch { .. }));
        let batch = line().select(&["x".to_string()]).unwrap();
        assert_eq!(model.predict(PredictionInput::Batch(&batch)).unwrap().len(), 10);
    }

    #[test]
    fn categorical_feature_is_rejected() {
        let err = fit_linear_regression(&iris_like(), "a", &["species".to_string()], 0.95).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn forest_importances_sum_to_one() {
        let features = vec!["a".to_string(), "b".to_string()];
        let params = ForestParams {
            n_trees: 25,
            ..Default::default()
        };
        let model = fit_random_forest(
            &iris_like(),
            "species",
            &features,
            &Split::random(0.2, 42),
            &params,
            10,
        )
        .unwrap();
        let total: f64 = model.importances().unwrap().iter().map(|(_, v)| v).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        match model.metrics() {
            ModelMetrics::Classification(m) => {
                assert_eq!(m.n_test, 12);
                assert_eq!(m.classes.len(), 3);
                assert!(m.test_accuracy.unwrap() > 0.8);
            }
            other => panic!("unexpected {other:?}"),
        }
        let pred = model
            .predict(PredictionInput::Manual(&[("a".to_string(), 65.0), ("b".to_string(), 3.0)]))
            .unwrap();
        match &pred[0] {
            Prediction::Class { label, confidence } => {
                assert_eq!(label, &CellValue::text("virginica"));
                assert!(*confidence > 0.5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn forest_needs_minimum_training_rows() {
        let small = iris_like().take_rows(&(0..8).collect::<Vec<_>>());
        let err = fit_random_forest(
            &small,
            "species",
            &["a".to_string()],
            &Split::random(0.2, 1),
            &ForestParams::default(),
            10,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 10, .. }));
    }
}
