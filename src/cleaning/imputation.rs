use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::CleaningSummary;
use crate::data::model::{CellValue, Column, ColumnType, Table};
use crate::error::{EngineError, Result};
use crate::numeric;

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// How distances between rows are measured for KNN imputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

/// How neighbour values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    #[default]
    Uniform,
    /// Inverse-distance weights; exact matches dominate.
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnParams {
    pub k: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub weighting: Weighting,
}

impl KnnParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            metric: DistanceMetric::default(),
            weighting: Weighting::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    /// Most frequent value; ties go to the value seen first.
    Mode,
    Knn(KnnParams),
}

impl ImputeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ImputeStrategy::Mean => "mean",
            ImputeStrategy::Median => "median",
            ImputeStrategy::Mode => "mode",
            ImputeStrategy::Knn(_) => "knn",
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Fill missing cells of `columns` using `strategy`.
///
/// Mean and median fail with `TypeMismatch` on non-numeric columns before any
/// column is touched. Columns without missing cells come back unchanged.
pub fn impute(
    table: &Table,
    columns: &[String],
    strategy: &ImputeStrategy,
) -> Result<(Table, CleaningSummary)> {
    if columns.is_empty() {
        return Err(EngineError::InvalidParameter(
            "imputation needs at least one column".into(),
        ));
    }
    if let ImputeStrategy::Knn(params) = strategy {
        if params.k == 0 {
            return Err(EngineError::InvalidParameter("KNN k must be at least 1".into()));
        }
    }
    let mut requested: Vec<&String> = Vec::with_capacity(columns.len());
    for name in columns {
        if !requested.contains(&name) {
            requested.push(name);
        }
    }
    for &name in &requested {
        let col = table.column(name)?;
        if matches!(strategy, ImputeStrategy::Mean | ImputeStrategy::Median)
            && col.column_type() != ColumnType::Numeric
        {
            return Err(EngineError::type_mismatch(name, "numeric", col.column_type()));
        }
    }

    log::info!("Imputing {:?} with {}", requested, strategy.name());
    let mut summary = CleaningSummary::new(&format!("impute_{}", strategy.name()), table.n_rows());
    let mut out = table.clone();

    for name in requested {
        let col = table.column(name)?;
        let missing: Vec<usize> = missing_rows(col);
        if missing.is_empty() {
            continue;
        }
        let updates = match strategy {
            ImputeStrategy::Mean => {
                let fill = numeric::mean(&col.present_f64s()?)
                    .ok_or_else(|| EngineError::insufficient(format!("mean of '{name}'"), 1, 0))?;
                fill_all(&missing, CellValue::Number(fill))
            }
            ImputeStrategy::Median => {
                let fill = numeric::median(&col.present_f64s()?)
                    .ok_or_else(|| EngineError::insufficient(format!("median of '{name}'"), 1, 0))?;
                fill_all(&missing, CellValue::Number(fill))
            }
            ImputeStrategy::Mode => {
                let (fill, _) = mode(col.values())
                    .ok_or_else(|| EngineError::insufficient(format!("mode of '{name}'"), 1, 0))?;
                fill_all(&missing, fill)
            }
            ImputeStrategy::Knn(params) => {
                knn_fill(table, col, &missing, params, &mut summary.notices)?
            }
        };
        summary.cells_affected += updates.len();
        summary.columns_affected.push(name.clone());
        out = out.replace_column(col.with_cells(&updates)?)?;
    }

    Ok((out, summary))
}

fn missing_rows(col: &Column) -> Vec<usize> {
    col.values()
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_missing())
        .map(|(i, _)| i)
        .collect()
}

fn fill_all(rows: &[usize], value: CellValue) -> Vec<(usize, CellValue)> {
    rows.iter().map(|&r| (r, value.clone())).collect()
}

/// Most frequent non-missing value and its count. Ties go to the value
/// encountered first in row order.
pub fn mode(values: &[CellValue]) -> Option<(CellValue, usize)> {
    let mut counts: HashMap<&CellValue, (usize, usize)> = HashMap::new();
    for (i, v) in values.iter().enumerate().filter(|(_, v)| !v.is_missing()) {
        counts.entry(v).or_insert((0, i)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, fa)), (_, (cb, fb))| ca.cmp(cb).then(fb.cmp(fa)))
        .map(|(v, (count, _))| (v.clone(), count))
}

/// Median for numeric columns, mode otherwise.
fn fallback_value(col: &Column) -> Result<CellValue> {
    let value = if col.column_type() == ColumnType::Numeric {
        numeric::median(&col.present_f64s()?).map(CellValue::Number)
    } else {
        mode(col.values()).map(|(v, _)| v)
    };
    value.ok_or_else(|| EngineError::insufficient(format!("fallback for '{}'", col.name()), 1, 0))
}

// ---------------------------------------------------------------------------
// KNN imputation
// ---------------------------------------------------------------------------

fn knn_fill(
    table: &Table,
    target: &Column,
    missing: &[usize],
    params: &KnnParams,
    notices: &mut Vec<String>,
) -> Result<Vec<(usize, CellValue)>> {
    let features: Vec<Vec<Option<f64>>> = table
        .columns()
        .iter()
        .filter(|c| c.column_type() == ColumnType::Numeric && c.name() != target.name())
        .map(Column::as_f64s)
        .collect::<Result<_>>()?;

    let complete: Vec<usize> = (0..table.n_rows())
        .filter(|&r| !target.values()[r].is_missing() && features.iter().all(|f| f[r].is_some()))
        .collect();

    if features.is_empty() || complete.len() < params.k + 1 {
        let fill = fallback_value(target)?;
        let reason = if features.is_empty() {
            "no other numeric columns".to_string()
        } else {
            format!("{} complete rows, need {}", complete.len(), params.k + 1)
        };
        log::warn!("KNN imputation of '{}' fell back to {fill}: {reason}", target.name());
        notices.push(format!(
            "KNN imputation of '{}' fell back to {}: {reason}",
            target.name(),
            if target.column_type() == ColumnType::Numeric { "median" } else { "mode" }
        ));
        return Ok(fill_all(missing, fill));
    }

    // Standardize every feature over the complete rows.
    let scaled: Vec<Vec<Option<f64>>> = features
        .iter()
        .map(|f| {
            let present: Vec<f64> = complete.iter().filter_map(|&r| f[r]).collect();
            let m = numeric::mean(&present).unwrap_or(0.0);
            let s = numeric::std_dev(&present).filter(|s| *s > 0.0).unwrap_or(1.0);
            f.iter().map(|v| v.map(|x| (x - m) / s)).collect()
        })
        .collect();

    let n_features = scaled.len() as f64;
    let mut fallback: Option<CellValue> = None;
    let mut updates = Vec::with_capacity(missing.len());

    for &row in missing {
        let present: Vec<usize> = (0..scaled.len()).filter(|&f| scaled[f][row].is_some()).collect();
        if present.is_empty() {
            if fallback.is_none() {
                fallback = Some(fallback_value(target)?);
                notices.push(format!(
                    "KNN imputation of '{}': rows without any numeric feature used the column fallback",
                    target.name()
                ));
            }
            if let Some(fill) = &fallback {
                updates.push((row, fill.clone()));
            }
            continue;
        }
        let rescale = n_features / present.len() as f64;

        let mut neighbours: Vec<(f64, usize)> = complete
            .iter()
            .map(|&cand| {
                let d = present.iter().fold(0.0, |acc, &f| {
                    let diff = scaled[f][row].unwrap_or(0.0) - scaled[f][cand].unwrap_or(0.0);
                    match params.metric {
                        DistanceMetric::Euclidean => acc + diff * diff,
                        DistanceMetric::Manhattan => acc + diff.abs(),
                    }
                });
                let d = match params.metric {
                    DistanceMetric::Euclidean => (d * rescale).sqrt(),
                    DistanceMetric::Manhattan => d * rescale,
                };
                (d, cand)
            })
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbours.truncate(params.k);

        let weights = neighbour_weights(&neighbours, params.weighting);
        let value = if target.column_type() == ColumnType::Numeric {
            let total: f64 = weights.iter().sum();
            let sum: f64 = neighbours
                .iter()
                .zip(&weights)
                .filter_map(|((_, r), w)| target.values()[*r].as_f64().map(|v| v * w))
                .sum();
            CellValue::Number(sum / total)
        } else {
            weighted_vote(target, &neighbours, &weights)
        };
        updates.push((row, value));
    }
    Ok(updates)
}

fn neighbour_weights(neighbours: &[(f64, usize)], weighting: Weighting) -> Vec<f64> {
    match weighting {
        Weighting::Uniform => vec![1.0; neighbours.len()],
        Weighting::Distance => {
            if neighbours.iter().any(|(d, _)| *d == 0.0) {
                neighbours
                    .iter()
                    .map(|(d, _)| if *d == 0.0 { 1.0 } else { 0.0 })
                    .collect()
            } else {
                neighbours.iter().map(|(d, _)| 1.0 / d).collect()
            }
        }
    }
}

/// Heaviest label among the neighbours; ties go to the nearest.
fn weighted_vote(target: &Column, neighbours: &[(f64, usize)], weights: &[f64]) -> CellValue {
    let mut tally: Vec<(&CellValue, f64)> = Vec::new();
    for ((_, r), w) in neighbours.iter().zip(weights) {
        let v = &target.values()[*r];
        match tally.iter_mut().find(|(t, _)| *t == v) {
            Some(entry) => entry.1 += w,
            None => tally.push((v, *w)),
        }
    }
    let mut best: Option<(&CellValue, f64)> = None;
    for (v, w) in tally {
        if best.map_or(true, |(_, bw)| w > bw) {
            best = Some((v, w));
        }
    }
    best.map(|(v, _)| v.clone()).unwrap_or(CellValue::Missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn age_table() -> Table {
        Table::new(vec![Column::numeric(
            "age",
            vec![Some(25.0), None, Some(35.0), Some(40.0), None],
        )])
        .unwrap()
    }

    #[test]
    fn mean_imputation_fills_with_column_mean() {
        let (out, summary) = impute(&age_table(), &["age".into()], &ImputeStrategy::Mean).unwrap();
        let ages = out.numeric_values("age").unwrap();
        assert_relative_eq!(ages[1].unwrap(), 100.0 / 3.0);
        assert_relative_eq!(ages[4].unwrap(), 100.0 / 3.0);
        assert_eq!(ages[0], Some(25.0));
        assert_eq!(summary.cells_affected, 2);
        assert_eq!(summary.columns_affected, vec!["age"]);
    }

    #[test]
    fn nan_cells_are_imputed_like_missing() {
        let col = Column::new(
            "x",
            ColumnType::Numeric,
            vec![CellValue::Number(f64::NAN), CellValue::Number(1.0), CellValue::Missing],
        )
        .unwrap();
        let t = Table::new(vec![col]).unwrap();
        let (out, summary) = impute(&t, &["x".into()], &ImputeStrategy::Mean).unwrap();
        assert_eq!(out.numeric_values("x").unwrap(), vec![Some(1.0); 3]);
        assert_eq!(summary.cells_affected, 2);
    }

    #[test]
    fn repeated_column_names_are_imputed_once() {
        let columns = vec!["age".to_string(), "age".to_string()];
        let (_, summary) = impute(&age_table(), &columns, &ImputeStrategy::Median).unwrap();
        assert_eq!(summary.cells_affected, 2);
        assert_eq!(summary.columns_affected, vec!["age"]);
    }

    #[test]
    fn imputation_without_missing_is_noop() {
        let t = Table::new(vec![Column::numeric("x", vec![Some(1.0), Some(9.0)])]).unwrap();
        for strategy in [ImputeStrategy::Mean, ImputeStrategy::Median] {
            let (out, summary) = impute(&t, &["x".into()], &strategy).unwrap();
            assert_eq!(out, t);
            assert_eq!(summary.cells_affected, 0);
        }
    }

    #[test]
    fn mean_on_categorical_is_type_mismatch() {
        let t = Table::new(vec![Column::categorical("c", vec![Some("a"), None])]).unwrap();
        let err = impute(&t, &["c".into()], &ImputeStrategy::Median).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
    }

    #[test]
    fn mode_ties_break_on_first_seen() {
        let values = vec![
            CellValue::text("blue"),
            CellValue::text("red"),
            CellValue::Missing,
            CellValue::text("red"),
            CellValue::text("blue"),
        ];
        assert_eq!(mode(&values), Some((CellValue::text("blue"), 2)));
    }

    #[test]
    fn mode_imputes_categorical() {
        let t = Table::new(vec![Column::categorical(
            "c",
            vec![Some("a"), None, Some("b"), Some("b")],
        )])
        .unwrap();
        let (out, _) = impute(&t, &["c".into()], &ImputeStrategy::Mode).unwrap();
        assert_eq!(out.column("c").unwrap().values()[1], CellValue::text("b"));
    }

    #[test]
    fn knn_uses_nearest_rows() {
        let t = Table::new(vec![
            Column::numeric("x", vec![Some(1.0), Some(1.1), Some(10.0), Some(10.2), Some(1.05)]),
            Column::numeric("y", vec![Some(2.0), Some(2.2), Some(50.0), Some(52.0), None]),
        ])
        .unwrap();
        let (out, summary) = impute(&t, &["y".into()], &ImputeStrategy::Knn(KnnParams::new(2))).unwrap();
        assert_relative_eq!(out.numeric_values("y").unwrap()[4].unwrap(), 2.1, epsilon = 1e-12);
        assert!(summary.notices.is_empty());
    }

    #[test]
    fn knn_metric_changes_the_nearest_row() {
        // Both features share one value set, so scaling keeps raw distances in proportion.
        let t = Table::new(vec![
            Column::numeric("a", vec![Some(1.0), Some(1.7), Some(0.0), Some(0.0)]),
            Column::numeric("b", vec![Some(1.0), Some(0.0), Some(1.7), Some(0.0)]),
            Column::numeric("y", vec![Some(10.0), Some(20.0), Some(20.0), None]),
        ])
        .unwrap();
        let fill = |metric| {
            let params = KnnParams {
                k: 1,
                metric,
                weighting: Weighting::Uniform,
            };
            let (out, _) = impute(&t, &["y".into()], &ImputeStrategy::Knn(params)).unwrap();
            out.numeric_values("y").unwrap()[3].unwrap()
        };
        assert_eq!(fill(DistanceMetric::Euclidean), 10.0);
        assert_eq!(fill(DistanceMetric::Manhattan), 20.0);
    }

    #[test]
    fn knn_distance_weighting_favours_closer_rows() {
        let t = Table::new(vec![
            Column::numeric("x", vec![Some(0.0), Some(2.0), Some(3.0)]),
            Column::numeric("y", vec![Some(10.0), Some(20.0), None]),
        ])
        .unwrap();
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Manhattan] {
            let params = KnnParams {
                k: 2,
                metric,
                weighting: Weighting::Distance,
            };
            let (out, _) = impute(&t, &["y".into()], &ImputeStrategy::Knn(params)).unwrap();
            // distances 3 and 1 give weights 1:3
            assert_relative_eq!(out.numeric_values("y").unwrap()[2].unwrap(), 17.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn knn_distance_weighting_prefers_exact_matches() {
        let neighbours = [(0.0, 4), (2.0, 7)];
        assert_eq!(neighbour_weights(&neighbours, Weighting::Distance), vec![1.0, 0.0]);
        assert_eq!(neighbour_weights(&neighbours, Weighting::Uniform), vec![1.0, 1.0]);
    }

    #[test]
    fn knn_votes_for_categorical_targets() {
        let t = Table::new(vec![
            Column::numeric("x", vec![Some(0.0), Some(0.1), Some(5.0), Some(5.1), Some(0.05)]),
            Column::categorical("c", vec![Some("lo"), Some("lo"), Some("hi"), Some("hi"), None]),
        ])
        .unwrap();
        let (out, _) = impute(&t, &["c".into()], &ImputeStrategy::Knn(KnnParams::new(2))).unwrap();
        assert_eq!(out.column("c").unwrap().values()[4], CellValue::text("lo"));
    }

    #[test]
    fn knn_falls_back_with_notice() {
        let (out, summary) =
            impute(&age_table(), &["age".into()], &ImputeStrategy::Knn(KnnParams::new(5))).unwrap();
        // No other numeric columns: median of {25, 35, 40}.
        assert_eq!(out.numeric_values("age").unwrap()[1], Some(35.0));
        assert_eq!(summary.notices.len(), 1);
        assert!(summary.notices[0].contains("median"));
    }
}
