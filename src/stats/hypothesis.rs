use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor};

use super::correlation::{correlate, paired, CorrelationMethod};
use super::{t_two_sided, undefined, StatisticalResult};
use crate::data::model::{CellValue, Column, Table};
use crate::error::{EngineError, Result};
use crate::numeric;

// ---------------------------------------------------------------------------
// Contingency tables and chi-squared
// ---------------------------------------------------------------------------

/// Observed co-occurrence counts of two categorical columns. Labels are
/// sorted; rows with a missing cell in either column are ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContingencyTable {
    pub row_labels: Vec<CellValue>,
    pub col_labels: Vec<CellValue>,
    pub counts: Vec<Vec<usize>>,
}

impl ContingencyTable {
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}

fn categorical<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    let col = table.column(name)?;
    if !col.column_type().is_categorical_like() {
        return Err(EngineError::type_mismatch(
            name,
            "categorical, text or boolean",
            col.column_type(),
        ));
    }
    Ok(col)
}

pub fn contingency_table(table: &Table, a: &str, b: &str) -> Result<ContingencyTable> {
    let ca = categorical(table, a)?;
    let cb = categorical(table, b)?;

    let mut cells: BTreeMap<(&CellValue, &CellValue), usize> = BTreeMap::new();
    for (x, y) in ca.values().iter().zip(cb.values()) {
        if !x.is_missing() && !y.is_missing() {
            *cells.entry((x, y)).or_default() += 1;
        }
    }

    let mut row_labels: Vec<CellValue> = cells.keys().map(|(x, _)| (*x).clone()).collect();
    row_labels.dedup();
    let mut col_labels: Vec<CellValue> = cells.keys().map(|(_, y)| (*y).clone()).collect();
    col_labels.sort();
    col_labels.dedup();

    let counts = row_labels
        .iter()
        .map(|r| {
            col_labels
                .iter()
                .map(|c| cells.get(&(r, c)).copied().unwrap_or(0))
                .collect()
        })
        .collect();
    Ok(ContingencyTable {
        row_labels,
        col_labels,
        counts,
    })
}

/// Chi-squared test of independence. Applies Yates' continuity correction
/// when the table has one degree of freedom.
pub fn chi_squared(table: &Table, a: &str, b: &str) -> Result<StatisticalResult> {
    let ct = contingency_table(table, a, b)?;
    let (r, c) = (ct.row_labels.len(), ct.col_labels.len());
    if r < 2 || c < 2 {
        return Err(EngineError::insufficient(
            format!("chi-squared on '{a}' x '{b}' (categories per column)"),
            2,
            r.min(c),
        ));
    }

    let n = ct.total() as f64;
    let row_totals: Vec<f64> = ct.counts.iter().map(|row| row.iter().sum::<usize>() as f64).collect();
    let col_totals: Vec<f64> = (0..c)
        .map(|j| ct.counts.iter().map(|row| row[j]).sum::<usize>() as f64)
        .collect();
    let dof = (r - 1) * (c - 1);

    let mut stat = 0.0;
    for i in 0..r {
        for j in 0..c {
            let expected = row_totals[i] * col_totals[j] / n;
            let mut diff = (ct.counts[i][j] as f64 - expected).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            stat += diff * diff / expected;
        }
    }

    let dist = ChiSquared::new(dof as f64).map_err(undefined)?;
    Ok(StatisticalResult {
        test: "chi_squared".into(),
        statistic: stat,
        p_value: Some(dist.sf(stat)),
        dof: Some(dof as f64),
        columns: vec![a.to_string(), b.to_string()],
    })
}

// ---------------------------------------------------------------------------
// T-tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VarianceAssumption {
    /// Welch's unequal-variance test.
    #[default]
    Welch,
    Pooled,
}

fn require_two(context: &str, xs: &[f64]) -> Result<()> {
    if xs.len() < 2 {
        return Err(EngineError::insufficient(context, 2, xs.len()));
    }
    Ok(())
}

pub fn t_test_one_sample(table: &Table, column: &str, mu: f64) -> Result<StatisticalResult> {
    let xs = table.column(column)?.present_f64s()?;
    require_two(&format!("one-sample t-test on '{column}'"), &xs)?;

    let n = xs.len() as f64;
    let mean = numeric::mean(&xs).unwrap_or(mu);
    let sd = numeric::std_dev(&xs).unwrap_or(0.0);
    if sd == 0.0 {
        return Err(EngineError::UndefinedStatistic(format!(
            "'{column}' has zero variance"
        )));
    }
    let t = (mean - mu) / (sd / n.sqrt());
    let dof = n - 1.0;
    Ok(StatisticalResult {
        test: "t_test_one_sample".into(),
        statistic: t,
        p_value: Some(t_two_sided(t, dof)?),
        dof: Some(dof),
        columns: vec![column.to_string()],
    })
}

fn two_sample(
    xs: &[f64],
    ys: &[f64],
    variance: VarianceAssumption,
    columns: Vec<String>,
) -> Result<StatisticalResult> {
    require_two(&format!("t-test group '{}'", columns[0]), xs)?;
    require_two(&format!("t-test group '{}'", columns[1]), ys)?;

    let (n1, n2) = (xs.len() as f64, ys.len() as f64);
    let (m1, m2) = (numeric::mean(xs).unwrap_or(0.0), numeric::mean(ys).unwrap_or(0.0));
    let (v1, v2) = (numeric::variance(xs).unwrap_or(0.0), numeric::variance(ys).unwrap_or(0.0));

    let (se, dof) = match variance {
        VarianceAssumption::Welch => {
            let (a, b) = (v1 / n1, v2 / n2);
            let se = (a + b).sqrt();
            let dof = (a + b).powi(2) / (a * a / (n1 - 1.0) + b * b / (n2 - 1.0));
            (se, dof)
        }
        VarianceAssumption::Pooled => {
            let dof = n1 + n2 - 2.0;
            let pooled = ((n1 - 1.0) * v1 + (n2 - 1.0) * v2) / dof;
            ((pooled * (1.0 / n1 + 1.0 / n2)).sqrt(), dof)
        }
    };
    if se == 0.0 || !dof.is_finite() {
        return Err(EngineError::UndefinedStatistic(format!(
            "both groups of {columns:?} have zero variance"
        )));
    }

    let t = (m1 - m2) / se;
    Ok(StatisticalResult {
        test: match variance {
            VarianceAssumption::Welch => "t_test_welch".into(),
            VarianceAssumption::Pooled => "t_test_pooled".into(),
        },
        statistic: t,
        p_value: Some(t_two_sided(t, dof)?),
        dof: Some(dof),
        columns,
    })
}

/// Compare the means of two numeric columns.
pub fn t_test_two_sample(
    table: &Table,
    a: &str,
    b: &str,
    variance: VarianceAssumption,
) -> Result<StatisticalResult> {
    let xs = table.column(a)?.present_f64s()?;
    let ys = table.column(b)?.present_f64s()?;
    two_sample(&xs, &ys, variance, vec![a.to_string(), b.to_string()])
}

/// Split a numeric column by a categorical one, groups in sorted label order.
fn grouped(table: &Table, value: &str, group: &str) -> Result<Vec<(CellValue, Vec<f64>)>> {
    let values = table.numeric_values(value)?;
    let labels = categorical(table, group)?;
    let mut groups: BTreeMap<&CellValue, Vec<f64>> = BTreeMap::new();
    for (v, g) in values.iter().zip(labels.values()) {
        if let (Some(v), false) = (v, g.is_missing()) {
            groups.entry(g).or_default().push(*v);
        }
    }
    Ok(groups.into_iter().map(|(g, xs)| (g.clone(), xs)).collect())
}

/// T-test of `value` between the two levels of `group`.
pub fn t_test_by_group(
    table: &Table,
    value: &str,
    group: &str,
    variance: VarianceAssumption,
) -> Result<StatisticalResult> {
    let groups = grouped(table, value, group)?;
    if groups.len() < 2 {
        return Err(EngineError::insufficient(
            format!("t-test levels in '{group}'"),
            2,
            groups.len(),
        ));
    }
    if groups.len() > 2 {
        return Err(EngineError::InvalidParameter(format!(
            "t-test needs exactly 2 levels in '{group}', found {}",
            groups.len()
        )));
    }
    let mut result = two_sample(
        &groups[0].1,
        &groups[1].1,
        variance,
        vec![format!("{value}[{}]", groups[0].0), format!("{value}[{}]", groups[1].0)],
    )?;
    result.columns = vec![value.to_string(), group.to_string()];
    Ok(result)
}

// ---------------------------------------------------------------------------
// ANOVA
// ---------------------------------------------------------------------------

fn one_way(groups: &[(String, Vec<f64>)], columns: Vec<String>) -> Result<StatisticalResult> {
    if groups.len() < 2 {
        return Err(EngineError::insufficient("ANOVA groups", 2, groups.len()));
    }
    for (name, xs) in groups {
        require_two(&format!("ANOVA group '{name}'"), xs)?;
    }

    let k = groups.len() as f64;
    let n: f64 = groups.iter().map(|(_, xs)| xs.len() as f64).sum();
    let grand = groups.iter().flat_map(|(_, xs)| xs.iter()).sum::<f64>() / n;

    let (mut ss_between, mut ss_within) = (0.0, 0.0);
    for (_, xs) in groups {
        let m = numeric::mean(xs).unwrap_or(grand);
        ss_between += xs.len() as f64 * (m - grand).powi(2);
        ss_within += xs.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    }
    if ss_within == 0.0 {
        return Err(EngineError::UndefinedStatistic(
            "ANOVA groups have zero within-group variance".into(),
        ));
    }

    let (df1, df2) = (k - 1.0, n - k);
    let f = (ss_between / df1) / (ss_within / df2);
    let dist = FisherSnedecor::new(df1, df2).map_err(undefined)?;
    Ok(StatisticalResult {
        test: "anova".into(),
        statistic: f,
        p_value: Some(dist.sf(f)),
        dof: Some(df1),
        columns,
    })
}

/// One-way ANOVA treating each numeric column as a group.
pub fn anova(table: &Table, columns: &[String]) -> Result<StatisticalResult> {
    let groups = columns
        .iter()
        .map(|c| Ok((c.clone(), table.column(c)?.present_f64s()?)))
        .collect::<Result<Vec<_>>>()?;
    one_way(&groups, columns.to_vec())
}

/// One-way ANOVA of `value` across the levels of `group`.
pub fn anova_by_group(table: &Table, value: &str, group: &str) -> Result<StatisticalResult> {
    let groups: Vec<(String, Vec<f64>)> = grouped(table, value, group)?
        .into_iter()
        .map(|(g, xs)| (g.to_string(), xs))
        .collect();
    one_way(&groups, vec![value.to_string(), group.to_string()])
}

// ---------------------------------------------------------------------------
// Correlation significance
// ---------------------------------------------------------------------------

/// Correlation coefficient with a two-sided p-value from the t distribution
/// with n − 2 degrees of freedom.
pub fn correlation_test(
    table: &Table,
    a: &str,
    b: &str,
    method: CorrelationMethod,
) -> Result<StatisticalResult> {
    let (xs, ys) = paired(table, a, b)?;
    if xs.len() < 3 {
        return Err(EngineError::insufficient(
            format!("correlation test on '{a}' and '{b}'"),
            3,
            xs.len(),
        ));
    }
    let r = correlate(&xs, &ys, method).ok_or_else(|| {
        EngineError::UndefinedStatistic(format!("'{a}' or '{b}' has zero variance"))
    })?;

    let dof = xs.len() as f64 - 2.0;
    let p = if r.abs() >= 1.0 {
        0.0
    } else {
        t_two_sided(r * (dof / (1.0 - r * r)).sqrt(), dof)?
    };
    Ok(StatisticalResult {
        test: match method {
            CorrelationMethod::Pearson => "pearson".into(),
            CorrelationMethod::Spearman => "spearman".into(),
        },
        statistic: r,
        p_value: Some(p),
        dof: Some(dof),
        columns: vec![a.to_string(), b.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn cat(name: &str, values: &[&str]) -> Column {
        Column::categorical(name, values.iter().map(|s| Some(*s)))
    }

    #[test]
    fn contingency_counts_co_occurrences() {
        let t = Table::new(vec![
            cat("a", &["x", "x", "y", "y", "y"]),
            cat("b", &["p", "q", "p", "p", "q"]),
        ])
        .unwrap();
        let ct = contingency_table(&t, "a", "b").unwrap();
        assert_eq!(ct.counts, vec![vec![1, 1], vec![2, 1]]);
        assert_eq!(ct.total(), 5);
    }

    #[test]
    fn chi_squared_two_by_two_uses_yates() {
        // [[10, 20], [30, 40]] -> corrected statistic 0.4464.
        let mut a = Vec::new();
        let mut b = Vec::new();
        for (x, y, n) in [("r1", "c1", 10), ("r1", "c2", 20), ("r2", "c1", 30), ("r2", "c2", 40)] {
            for _ in 0..n {
                a.push(x);
                b.push(y);
            }
        }
        let t = Table::new(vec![cat("a", &a), cat("b", &b)]).unwrap();
        let res = chi_squared(&t, "a", "b").unwrap();
        assert_eq!(res.dof, Some(1.0));
        assert_relative_eq!(res.statistic, 0.4464285714285714, epsilon = 1e-9);
        assert_relative_eq!(res.p_value.unwrap(), 0.5040358664525046, epsilon = 1e-6);
    }

    #[test]
    fn independent_columns_rarely_look_associated() {
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let levels_a = ["a", "b", "c"];
        let levels_b = ["x", "y"];
        let trials = 50;
        let mut accepted = 0;
        for _ in 0..trials {
            let a: Vec<&str> = (0..300).map(|_| levels_a[rng.gen_range(0..3)]).collect();
            let b: Vec<&str> = (0..300).map(|_| levels_b[rng.gen_range(0..2)]).collect();
            let t = Table::new(vec![cat("a", &a), cat("b", &b)]).unwrap();
            if chi_squared(&t, "a", "b").unwrap().p_value.unwrap() > 0.05 {
                accepted += 1;
            }
        }
        assert!(accepted >= 40, "only {accepted}/{trials} trials accepted independence");
    }

    #[test]
    fn one_sample_t_matches_reference() {
        let t = Table::new(vec![Column::numeric(
            "x",
            [5.1, 4.9, 5.6, 5.8, 6.0, 5.3].map(Some),
        )])
        .unwrap();
        let res = t_test_one_sample(&t, "x", 5.0).unwrap();
        assert_eq!(res.dof, Some(5.0));
        assert_relative_eq!(res.statistic, 2.6053232999393208, epsilon = 1e-9);
        assert_relative_eq!(res.p_value.unwrap(), 0.04794, epsilon = 1e-4);
    }

    #[test]
    fn pooled_and_welch_agree_on_equal_sizes() {
        let t = Table::new(vec![
            Column::numeric("a", [1.0, 2.0, 3.0, 4.0, 5.0].map(Some)),
            Column::numeric("b", [3.0, 4.0, 5.0, 6.0, 9.0].map(Some)),
        ])
        .unwrap();
        let welch = t_test_two_sample(&t, "a", "b", VarianceAssumption::Welch).unwrap();
        let pooled = t_test_two_sample(&t, "a", "b", VarianceAssumption::Pooled).unwrap();
        assert_relative_eq!(welch.statistic, pooled.statistic, epsilon = 1e-12);
        assert_eq!(pooled.dof, Some(8.0));
        assert!(welch.dof.unwrap() < 8.0);
    }

    #[test]
    fn group_with_one_observation_is_insufficient() {
        let t = Table::new(vec![
            Column::numeric("v", [1.0, 2.0, 3.0].map(Some)),
            cat("g", &["a", "a", "b"]),
        ])
        .unwrap();
        let err = t_test_by_group(&t, "v", "g", VarianceAssumption::Welch).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 2, actual: 1, .. }));
        let err = anova_by_group(&t, "v", "g").unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { .. }));
    }

    #[test]
    fn t_test_level_count_is_checked() {
        let one_level = Table::new(vec![
            Column::numeric("v", [1.0, 2.0, 3.0].map(Some)),
            cat("g", &["a", "a", "a"]),
        ])
        .unwrap();
        let err = t_test_by_group(&one_level, "v", "g", VarianceAssumption::Welch).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData { required: 2, actual: 1, .. }));

        let three_levels = Table::new(vec![
            Column::numeric("v", [1.0, 2.0, 3.0, 4.0, 5.0, 6.0].map(Some)),
            cat("g", &["a", "a", "b", "b", "c", "c"]),
        ])
        .unwrap();
        let err = t_test_by_group(&three_levels, "v", "g", VarianceAssumption::Welch).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
    }

    #[test]
    fn anova_separates_shifted_groups() {
        let t = Table::new(vec![
            Column::numeric("v", [1.0, 2.0, 3.0, 11.0, 12.0, 13.0, 21.0, 22.0, 23.0].map(Some)),
            cat("g", &["a", "a", "a", "b", "b", "b", "c", "c", "c"]),
        ])
        .unwrap();
        let res = anova_by_group(&t, "v", "g").unwrap();
        assert_relative_eq!(res.statistic, 300.0, epsilon = 1e-9);
        assert_eq!(res.dof, Some(2.0));
        assert!(res.p_value.unwrap() < 1e-5);
    }

    #[test]
    fn correlation_test_flags_strong_relation() {
        let t = Table::new(vec![
            Column::numeric("x", [1.0, 2.0, 3.0, 4.0, 5.0, 6.0].map(Some)),
            Column::numeric("y", [1.1, 1.9, 3.2, 3.9, 5.1, 6.2].map(Some)),
        ])
        .unwrap();
        let res = correlation_test(&t, "x", "y", CorrelationMethod::Pearson).unwrap();
        assert!(res.statistic > 0.99);
        assert!(res.is_significant(0.01));
        let spearman = correlation_test(&t, "x", "y", CorrelationMethod::Spearman).unwrap();
        assert_relative_eq!(spearman.statistic, 1.0);
    }
}
