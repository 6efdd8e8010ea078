//! Additive decomposition and moving-average forecasting of one numeric
//! series indexed by a time column.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::data::model::{parse_datetime, CellValue, ColumnType, Table};
use crate::error::{EngineError, Result};
use crate::numeric;

/// Observed series split into trend, seasonal and residual parts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decomposition {
    pub time: Vec<CellValue>,
    pub observed: Vec<f64>,
    /// Centered moving average; `None` where the window runs off either edge.
    pub trend: Vec<Option<f64>>,
    /// Repeats every `period` points and sums to ~0 over one period.
    pub seasonal: Vec<f64>,
    pub residual: Vec<Option<f64>>,
    pub window: usize,
    pub period: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Extrapolated timestamps, one per forecast step.
    pub time: Vec<CellValue>,
    pub values: Vec<f64>,
    pub window: usize,
}

// ---------------------------------------------------------------------------
// Series extraction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stamp {
    At(NaiveDateTime),
    Index(f64),
}

impl Stamp {
    fn key(self) -> f64 {
        match self {
            Stamp::At(d) => d.and_utc().timestamp_millis() as f64,
            Stamp::Index(v) => v,
        }
    }

    /// Move forward by `step` key units.
    fn advance(self, step: f64) -> Stamp {
        match self {
            Stamp::At(d) => Stamp::At(d + Duration::milliseconds(step.round() as i64)),
            Stamp::Index(v) => Stamp::Index(v + step),
        }
    }

    /// Step used when a single observation gives no spacing: one day or one index unit.
    fn unit_step(self) -> f64 {
        match self {
            Stamp::At(_) => Duration::days(1).num_milliseconds() as f64,
            Stamp::Index(_) => 1.0,
        }
    }

    fn cell(self) -> CellValue {
        match self {
            Stamp::At(d) => CellValue::DateTime(d),
            Stamp::Index(v) => CellValue::Number(v),
        }
    }
}

/// Complete (time, value) pairs sorted by time.
fn series(table: &Table, time: &str, value: &str) -> Result<Vec<(Stamp, f64)>> {
    let time_col = table.column(time)?;
    let values = table.numeric_values(value)?;

    let mut bad = Vec::new();
    let stamps: Vec<Option<Stamp>> = time_col
        .values()
        .iter()
        .enumerate()
        .map(|(row, cell)| match cell {
            CellValue::DateTime(d) => Some(Stamp::At(*d)),
            CellValue::Number(v) => Some(Stamp::Index(*v)),
            CellValue::Text(s) => parse_datetime(s).map(Stamp::At).or_else(|| {
                bad.push(row);
                None
            }),
            CellValue::Missing => None,
            CellValue::Bool(_) => {
                bad.push(row);
                None
            }
        })
        .collect();
    if time_col.column_type() == ColumnType::Boolean {
        return Err(EngineError::type_mismatch(time, "datetime or numeric", ColumnType::Boolean));
    }
    if !bad.is_empty() {
        return Err(EngineError::Conversion {
            column: time.to_string(),
            target: ColumnType::DateTime,
            rows: bad,
        });
    }

    let mut points: Vec<(Stamp, f64)> = stamps
        .into_iter()
        .zip(values)
        .filter_map(|(t, v)| t.zip(v))
        .collect();
    points.sort_by(|a, b| a.0.key().total_cmp(&b.0.key()));
    Ok(points)
}

fn check_positive(name: &str, v: usize) -> Result<()> {
    if v == 0 {
        return Err(EngineError::InvalidParameter(format!("{name} must be at least 1")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Centered moving average. Even windows use the 2×window average, which
/// spans `window + 1` points with half weight on both ends.
fn centered_average(xs: &[f64], window: usize) -> Vec<Option<f64>> {
    let n = xs.len();
    let half = window / 2;
    (0..n)
        .map(|i| {
            if i < half || i + half >= n {
                return None;
            }
            let span = &xs[i - half..=i + half];
            if window % 2 == 1 {
                Some(span.iter().sum::<f64>() / window as f64)
            } else {
                let inner: f64 = span[1..span.len() - 1].iter().sum();
                Some((inner + 0.5 * (span[0] + span[span.len() - 1])) / window as f64)
            }
        })
        .collect()
}

pub fn decompose(
    table: &Table,
    time: &str,
    value: &str,
    window: usize,
    period: usize,
) -> Result<Decomposition> {
    check_positive("window", window)?;
    check_positive("period", period)?;
    let points = series(table, time, value)?;
    let n = points.len();
    let required = window.max(period);
    if n < required {
        return Err(EngineError::insufficient(
            format!("decomposition of '{value}' (window {window}, period {period})"),
            required,
            n,
        ));
    }

    let observed: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let trend = centered_average(&observed, window);

    let mut by_position: Vec<Vec<f64>> = vec![Vec::new(); period];
    for (i, (x, t)) in observed.iter().zip(&trend).enumerate() {
        if let Some(t) = t {
            by_position[i % period].push(x - t);
        }
    }
    let averages: Vec<Option<f64>> = by_position.iter().map(|d| numeric::mean(d)).collect();
    let present: Vec<f64> = averages.iter().flatten().copied().collect();
    let offset = numeric::mean(&present).unwrap_or(0.0);
    let pattern: Vec<f64> = averages
        .iter()
        .map(|a| a.map_or(0.0, |a| a - offset))
        .collect();
    let seasonal: Vec<f64> = (0..n).map(|i| pattern[i % period]).collect();

    let residual = observed
        .iter()
        .zip(&trend)
        .zip(&seasonal)
        .map(|((x, t), s)| t.map(|t| x - t - s))
        .collect();

    log::info!("Decomposed '{value}' over {n} points (window {window}, period {period})");
    Ok(Decomposition {
        time: points.iter().map(|(t, _)| t.cell()).collect(),
        observed,
        trend,
        seasonal,
        residual,
        window,
        period,
    })
}

// ---------------------------------------------------------------------------
// Forecasting
// ---------------------------------------------------------------------------

/// Project `horizon` steps ahead; each step is the mean of the trailing
/// `window` values, earlier forecasts included.
pub fn forecast_moving_average(
    table: &Table,
    time: &str,
    value: &str,
    window: usize,
    horizon: usize,
) -> Result<Forecast> {
    check_positive("window", window)?;
    let points = series(table, time, value)?;
    let n = points.len();
    if n < window {
        return Err(EngineError::insufficient(
            format!("moving-average forecast of '{value}' (window {window})"),
            window,
            n,
        ));
    }

    let mut last = points[n - 1].0;
    let gaps: Vec<f64> = points
        .windows(2)
        .map(|w| w[1].0.key() - w[0].0.key())
        .collect();
    let step = numeric::median(&gaps).unwrap_or_else(|| last.unit_step());

    let mut history: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
    let mut time = Vec::with_capacity(horizon);
    let mut values = Vec::with_capacity(horizon);
    for _ in 0..horizon {
        let tail = &history[history.len() - window..];
        let next = tail.iter().sum::<f64>() / window as f64;
        history.push(next);
        last = last.advance(step);
        time.push(last.cell());
        values.push(next);
    }

    log::info!("Forecast {horizon} steps of '{value}' with window {window}");
    Ok(Forecast {
        time,
        values,
        window,
    })
}
