use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rusty_lens::data::export::{to_csv_string, to_parquet_bytes};
use rusty_lens::{CellValue, Column, ColumnType, Table};

/// Box-Muller transform for normal distribution
fn gauss(rng: &mut ChaCha8Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Customer table with a few missing ages, duplicated rows, income
/// outliers and a weekly sales pattern, so every cleaning step has work.
fn build(rows: usize, seed: u64) -> Result<Table> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let cities = ["Lyon", "Oslo", "Porto", "Quito"];
    let plans = ["basic", "plus", "pro"];
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("start date")?;

    let mut day = Vec::with_capacity(rows);
    let mut age = Vec::with_capacity(rows);
    let mut income = Vec::with_capacity(rows);
    let mut city = Vec::with_capacity(rows);
    let mut plan = Vec::with_capacity(rows);
    let mut sales = Vec::with_capacity(rows);
    let mut churned = Vec::with_capacity(rows);

    for i in 0..rows {
        let a = gauss(&mut rng, 40.0, 12.0).clamp(18.0, 90.0).round();
        let mut inc = gauss(&mut rng, 30_000.0 + 600.0 * a, 5_000.0).round();
        if rng.gen_bool(0.02) {
            inc *= 10.0;
        }
        let weekly = [0.0, 5.0, 8.0, 6.0, 3.0, -10.0, -12.0][i % 7];

        day.push(CellValue::DateTime(start + Duration::days(i as i64)));
        age.push((!rng.gen_bool(0.08)).then_some(a));
        income.push(Some(inc));
        city.push(Some(cities[rng.gen_range(0..cities.len())]));
        plan.push(Some(plans[rng.gen_range(0..plans.len())]));
        sales.push(Some(100.0 + 0.5 * i as f64 + weekly + gauss(&mut rng, 0.0, 2.0)));
        churned.push(Some(if a < 30.0 || inc < 40_000.0 { "yes" } else { "no" }));
    }

    let table = Table::new(vec![
        Column::new("day", ColumnType::DateTime, day)?,
        Column::numeric("age", age),
        Column::numeric("income", income),
        Column::categorical("city", city),
        Column::categorical("plan", plan),
        Column::numeric("sales", sales),
        Column::categorical("churned", churned),
    ])?;

    // Append a handful of exact duplicates.
    let mut order: Vec<usize> = (0..rows).collect();
    order.extend((0..rows / 20).map(|_| rng.gen_range(0..rows)));
    Ok(table.take_rows(&order))
}

fn main() -> Result<()> {
    env_logger::init();

    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data.csv"));
    let table = build(200, 42)?;

    let parquet = out.extension().is_some_and(|e| e == "parquet");
    if parquet {
        std::fs::write(&out, to_parquet_bytes(&table)?)
    } else {
        std::fs::write(&out, to_csv_string(&table)?)
    }
    .with_context(|| format!("writing {}", out.display()))?;

    println!("Wrote {} rows x {} columns to {}", table.n_rows(), table.n_cols(), out.display());
    Ok(())
}
