use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rusty_lens::{EngineConfig, Session};

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "RUSTY_LENS_CONFIG";

enum Mode {
    Describe,
    Suggest,
    ExportJson,
}

fn usage() -> String {
    "usage: rusty-lens <file.csv|file.json|file.parquet> [--describe|--suggest|--export-json]".into()
}

fn parse_args() -> Result<(PathBuf, Mode)> {
    let mut path = None;
    let mut mode = Mode::Describe;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--describe" => mode = Mode::Describe,
            "--suggest" => mode = Mode::Suggest,
            "--export-json" => mode = Mode::ExportJson,
            "-h" | "--help" => bail!(usage()),
            flag if flag.starts_with("--") => bail!("unknown flag {flag}\n{}", usage()),
            file => path = Some(PathBuf::from(file)),
        }
    }
    match path {
        Some(p) => Ok((p, mode)),
        None => bail!(usage()),
    }
}

fn load_config() -> Result<EngineConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            log::info!("Using config {}", path.display());
            EngineConfig::from_path(&path)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let (path, mode) = parse_args()?;
    let mut session = Session::new(load_config()?);
    let version = session
        .load_path(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    log::info!("Dataset ready as {}", version.id);

    let output = match mode {
        Mode::Describe => serde_json::to_string_pretty(&serde_json::json!({
            "rows": version.table.n_rows(),
            "columns": version.table.column_names(),
            "missing": session.missing_report()?,
            "summary": session.describe()?,
        }))?,
        Mode::Suggest => serde_json::to_string_pretty(&session.suggest_types()?)?,
        Mode::ExportJson => session.export_json()?,
    };
    println!("{output}");
    Ok(())
}
