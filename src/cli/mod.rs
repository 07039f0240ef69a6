//! Command-line interface
//!
//! `run` forecasts a whole sensor directory, `forecast` a single worksheet and
//! `inspect` prints a worksheet overview. All commands read the same optional
//! JSON config; flags override it.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::batch::{BatchOrchestrator, BatchReport};
use crate::config::PipelineConfig;
use crate::data::{Worksheet, AGGREGATE_COLUMN};
use crate::export::{export_report, write_forecast};
use crate::imputation::ImputeStrategy;
use crate::timeseries::Interval;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "timber-forecast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Forecast structural sensor readings of mass-timber buildings")]
#[command(long_about = None)]
pub struct Cli {
    /// Pipeline config (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast every worksheet of the sensor directory
    Run {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Forecast one column of a single worksheet
    Forecast {
        /// Sensor CSV file
        file: PathBuf,

        /// Column to forecast (defaults to the aggregate column)
        #[arg(long)]
        column: Option<String>,

        /// Only run this model (autoregressive, lag_regression, gradient_boosted, additive)
        #[arg(short, long)]
        model: Option<String>,

        #[command(flatten)]
        overrides: Overrides,
    },
    /// Print a per-column overview of a worksheet
    Inspect {
        /// Sensor CSV file
        file: PathBuf,
    },
}

/// Flags that override the config file
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Directory of sensor CSV files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Daily climate CSV
    #[arg(long)]
    pub climate: Option<PathBuf>,

    /// Forecast horizon in native steps
    #[arg(long)]
    pub horizon: Option<usize>,

    /// Sensor imputation strategy (mean, median, most_frequent, constant:<value>, none)
    #[arg(long)]
    pub impute: Option<String>,

    /// Climate imputation strategy, same values as --impute
    #[arg(long)]
    pub climate_impute: Option<String>,

    /// Climate resampling interval, e.g. 2H
    #[arg(long)]
    pub interval: Option<String>,

    /// Forecast every sensor column instead of the aggregate
    #[arg(long)]
    pub no_aggregate: bool,

    /// Forecast past the end of the data instead of holding out ground truth
    #[arg(long)]
    pub out_of_sample: bool,

    /// Output directory for forecast and error tables
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory for model checkpoints
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Checkpoint file or directory to warm-start from
    #[arg(long)]
    pub retrain_from: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, mut config: PipelineConfig) -> anyhow::Result<PipelineConfig> {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(path) = &self.climate {
            config.climate_file = Some(path.clone());
        }
        if let Some(horizon) = self.horizon {
            config.preprocess.horizon = horizon;
        }
        if let Some(strategy) = &self.impute {
            config.preprocess.impute = parse_impute(strategy)?;
        }
        if let Some(strategy) = &self.climate_impute {
            config.climate.impute = parse_impute(strategy)?;
        }
        if let Some(interval) = &self.interval {
            config.climate.interval = Some(interval.parse::<Interval>()?);
        }
        if self.no_aggregate {
            config.aggregate = false;
        }
        if self.out_of_sample {
            config.preprocess.in_sample = false;
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.checkpoint_dir {
            config.checkpoint_dir = Some(dir.clone());
        }
        if let Some(path) = &self.retrain_from {
            config.retrain_from = Some(path.clone());
        }
        Ok(config)
    }
}

/// `none` turns imputation off
fn parse_impute(value: &str) -> anyhow::Result<Option<ImputeStrategy>> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(value.parse()?))
}

/// Load the config file (or defaults), then apply the flags
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<PipelineConfig> {
    let base = match path {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let config = overrides.apply(base)?;
    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(config: PipelineConfig) -> anyhow::Result<()> {
    section("Batch forecast");
    println!("  {}", kv("data", &config.data_dir.display().to_string()));
    println!("  {}", kv("horizon", &config.preprocess.horizon.to_string()));
    let models: Vec<&str> = config.models.iter().map(|m| m.name()).collect();
    println!("  {}", kv("models", &models.join(", ")));
    println!();

    step_run("Preparing covariates");
    let start = Instant::now();
    let orchestrator = BatchOrchestrator::new(config)?;
    step_done(&format!("{:.2?}", start.elapsed()));

    step_run("Running units");
    let start = Instant::now();
    let report = orchestrator.run()?;
    step_done(&format!("{} ok, {} failed in {:.2?}", report.successes(), report.failures.len(), start.elapsed()));

    print_report(&report);

    let written = export_report(&orchestrator.config().output_dir, &report)?;
    println!();
    step_ok(&format!(
        "wrote {} files to {}",
        written.len(),
        orchestrator.config().output_dir.display()
    ));
    println!("  {}", kv("run", &report.run_id.to_string()));
    println!();
    Ok(())
}

fn print_report(report: &BatchReport) {
    for (model, rows) in &report.errors {
        section(&format!("MAE · {}", model));
        println!("  {:<24} {:<16} {:>10}", muted("File"), muted("Column"), muted("MAE"));
        println!("  {}", dim(&"─".repeat(52)));
        for row in rows {
            println!("  {:<24} {:<16} {:>10.4}", row.file, row.column, row.mae);
        }
    }

    if !report.failures.is_empty() {
        section("Failures");
        for failure in &report.failures {
            let unit = format!(
                "{} / {} / {}",
                failure.file,
                failure.model.as_deref().unwrap_or("*"),
                failure.column.as_deref().unwrap_or("*")
            );
            println!("  {} {} {}", "✗".red(), unit, dim(&failure.error));
        }
    }
}

pub fn cmd_forecast(
    config: PipelineConfig,
    file: &Path,
    column: Option<&str>,
    model: Option<&str>,
) -> anyhow::Result<()> {
    section("Forecast");

    let orchestrator = BatchOrchestrator::new(config)?;
    step_run("Loading worksheet");
    let sheet = orchestrator.load_worksheet(file)?;
    let (sheet, column) = target_column(sheet, column)?;
    let column = column.as_str();
    step_done(&format!("{} rows", sheet.frame().len()));

    let entries: Vec<_> = orchestrator
        .config()
        .models
        .iter()
        .filter(|e| model.map_or(true, |m| e.name() == m))
        .collect();
    if entries.is_empty() {
        anyhow::bail!("no configured model named '{}'", model.unwrap_or_default());
    }

    println!();
    println!("  {:<20} {:>10} {:>10}", muted("Model"), muted("MAE"), muted("Time"));
    println!("  {}", dim(&"─".repeat(42)));
    for entry in entries {
        let start = Instant::now();
        match orchestrator.run_unit(&sheet, entry, column) {
            Ok(result) => {
                let mae = result
                    .evaluation
                    .map(|r| format!("{:.4}", r.mae()))
                    .unwrap_or_else(|| "-".to_string());
                println!("  {:<20} {:>10} {:>10.2?}", entry.name(), mae, start.elapsed());
                write_forecast(
                    &orchestrator.config().output_dir,
                    sheet.name(),
                    entry.name(),
                    column,
                    &result.forecast,
                )?;
            }
            Err(e) => {
                println!("  {:<20} {}", entry.name(), format!("err: {}", e).red());
            }
        }
    }
    println!();
    Ok(())
}

/// Without an explicit column the aggregate is forecast, synthesized if needed
fn target_column(sheet: Worksheet, column: Option<&str>) -> crate::Result<(Worksheet, String)> {
    match column {
        Some(column) => Ok((sheet, column.to_string())),
        None if sheet.has_aggregate() => Ok((sheet, AGGREGATE_COLUMN.to_string())),
        None => Ok((sheet.with_aggregate()?, AGGREGATE_COLUMN.to_string())),
    }
}

pub fn cmd_inspect(file: &Path) -> anyhow::Result<()> {
    section("Worksheet");

    let sheet = Worksheet::load(file)?;
    println!("  {}", kv("name", sheet.name()));
    println!("  {}", kv("rows", &sheet.frame().len().to_string()));
    println!("  {}", kv("span", &sheet.frame().span_string()));
    println!();

    println!(
        "  {:<20} {:>8} {:>20} {:>20}",
        muted("Column"),
        muted("Missing"),
        muted("First valid"),
        muted("Last valid")
    );
    println!("  {}", dim(&"─".repeat(72)));
    for summary in sheet.summary()? {
        let fmt = |t: Option<chrono::NaiveDateTime>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "  {:<20} {:>8} {:>20} {:>20}",
            summary.column,
            summary.missing,
            fmt(summary.first_valid),
            fmt(summary.last_valid)
        );
    }
    println!();
    Ok(())
}
