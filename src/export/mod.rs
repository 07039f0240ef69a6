//! CSV result tables
//!
//! - forecasts: `<file>-<model>-aggr.csv` (or `<file>-<model>-<column>.csv` when
//!   individual sensor columns are forecast)
//! - errors: `mae-<model>.csv` with one row per (file, column)

use crate::batch::{BatchReport, ScoreRow};
use crate::data::AGGREGATE_COLUMN;
use crate::error::Result;
use crate::forecast::checkpoint::sanitize;
use crate::forecast::ForecastFrame;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn forecast_file_name(file: &str, model: &str, column: &str) -> String {
    let suffix = if column == AGGREGATE_COLUMN {
        "aggr".to_string()
    } else {
        sanitize(column)
    };
    format!("{}-{}-{}.csv", sanitize(file), sanitize(model), suffix)
}

pub fn score_file_name(model: &str) -> String {
    format!("mae-{}.csv", sanitize(model))
}

/// Forecast as a polars frame with `ds`, `y` and, when present, `y_lower`/`y_upper`
pub fn forecast_to_frame(forecast: &ForecastFrame) -> Result<DataFrame> {
    let ds: Vec<String> = forecast
        .ds
        .iter()
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
        .collect();

    let mut columns: Vec<Column> = vec![
        Series::new("ds".into(), ds).into(),
        Series::new("y".into(), forecast.y.clone()).into(),
    ];
    if let (Some(lower), Some(upper)) = (&forecast.y_lower, &forecast.y_upper) {
        columns.push(Series::new("y_lower".into(), lower.clone()).into());
        columns.push(Series::new("y_upper".into(), upper.clone()).into());
    }
    Ok(DataFrame::new(columns)?)
}

pub fn scores_to_frame(rows: &[ScoreRow]) -> Result<DataFrame> {
    let files: Vec<&str> = rows.iter().map(|r| r.file.as_str()).collect();
    let columns: Vec<&str> = rows.iter().map(|r| r.column.as_str()).collect();
    let mae: Vec<f64> = rows.iter().map(|r| r.mae).collect();
    Ok(DataFrame::new(vec![
        Series::new("file".into(), files).into(),
        Series::new("column".into(), columns).into(),
        Series::new("MAE".into(), mae).into(),
    ])?)
}

fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

pub fn write_forecast(
    dir: &Path,
    file: &str,
    model: &str,
    column: &str,
    forecast: &ForecastFrame,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(forecast_file_name(file, model, column));
    write_csv(&mut forecast_to_frame(forecast)?, &path)?;
    Ok(path)
}

pub fn write_scores(dir: &Path, model: &str, rows: &[ScoreRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(score_file_name(model));
    write_csv(&mut scores_to_frame(rows)?, &path)?;
    Ok(path)
}

/// Write every forecast and error table of a report; returns the written paths
pub fn export_report(dir: &Path, report: &BatchReport) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in &report.forecasts {
        written.push(write_forecast(
            dir,
            &entry.file,
            &entry.model,
            &entry.column,
            &entry.forecast,
        )?);
    }
    for (model, rows) in &report.errors {
        written.push(write_scores(dir, model, rows)?);
    }
    info!(dir = %dir.display(), files = written.len(), "Exported results");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataLoader;
    use crate::timeseries::frame::tests::hourly;
    use tempfile::tempdir;

    #[test]
    fn test_file_names() {
        assert_eq!(forecast_file_name("floor3", "additive", AGGREGATE_COLUMN), "floor3-additive-aggr.csv");
        assert_eq!(forecast_file_name("floor3", "additive", "MC 1"), "floor3-additive-MC_1.csv");
        assert_eq!(score_file_name("gradient_boosted"), "mae-gradient_boosted.csv");
    }

    #[test]
    fn test_write_forecast_with_interval() {
        let dir = tempdir().unwrap();
        let forecast = ForecastFrame::new(hourly(3, 2), vec![1.0, 2.0, 3.0])
            .unwrap()
            .with_interval(vec![0.5; 3], vec![3.5; 3])
            .unwrap();
        let path = write_forecast(dir.path(), "floor3", "additive", AGGREGATE_COLUMN, &forecast).unwrap();

        let table = DataLoader::new().load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["ds", "y", "y_lower", "y_upper"]);
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.columns[0][1].as_deref(), Some("2021-01-01 02:00:00"));
    }

    #[test]
    fn test_write_scores() {
        let dir = tempdir().unwrap();
        let rows = vec![
            ScoreRow { file: "floor3".into(), column: AGGREGATE_COLUMN.into(), mae: 0.25 },
            ScoreRow { file: "floor5".into(), column: AGGREGATE_COLUMN.into(), mae: 0.5 },
        ];
        let path = write_scores(dir.path(), "lag_regression", &rows).unwrap();
        let table = DataLoader::new().load_table(&path).unwrap();
        assert_eq!(table.headers, vec!["file", "column", "MAE"]);
        assert_eq!(table.columns[0], vec![Some("floor3".to_string()), Some("floor5".to_string())]);
    }
}
