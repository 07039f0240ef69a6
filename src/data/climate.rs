//! Climate covariate preparation
//!
//! Daily weather records are imputed column by column and optionally padded
//! forward onto the finer cadence of the sensor loggers.

use super::loader::{parse_numeric_cell, DataLoader, RawTable};
use crate::error::{ForecastError, Result};
use crate::imputation::{ImputeStrategy, SimpleImputer};
use crate::timeseries::{forward_fill, Interval, TimeFrame};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Date column of the climate export
pub const DATE_COLUMN: &str = "LOCAL_DATE";

/// Configuration for [`ClimatePreparer`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// Covariate columns to keep, in output order
    pub columns: Vec<String>,
    /// Scalar imputation applied per column before resampling
    pub impute: Option<ImputeStrategy>,
    /// Target cadence for forward-fill upsampling
    pub interval: Option<Interval>,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                "MEAN_TEMPERATURE".to_string(),
                "TOTAL_PRECIPITATION".to_string(),
            ],
            impute: Some(ImputeStrategy::Mean),
            interval: Some(Interval::hours(2)),
        }
    }
}

impl ClimateConfig {
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_impute(mut self, strategy: Option<ImputeStrategy>) -> Self {
        self.impute = strategy;
        self
    }

    pub fn with_interval(mut self, interval: Option<Interval>) -> Self {
        self.interval = interval;
        self
    }
}

/// Turns a daily climate export into a covariate frame
#[derive(Debug, Clone)]
pub struct ClimatePreparer {
    config: ClimateConfig,
}

impl ClimatePreparer {
    pub fn new(config: ClimateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClimateConfig {
        &self.config
    }

    pub fn prepare_file(&self, path: &Path) -> Result<TimeFrame> {
        let table = DataLoader::new().load_table(path)?;
        self.prepare(&table)
    }

    pub fn prepare(&self, table: &RawTable) -> Result<TimeFrame> {
        let context = "climate data";
        let dates = table
            .column(DATE_COLUMN, context)?
            .iter()
            .enumerate()
            .map(|(row, cell)| parse_date(cell.as_deref(), row))
            .collect::<Result<Vec<_>>>()?;

        let mut frame = TimeFrame::new(dates).map_err(|e| {
            ForecastError::DataError(format!("climate dates must be strictly increasing: {}", e))
        })?;

        for name in &self.config.columns {
            let cells = table.column(name, context)?;
            let mut values = cells
                .iter()
                .enumerate()
                .map(|(row, cell)| {
                    parse_numeric_cell(cell.as_deref()).map_err(|msg| {
                        ForecastError::DataError(format!(
                            "{}: column '{}' row {}: {}",
                            context, name, row, msg
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            if let Some(strategy) = self.config.impute {
                let mut imputer = SimpleImputer::new(strategy);
                let missing = values.iter().filter(|v| v.is_none()).count();
                values = imputer
                    .fit_transform(&values)?
                    .into_iter()
                    .map(Some)
                    .collect();
                debug!(column = %name, missing, strategy = %strategy, "Imputed climate column");
            }
            frame.set_column(name.clone(), values)?;
        }

        let frame = match self.config.interval {
            Some(interval) => forward_fill(&frame, interval)?,
            None => frame,
        };

        info!(
            rows = frame.len(),
            span = %frame.span_string(),
            "Prepared climate covariates"
        );
        Ok(frame)
    }
}

fn parse_date(cell: Option<&str>, row: usize) -> Result<NaiveDateTime> {
    let raw = cell.ok_or_else(|| {
        ForecastError::DataError(format!("climate data: empty {} at row {}", DATE_COLUMN, row))
    })?;
    raw.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            ForecastError::DataError(format!(
                "climate data: invalid {} '{}' at row {}",
                DATE_COLUMN, raw, row
            ))
        })
}
