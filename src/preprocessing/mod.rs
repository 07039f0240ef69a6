//! Per-sensor preprocessing
//!
//! Turns one worksheet column into a model-ready series:
//! 1. trim to the first/last valid reading and relabel as `ds`/`y`
//! 2. impute the remaining internal gaps
//! 3. align against each covariate group and copy its columns
//! 4. split off the last `horizon` rows as ground truth

mod config;

pub use config::PreprocessConfig;

use crate::error::{ForecastError, Result};
use crate::imputation::SimpleImputer;
use crate::timeseries::{align, TimeFrame, Y};
use tracing::{debug, info};

/// Covariate columns taken from one frame
#[derive(Debug, Clone)]
pub struct CovariateGroup {
    pub columns: Vec<String>,
    pub frame: TimeFrame,
}

impl CovariateGroup {
    pub fn new(columns: Vec<String>, frame: TimeFrame) -> Self {
        Self { columns, frame }
    }
}

/// A preprocessed series ready for fitting
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    /// Training rows: `y` plus every covariate column
    pub train: TimeFrame,
    /// Held-out ground truth (in-sample mode only)
    pub test: Option<TimeFrame>,
    /// Covariate columns present in both parts
    pub covariate_columns: Vec<String>,
}

impl PreparedSeries {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.as_ref().map(|t| t.len()).unwrap_or(0)
    }
}

/// Runs the preprocessing steps for one column of a worksheet
#[derive(Debug, Clone)]
pub struct SensorPreprocessor {
    config: PreprocessConfig,
}

impl SensorPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn prepare(
        &self,
        sheet: &TimeFrame,
        column: &str,
        groups: &[CovariateGroup],
    ) -> Result<PreparedSeries> {
        self.config.validate()?;

        let mut working = extract_valid_span(sheet, column)?;

        if let Some(strategy) = self.config.impute {
            let values = working.column(Y)?.to_vec();
            let filled = SimpleImputer::new(strategy).fit_transform(&values)?;
            working.set_column(Y, filled.into_iter().map(Some).collect())?;
        }
        debug!(
            column,
            remaining_missing = working.missing_count(Y)?,
            "Imputation done"
        );

        let mut covariate_columns = Vec::new();
        for group in groups {
            working = attach_covariates(&working, group)?;
            covariate_columns.extend(group.columns.iter().cloned());
        }

        self.split(working, covariate_columns)
    }

    fn split(&self, working: TimeFrame, covariate_columns: Vec<String>) -> Result<PreparedSeries> {
        if !self.config.in_sample {
            return Ok(PreparedSeries {
                train: working,
                test: None,
                covariate_columns,
            });
        }

        let horizon = self.config.horizon;
        let rows = working.len();
        if horizon >= rows {
            return Err(ForecastError::insufficient(
                horizon + 1,
                rows,
                "train/test split",
            ));
        }

        let cut = rows - horizon;
        let train = working.slice(0, cut);
        let test = working.slice(cut, rows);
        info!(train = train.len(), test = test.len(), "Split series");
        Ok(PreparedSeries {
            train,
            test: Some(test),
            covariate_columns,
        })
    }
}

/// Slice one column between its first and last non-missing entry, relabelled `y`
pub fn extract_valid_span(sheet: &TimeFrame, column: &str) -> Result<TimeFrame> {
    let values = sheet.column(column)?;
    let first = values.iter().position(|v| v.is_some());
    let last = values.iter().rposition(|v| v.is_some());

    let (first, last) = match (first, last) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ForecastError::insufficient(
                1,
                0,
                format!("column '{}' (no valid values)", column),
            ))
        }
    };
    debug!(column, first_valid = first, last_valid = last, "Valid span");

    let mut span = sheet.select(&[column])?.slice(first, last + 1);
    span.rename_column(column, Y)?;
    Ok(span)
}

/// Align the working frame with a covariate group and copy its columns by position
pub fn attach_covariates(working: &TimeFrame, group: &CovariateGroup) -> Result<TimeFrame> {
    for name in &group.columns {
        if !group.frame.has_column(name) {
            return Err(ForecastError::missing_column(name, "covariate frame"));
        }
    }

    let pair = align(working, &group.frame)?;
    if pair.series.len() != pair.covariates.len() {
        return Err(ForecastError::Alignment(format!(
            "aligned range {} has {} series rows but {} covariate rows",
            pair.series.span_string(),
            pair.series.len(),
            pair.covariates.len()
        )));
    }
    info!(span = %pair.series.span_string(), rows = pair.series.len(), "Common span with covariates");

    let mut merged = pair.series;
    for name in &group.columns {
        merged.set_column(name.clone(), pair.covariates.column(name)?.to_vec())?;
    }
    Ok(merged)
}
