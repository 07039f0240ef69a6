//! Batch orchestration
//!
//! Runs every (worksheet, model, column) unit of a sensor directory through
//! preprocessing, forecasting and evaluation. A failing unit is recorded in the
//! report and the batch moves on.

use crate::config::{ModelEntry, PipelineConfig};
use crate::data::{list_csv_files, ClimatePreparer, Worksheet, AGGREGATE_COLUMN};
use crate::error::{ForecastError, Result};
use crate::evaluation::{EvaluationRecord, Evaluator};
use crate::forecast::{
    add_transform_columns, checkpoint_path, DriverConfig, ForecastDriver, ForecastFrame,
    FutureRegressors, Stage,
};
use crate::preprocessing::{CovariateGroup, PreparedSeries, SensorPreprocessor};
use crate::timeseries::TimeFrame;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn, Span};
use uuid::Uuid;

/// One MAE row of the per-model error table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRow {
    pub file: String,
    pub column: String,
    pub mae: f64,
}

#[derive(Debug, Clone)]
pub struct ForecastEntry {
    pub file: String,
    pub model: String,
    pub column: String,
    pub forecast: ForecastFrame,
}

/// A unit (or whole worksheet) that could not be processed
#[derive(Debug, Clone, Serialize)]
pub struct UnitFailure {
    pub file: String,
    /// `None` when the worksheet itself failed to load
    pub model: Option<String>,
    pub column: Option<String>,
    pub kind: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Model name to MAE rows, both in insertion order
    pub errors: Vec<(String, Vec<ScoreRow>)>,
    pub forecasts: Vec<ForecastEntry>,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            errors: Vec::new(),
            forecasts: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_score(&mut self, model: &str, row: ScoreRow) {
        match self.errors.iter_mut().find(|(name, _)| name == model) {
            Some((_, rows)) => rows.push(row),
            None => self.errors.push((model.to_string(), vec![row])),
        }
    }

    pub fn scores(&self, model: &str) -> Option<&[ScoreRow]> {
        self.errors
            .iter()
            .find(|(name, _)| name == model)
            .map(|(_, rows)| rows.as_slice())
    }

    /// Forecasts of one (file, model) pair in insertion order
    pub fn forecasts_for<'a>(&'a self, file: &'a str, model: &'a str) -> impl Iterator<Item = &'a ForecastEntry> {
        self.forecasts
            .iter()
            .filter(move |e| e.file == file && e.model == model)
    }

    pub fn successes(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, file: &str, model: Option<&str>, column: Option<&str>, err: &ForecastError) {
        self.failures.push(UnitFailure {
            file: file.to_string(),
            model: model.map(String::from),
            column: column.map(String::from),
            kind: err.kind().to_string(),
            error: err.to_string(),
        });
    }
}

/// Per-run observability handle, passed to every unit
#[derive(Debug, Clone)]
pub struct RunObserver {
    run_id: Uuid,
    span: Span,
}

impl Default for RunObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn unit_span(&self, file: &str, model: &str, column: &str) -> Span {
        info_span!(parent: &self.span, "unit", file, model, column)
    }
}

/// Result of one successful unit
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub forecast: ForecastFrame,
    pub evaluation: Option<EvaluationRecord>,
    pub checkpoint: Option<PathBuf>,
}

pub struct BatchOrchestrator {
    config: PipelineConfig,
    groups: Vec<CovariateGroup>,
    evaluator: Evaluator,
}

impl BatchOrchestrator {
    /// Validate the configuration and prepare the climate covariates, if any
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let groups = match &config.climate_file {
            Some(path) => {
                let frame = ClimatePreparer::new(config.climate.clone()).prepare_file(path)?;
                vec![CovariateGroup::new(config.climate.columns.clone(), frame)]
            }
            None => Vec::new(),
        };
        Ok(Self {
            config,
            groups,
            evaluator: Evaluator::default(),
        })
    }

    /// Replace the climate covariates with an already prepared frame
    pub fn with_covariates(mut self, frame: TimeFrame) -> Self {
        self.groups = vec![CovariateGroup::new(self.config.climate.columns.clone(), frame)];
        self
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<BatchReport> {
        let observer = RunObserver::new();
        let _guard = observer.span().enter();

        let files = list_csv_files(&self.config.data_dir)?;
        if files.is_empty() {
            warn!(dir = %self.config.data_dir.display(), "No sensor files found");
        }
        info!(files = files.len(), models = self.config.models.len(), "Starting batch");

        let mut report = BatchReport::new(observer.run_id());
        for path in &files {
            match self.load_worksheet(path) {
                Ok(sheet) => self.run_worksheet(&sheet, &observer, &mut report),
                Err(e) => {
                    let file = file_identity(path);
                    error!(file = %file, error = %e, "Failed to load worksheet");
                    report.record_failure(&file, None, None, &e);
                }
            }
        }

        info!(
            succeeded = report.successes(),
            failed = report.failures.len(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Load a worksheet, adding the aggregate column when the toggle is on
    pub fn load_worksheet(&self, path: &Path) -> Result<Worksheet> {
        let sheet = Worksheet::load(path)?;
        if self.config.aggregate && !sheet.has_aggregate() {
            sheet.with_aggregate()
        } else {
            Ok(sheet)
        }
    }

    /// Columns forecast for a worksheet
    pub fn columns(&self, sheet: &Worksheet) -> Vec<String> {
        if self.config.aggregate {
            vec![AGGREGATE_COLUMN.to_string()]
        } else {
            sheet.sensor_columns().to_vec()
        }
    }

    /// Run every model and column of one worksheet into `report`
    pub fn run_worksheet(&self, sheet: &Worksheet, observer: &RunObserver, report: &mut BatchReport) {
        let columns = self.columns(sheet);
        for entry in &self.config.models {
            for column in &columns {
                let span = observer.unit_span(sheet.name(), entry.name(), column);
                let _unit = span.enter();

                match self.run_unit(sheet, entry, column) {
                    Ok(result) => {
                        if let Some(record) = &result.evaluation {
                            info!(mae = record.mae(), "Unit evaluated");
                            report.record_score(
                                entry.name(),
                                ScoreRow {
                                    file: sheet.name().to_string(),
                                    column: column.clone(),
                                    mae: record.mae(),
                                },
                            );
                        }
                        report.forecasts.push(ForecastEntry {
                            file: sheet.name().to_string(),
                            model: entry.name().to_string(),
                            column: column.clone(),
                            forecast: result.forecast,
                        });
                    }
                    Err(e) => {
                        error!(kind = e.kind(), error = %e, "Unit failed");
                        report.record_failure(sheet.name(), Some(entry.name()), Some(column), &e);
                    }
                }
            }
        }
    }

    /// Preprocess, forecast and (in-sample) evaluate one column with one model
    pub fn run_unit(&self, sheet: &Worksheet, entry: &ModelEntry, column: &str) -> Result<UnitResult> {
        let preprocessor = SensorPreprocessor::new(self.config.preprocess.clone());
        let mut prepared = preprocessor.prepare(sheet.frame(), column, &self.groups)?;

        if !entry.regressor_transforms.is_empty() {
            add_transform_columns(&mut prepared.train, &entry.regressor_transforms)?;
            if let Some(test) = prepared.test.as_mut() {
                add_transform_columns(test, &entry.regressor_transforms)?;
            }
        }

        let unit = format!("{}_{}", sheet.name(), column);
        let driver_config = DriverConfig {
            horizon: self.config.preprocess.horizon,
            checkpoint_dir: self.config.checkpoint_dir.clone(),
            retrain_from: self.retrain_path(&unit, entry.name()),
            grid: entry.grid.clone(),
        };
        let driver = ForecastDriver::new(entry.model.clone(), driver_config)?;
        let future = self.future_regressors(entry, &prepared);
        let outcome = driver.run(&unit, &prepared, future.as_ref())?;

        let evaluation = match &prepared.test {
            Some(truth) => Some(self.evaluator.evaluate(truth, &outcome.forecast)?),
            None => None,
        };

        Ok(UnitResult {
            forecast: outcome.forecast,
            evaluation,
            checkpoint: outcome.checkpoint,
        })
    }

    /// A directory resolves to the unit's initial checkpoint inside it
    fn retrain_path(&self, unit: &str, model: &str) -> Option<PathBuf> {
        self.config.retrain_from.as_ref().map(|path| {
            if path.is_dir() {
                checkpoint_path(path, unit, model, Stage::Initial)
            } else {
                path.clone()
            }
        })
    }

    fn future_regressors(&self, entry: &ModelEntry, prepared: &PreparedSeries) -> Option<FutureRegressors> {
        if !entry.regressor_transforms.is_empty() {
            return Some(FutureRegressors::Transform(entry.regressor_transforms.clone()));
        }
        if let Some(test) = &prepared.test {
            return Some(FutureRegressors::HistoricalTail(test.clone()));
        }
        // Out of sample: covariate rows after the end of training
        let last = prepared.train.last_timestamp()?;
        let group = self.groups.first()?;
        let start = group.frame.timestamps().partition_point(|ts| *ts <= last);
        Some(FutureRegressors::HistoricalTail(
            group.frame.slice(start, group.frame.len()),
        ))
    }
}

fn file_identity(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(file: &str, mae: f64) -> ScoreRow {
        ScoreRow {
            file: file.to_string(),
            column: AGGREGATE_COLUMN.to_string(),
            mae,
        }
    }

    #[test]
    fn test_scores_keep_insertion_order() {
        let mut report = BatchReport::new(Uuid::new_v4());
        report.record_score("lag_regression", row("floor5", 0.4));
        report.record_score("additive", row("floor3", 0.2));
        report.record_score("lag_regression", row("floor3", 0.1));

        assert_eq!(report.errors[0].0, "lag_regression");
        assert_eq!(report.errors[1].0, "additive");
        let files: Vec<_> = report
            .scores("lag_regression")
            .unwrap()
            .iter()
            .map(|r| r.file.as_str())
            .collect();
        assert_eq!(files, vec!["floor5", "floor3"]);
    }

    #[test]
    fn test_failure_records_kind() {
        let mut report = BatchReport::new(Uuid::new_v4());
        let err = ForecastError::missing_column("MC9", "worksheet 'floor3'");
        report.record_failure("floor3", Some("additive"), Some("MC9"), &err);
        assert!(!report.is_clean());
        assert_eq!(report.failures[0].kind, err.kind());
    }

    #[test]
    fn test_observer_ids_are_unique() {
        assert_ne!(RunObserver::new().run_id(), RunObserver::new().run_id());
    }
}
