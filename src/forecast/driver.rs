//! Forecast driver
//!
//! Fits one model kind on a prepared series and produces a normalized forecast.
//! Handles future covariates, grid search for the additive model, warm starts
//! from checkpoints and checkpoint persistence.

use super::checkpoint::{write_checkpoint, Checkpoint, Stage};
use super::frame::ForecastFrame;
use crate::error::{ForecastError, Result};
use crate::evaluation::Evaluator;
use crate::preprocessing::PreparedSeries;
use crate::timeseries::TimeFrame;
use crate::training::grid::best_index;
use crate::training::{
    AdditiveConfig, AdditiveGrid, AdditiveModel, Forecaster, GridPoint, ModelSpec, TimeIndex,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Deterministic function of the timestamp used as a future regressor value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorTransform {
    /// Hour of day, 0-23
    HourOfDay,
    /// Day of week, Monday = 0
    DayOfWeek,
    /// Day of year, 1-366
    DayOfYear,
    Constant(f64),
}

impl RegressorTransform {
    pub fn apply(&self, ds: NaiveDateTime) -> f64 {
        match self {
            RegressorTransform::HourOfDay => ds.hour() as f64,
            RegressorTransform::DayOfWeek => ds.weekday().num_days_from_monday() as f64,
            RegressorTransform::DayOfYear => ds.ordinal() as f64,
            RegressorTransform::Constant(v) => *v,
        }
    }

    pub fn column(&self, stamps: &[NaiveDateTime]) -> Vec<Option<f64>> {
        stamps.iter().map(|ds| Some(self.apply(*ds))).collect()
    }
}

/// Add transform columns that `frame` does not already carry
pub fn add_transform_columns(
    frame: &mut TimeFrame,
    transforms: &BTreeMap<String, RegressorTransform>,
) -> Result<()> {
    for (name, transform) in transforms {
        if !frame.has_column(name) {
            let values = transform.column(frame.timestamps());
            frame.set_column(name.clone(), values)?;
        }
    }
    Ok(())
}

/// Source of covariate values for the forecast horizon
#[derive(Debug, Clone)]
pub enum FutureRegressors {
    /// Held-out covariate rows following the training data; the first `horizon`
    /// rows are used
    HistoricalTail(TimeFrame),
    /// Values computed from each future timestamp
    Transform(BTreeMap<String, RegressorTransform>),
}

/// Driver settings shared by all model kinds
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    pub horizon: usize,
    /// Directory for JSON checkpoints; `None` disables persistence
    pub checkpoint_dir: Option<PathBuf>,
    /// Checkpoint to warm-start from
    pub retrain_from: Option<PathBuf>,
    /// Hyperparameter grid (additive model only)
    pub grid: Option<AdditiveGrid>,
}

impl DriverConfig {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn with_retrain_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.retrain_from = Some(path.into());
        self
    }

    pub fn with_grid(mut self, grid: AdditiveGrid) -> Self {
        self.grid = Some(grid);
        self
    }
}

/// Result of one driver run
#[derive(Debug, Clone)]
pub struct ForecastOutcome {
    pub forecast: ForecastFrame,
    pub stage: Stage,
    pub checkpoint: Option<PathBuf>,
    /// Score of every grid point, in enumeration order
    pub grid_scores: Vec<(GridPoint, f64)>,
}

pub struct ForecastDriver {
    spec: ModelSpec,
    config: DriverConfig,
}

impl ForecastDriver {
    pub fn new(spec: ModelSpec, config: DriverConfig) -> Result<Self> {
        spec.validate()?;
        if config.horizon == 0 {
            return Err(ForecastError::Config("horizon must be at least 1".to_string()));
        }
        if let Some(grid) = &config.grid {
            if config.retrain_from.is_some() {
                return Err(ForecastError::Config(
                    "retrain and grid search cannot be combined".to_string(),
                ));
            }
            if !matches!(spec, ModelSpec::Additive(_)) {
                return Err(ForecastError::Config(format!(
                    "grid search is only supported for the additive model, not '{}'",
                    spec.name()
                )));
            }
            grid.validate()?;
        }
        Ok(Self { spec, config })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn run(
        &self,
        unit: &str,
        prepared: &PreparedSeries,
        future: Option<&FutureRegressors>,
    ) -> Result<ForecastOutcome> {
        let horizon = self.config.horizon;
        let model_name = self.spec.name();
        info!(unit, model = model_name, horizon, "Running forecast");

        let mut grid_scores = Vec::new();
        let (forecaster, stage) = match (&self.spec, &self.config.grid) {
            (ModelSpec::Additive(base), Some(grid)) => {
                let (winner, scores) = self.grid_search(base, grid, prepared, future)?;
                grid_scores = scores;
                let mut model: Box<dyn Forecaster> = Box::new(AdditiveModel::new(winner));
                model.fit(&prepared.train, &prepared.covariate_columns)?;
                (model, Stage::Initial)
            }
            _ => {
                let mut model = self.spec.build();
                let stage = match &self.config.retrain_from {
                    Some(path) => {
                        Checkpoint::load(path)?.restore_into(model.as_mut())?;
                        info!(path = %path.display(), "Warm-starting from checkpoint");
                        Stage::Retrained
                    }
                    None => Stage::Initial,
                };
                model.fit(&prepared.train, &prepared.covariate_columns)?;
                (model, stage)
            }
        };

        let future_frame = self.future_frame(forecaster.as_ref(), prepared, future)?;
        let forecast = forecaster.predict(horizon, future_frame.as_ref())?;

        let checkpoint = match &self.config.checkpoint_dir {
            Some(dir) => Some(write_checkpoint(dir, unit, model_name, stage, forecaster.as_ref())?),
            None => None,
        };

        debug!(unit, model = model_name, rows = forecast.len(), "Forecast ready");
        Ok(ForecastOutcome {
            forecast,
            stage,
            checkpoint,
            grid_scores,
        })
    }

    fn grid_search(
        &self,
        base: &AdditiveConfig,
        grid: &AdditiveGrid,
        prepared: &PreparedSeries,
        future: Option<&FutureRegressors>,
    ) -> Result<(AdditiveConfig, Vec<(GridPoint, f64)>)> {
        let truth = prepared.test.as_ref().ok_or_else(|| {
            ForecastError::Config("grid search requires in-sample ground truth".to_string())
        })?;
        let evaluator = Evaluator::default();

        let points = grid.points();
        let mut scores = Vec::with_capacity(points.len());
        for point in &points {
            let config = point.apply(base);
            let mut model = AdditiveModel::new(config);
            let score = model
                .fit(&prepared.train, &prepared.covariate_columns)
                .and_then(|_| {
                    let future_frame = self.future_frame(&model, prepared, future)?;
                    model.predict(self.config.horizon, future_frame.as_ref())
                })
                .and_then(|forecast| evaluator.evaluate(truth, &forecast))
                .map(|record| record.mae());
            let score = match score {
                Ok(mae) => mae,
                Err(e) => {
                    warn!(point = %point, error = %e, "Grid point failed");
                    f64::NAN
                }
            };
            debug!(point = %point, mae = score, "Scored grid point");
            scores.push(score);
        }

        let best = best_index(&scores).ok_or_else(|| {
            ForecastError::Training("every grid point failed to fit".to_string())
        })?;
        info!(best = %points[best], mae = scores[best], "Selected grid point");
        let winner = points[best].apply(base);
        Ok((winner, points.into_iter().zip(scores).collect()))
    }

    /// Covariate rows for the horizon, in the shape the fitted model expects
    fn future_frame(
        &self,
        model: &dyn Forecaster,
        prepared: &PreparedSeries,
        future: Option<&FutureRegressors>,
    ) -> Result<Option<TimeFrame>> {
        let columns: Vec<String> = match &self.spec {
            ModelSpec::Additive(config) => config.regressors.clone(),
            _ if model.needs_future_covariates() => prepared.covariate_columns.clone(),
            _ => Vec::new(),
        };
        if columns.is_empty() {
            return Ok(None);
        }

        let horizon = self.config.horizon;
        match future {
            Some(FutureRegressors::HistoricalTail(frame)) => {
                if frame.len() < horizon {
                    return Err(ForecastError::insufficient(
                        horizon,
                        frame.len(),
                        "future covariates",
                    ));
                }
                Ok(Some(frame.head(horizon).select(&columns)?))
            }
            Some(FutureRegressors::Transform(transforms)) => {
                let stamps = TimeIndex::from_frame(&prepared.train)?.future(horizon);
                let mut frame = TimeFrame::new(stamps.clone())?;
                for name in &columns {
                    let transform = transforms.get(name).ok_or_else(|| {
                        ForecastError::missing_column(name, "regressor transforms")
                    })?;
                    frame.set_column(name.clone(), transform.column(&stamps))?;
                }
                Ok(Some(frame))
            }
            None => Err(ForecastError::insufficient(horizon, 0, "future covariates")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;
    use crate::timeseries::Y;
    use crate::training::{ArConfig, LagConfig, SeasonalityMode};
    use tempfile::tempdir;

    fn prepared(n: usize, horizon: usize) -> PreparedSeries {
        let temp: Vec<f64> = (0..n).map(|i| ((i * 5) % 9) as f64).collect();
        let y: Vec<f64> = temp.iter().map(|t| 4.0 + 0.5 * t).collect();
        let frame = TimeFrame::new(hourly(n, 2))
            .unwrap()
            .with_dense_column(Y, y)
            .unwrap()
            .with_dense_column("temp", temp)
            .unwrap();
        PreparedSeries {
            train: frame.slice(0, n - horizon),
            test: Some(frame.slice(n - horizon, n)),
            covariate_columns: vec!["temp".to_string()],
        }
    }

    #[test]
    fn test_retrain_and_grid_rejected() {
        let config = DriverConfig::new(5)
            .with_grid(AdditiveGrid::default())
            .with_retrain_from("model.json");
        let err = ForecastDriver::new(ModelSpec::Additive(AdditiveConfig::default()), config);
        assert!(matches!(err, Err(ForecastError::Config(_))));
    }

    #[test]
    fn test_grid_only_for_additive() {
        let config = DriverConfig::new(5).with_grid(AdditiveGrid::default());
        assert!(ForecastDriver::new(ModelSpec::Autoregressive(ArConfig::default()), config).is_err());
    }

    #[test]
    fn test_lag_model_uses_held_out_tail() {
        let data = prepared(80, 10);
        let driver = ForecastDriver::new(
            ModelSpec::LagRegression(LagConfig::default().with_covariate_lags(1)),
            DriverConfig::new(10),
        )
        .unwrap();
        let tail = FutureRegressors::HistoricalTail(data.test.clone().unwrap());
        let outcome = driver.run("floor3_MC", &data, Some(&tail)).unwrap();
        assert_eq!(outcome.forecast.len(), 10);
        let truth = data.test.as_ref().unwrap().dense_column(Y).unwrap();
        for (f, t) in outcome.forecast.y.iter().zip(&truth) {
            assert!((f - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_insufficient_future_rows() {
        let data = prepared(80, 10);
        let driver = ForecastDriver::new(
            ModelSpec::LagRegression(LagConfig::default().with_covariate_lags(1)),
            DriverConfig::new(10),
        )
        .unwrap();
        let short = FutureRegressors::HistoricalTail(data.test.as_ref().unwrap().head(9));
        assert!(matches!(
            driver.run("unit", &data, Some(&short)),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(driver.run("unit", &data, None).is_err());
    }

    #[test]
    fn test_transform_regressors() {
        let data = prepared(60, 6);
        let spec = ModelSpec::Additive(
            AdditiveConfig::default()
                .with_seasonalities(false, false, false)
                .add_regressor("temp"),
        );
        let driver = ForecastDriver::new(spec, DriverConfig::new(6)).unwrap();
        let mut transforms = BTreeMap::new();
        transforms.insert("temp".to_string(), RegressorTransform::Constant(2.0));
        let outcome = driver
            .run("unit", &data, Some(&FutureRegressors::Transform(transforms)))
            .unwrap();
        assert_eq!(outcome.forecast.len(), 60);
        assert!(outcome.forecast.has_interval());
        assert!((outcome.forecast.y[59] - 5.0).abs() < 0.5);
    }

    #[test]
    fn test_grid_search_scores_every_point() {
        let data = prepared(120, 12);
        let spec = ModelSpec::Additive(AdditiveConfig::default().with_seasonalities(false, false, true));
        let grid = AdditiveGrid {
            changepoint_prior_scale: vec![0.01, 0.1],
            seasonality_mode: vec![SeasonalityMode::Additive],
            seasonality_prior_scale: vec![1.0],
        };
        let driver = ForecastDriver::new(spec, DriverConfig::new(12).with_grid(grid)).unwrap();
        let outcome = driver.run("unit", &data, None).unwrap();
        assert_eq!(outcome.grid_scores.len(), 2);
        assert!(outcome.grid_scores.iter().all(|(_, s)| s.is_finite()));
        assert_eq!(outcome.forecast.len(), 120);
    }

    #[test]
    fn test_grid_requires_ground_truth() {
        let mut data = prepared(60, 6);
        data.test = None;
        let spec = ModelSpec::Additive(AdditiveConfig::default());
        let driver =
            ForecastDriver::new(spec, DriverConfig::new(6).with_grid(AdditiveGrid::default())).unwrap();
        assert!(matches!(
            driver.run("unit", &data, None),
            Err(ForecastError::Config(_))
        ));
    }

    #[test]
    fn test_checkpoints_initial_then_retrained() {
        let dir = tempdir().unwrap();
        let data = prepared(60, 6);
        let spec = ModelSpec::Autoregressive(ArConfig::default().with_order(2));

        let driver = ForecastDriver::new(
            spec.clone(),
            DriverConfig::new(6).with_checkpoint_dir(dir.path()),
        )
        .unwrap();
        let first = driver.run("floor3", &data, None).unwrap();
        assert_eq!(first.stage, Stage::Initial);
        let path = first.checkpoint.unwrap();
        assert!(path.ends_with("floor3__autoregressive__initial.json"));

        let retrain = ForecastDriver::new(
            spec,
            DriverConfig::new(6)
                .with_checkpoint_dir(dir.path())
                .with_retrain_from(&path),
        )
        .unwrap();
        let second = retrain.run("floor3", &data, None).unwrap();
        assert_eq!(second.stage, Stage::Retrained);
        assert!(second
            .checkpoint
            .unwrap()
            .ends_with("floor3__autoregressive__retrained.json"));
    }
}
