//! Forecasting models
//!
//! Every model kind implements [`Forecaster`]:
//! - Autoregressive AR(p) with optional exogenous covariates
//! - Linear regression on lagged covariates
//! - Gradient boosted regression trees on the same lag features
//! - Additive trend + seasonality model with prediction intervals

pub mod additive;
pub mod autoregressive;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod grid;
pub mod lag_regression;
pub mod linalg;

pub use additive::{AdditiveConfig, AdditiveModel, SeasonalityMode};
pub use autoregressive::{ArConfig, AutoRegressive};
pub use decision_tree::{DecisionTree, TreeConfig};
pub use gradient_boosting::{BoostConfig, BoostingParams, GradientBoostedForecaster};
pub use grid::{AdditiveGrid, GridPoint};
pub use lag_regression::{LagConfig, LagRegression};

use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{future_timestamps, TimeFrame};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Uniform capability of every model kind
pub trait Forecaster: Send {
    /// Model kind tag, also used in checkpoint envelopes
    fn kind(&self) -> &'static str;

    /// Fit on the training frame (`y` plus the named covariate columns)
    fn fit(&mut self, train: &TimeFrame, covariates: &[String]) -> Result<()>;

    /// Forecast `horizon` steps. `future` holds exactly `horizon` rows of
    /// covariate values for models that consume them.
    fn predict(&self, horizon: usize, future: Option<&TimeFrame>) -> Result<ForecastFrame>;

    /// Whether `predict` requires explicit future covariates
    fn needs_future_covariates(&self) -> bool {
        false
    }

    /// Serializable fitted state
    fn checkpoint(&self) -> Result<serde_json::Value>;

    /// Seed the next fit with a previously checkpointed state
    fn warm_start(&mut self, state: serde_json::Value) -> Result<()>;

    fn is_fitted(&self) -> bool;
}

/// Closed set of model kinds with their hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Autoregressive(ArConfig),
    LagRegression(LagConfig),
    GradientBoosted(BoostConfig),
    Additive(AdditiveConfig),
}

impl ModelSpec {
    /// Name used for output tables and checkpoint files
    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::Autoregressive(_) => "autoregressive",
            ModelSpec::LagRegression(_) => "lag_regression",
            ModelSpec::GradientBoosted(_) => "gradient_boosted",
            ModelSpec::Additive(_) => "additive",
        }
    }

    pub fn build(&self) -> Box<dyn Forecaster> {
        match self {
            ModelSpec::Autoregressive(c) => Box::new(AutoRegressive::new(c.clone())),
            ModelSpec::LagRegression(c) => Box::new(LagRegression::new(c.clone())),
            ModelSpec::GradientBoosted(c) => Box::new(GradientBoostedForecaster::new(c.clone())),
            ModelSpec::Additive(c) => Box::new(AdditiveModel::new(c.clone())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ModelSpec::Autoregressive(c) => c.validate(),
            ModelSpec::LagRegression(c) => c.validate(),
            ModelSpec::GradientBoosted(c) => c.validate(),
            ModelSpec::Additive(c) => c.validate(),
        }
    }
}

/// Last training timestamp and sampling step, used to stamp forecasts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeIndex {
    pub last: NaiveDateTime,
    pub step_seconds: i64,
}

impl TimeIndex {
    pub fn from_frame(frame: &TimeFrame) -> Result<Self> {
        let last = frame
            .last_timestamp()
            .ok_or_else(|| ForecastError::insufficient(2, 0, "time index"))?;
        let step = frame
            .modal_interval()
            .ok_or_else(|| ForecastError::insufficient(2, frame.len(), "sampling interval"))?;
        Ok(Self {
            last,
            step_seconds: step.num_seconds(),
        })
    }

    pub fn step(&self) -> Duration {
        Duration::seconds(self.step_seconds)
    }

    pub fn future(&self, horizon: usize) -> Vec<NaiveDateTime> {
        future_timestamps(self.last, self.step(), horizon)
    }
}

/// Deserialize a checkpointed state, naming the kind on failure
pub(crate) fn decode_state<T: serde::de::DeserializeOwned>(
    kind: &str,
    state: serde_json::Value,
) -> Result<T> {
    serde_json::from_value(state).map_err(|e| {
        ForecastError::Serialization(format!("invalid {} checkpoint: {}", kind, e))
    })
}

/// Check that a future covariate frame has the expected shape
pub(crate) fn check_future<'a>(
    future: Option<&'a TimeFrame>,
    horizon: usize,
    columns: &[String],
) -> Result<&'a TimeFrame> {
    let future = future.ok_or_else(|| ForecastError::insufficient(horizon, 0, "future covariates"))?;
    if future.len() != horizon {
        return Err(ForecastError::insufficient(
            horizon,
            future.len(),
            "future covariates",
        ));
    }
    for name in columns {
        if !future.has_column(name) {
            return Err(ForecastError::missing_column(name, "future covariates"));
        }
    }
    Ok(future)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;

    #[test]
    fn test_model_spec_tagged_json() {
        let spec: ModelSpec =
            serde_json::from_str(r#"{"kind": "autoregressive", "order": 3}"#).unwrap();
        assert_eq!(spec.name(), "autoregressive");
        match spec {
            ModelSpec::Autoregressive(c) => assert_eq!(c.order, 3),
            other => panic!("unexpected spec {:?}", other),
        }
    }

    #[test]
    fn test_time_index_future() {
        let frame = TimeFrame::new(hourly(5, 2)).unwrap();
        let index = TimeIndex::from_frame(&frame).unwrap();
        let future = index.future(3);
        assert_eq!(future.len(), 3);
        assert_eq!(future[0] - frame.last_timestamp().unwrap(), Duration::hours(2));
    }

    #[test]
    fn test_check_future_rows() {
        let future = TimeFrame::new(hourly(3, 2))
            .unwrap()
            .with_dense_column("t", vec![0.0; 3])
            .unwrap();
        assert!(check_future(Some(&future), 3, &["t".to_string()]).is_ok());
        assert!(matches!(
            check_future(Some(&future), 4, &[]),
            Err(ForecastError::InsufficientData { .. })
        ));
        assert!(check_future(None, 1, &[]).is_err());
    }
}
