//! Autoregressive forecaster
//!
//! AR(p) with intercept fitted by conditional least squares:
//!
//! `y_t = c + phi_1 y_{t-1} + ... + phi_p y_{t-p} + gamma . x_t`
//!
//! Exogenous covariates are optional. When used, the last observed covariate row is
//! held constant over the forecast horizon, so prediction never needs future
//! covariate values.

use super::linalg::{ridge_solve, with_intercept};
use super::{decode_state, Forecaster, TimeIndex};
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{TimeFrame, Y};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for [`AutoRegressive`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArConfig {
    /// Number of autoregressive lags
    pub order: usize,
    /// Include covariates as exogenous regressors
    pub use_covariates: bool,
    /// Ridge strength pulling coefficients toward a warm-start checkpoint
    pub warm_start_penalty: f64,
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            order: 12,
            use_covariates: false,
            warm_start_penalty: 10.0,
        }
    }
}

impl ArConfig {
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_covariates(mut self, use_covariates: bool) -> Self {
        self.use_covariates = use_covariates;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(ForecastError::Config("AR order must be at least 1".to_string()));
        }
        if self.warm_start_penalty < 0.0 {
            return Err(ForecastError::Config(
                "warm_start_penalty must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fitted AR state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArState {
    /// Intercept, lag coefficients, then covariate coefficients
    pub coefficients: Vec<f64>,
    pub covariates: Vec<String>,
    /// Most recent `order` targets, oldest first
    pub history: Vec<f64>,
    pub last_covariates: Vec<f64>,
    pub index: TimeIndex,
}

#[derive(Debug, Clone)]
pub struct AutoRegressive {
    config: ArConfig,
    state: Option<ArState>,
    prior: Option<ArState>,
}

impl AutoRegressive {
    pub fn new(config: ArConfig) -> Self {
        Self {
            config,
            state: None,
            prior: None,
        }
    }

    pub fn state(&self) -> Option<&ArState> {
        self.state.as_ref()
    }

    fn design(&self, y: &[f64], covariates: &Array2<f64>) -> (Array2<f64>, Array1<f64>) {
        let p = self.config.order;
        let n_cov = covariates.ncols();
        let rows = y.len() - p;
        let mut x = Array2::zeros((rows, p + n_cov));
        let mut target = Array1::zeros(rows);
        for (i, t) in (p..y.len()).enumerate() {
            for lag in 1..=p {
                x[[i, lag - 1]] = y[t - lag];
            }
            for c in 0..n_cov {
                x[[i, p + c]] = covariates[[t, c]];
            }
            target[i] = y[t];
        }
        (with_intercept(&x), target)
    }
}

impl Forecaster for AutoRegressive {
    fn kind(&self) -> &'static str {
        "autoregressive"
    }

    fn fit(&mut self, train: &TimeFrame, covariates: &[String]) -> Result<()> {
        let p = self.config.order;
        let y = train.dense_column(Y)?;
        let used: Vec<String> = if self.config.use_covariates {
            covariates.to_vec()
        } else {
            Vec::new()
        };
        let n_params = 1 + p + used.len();
        if y.len() < p + n_params {
            return Err(ForecastError::insufficient(
                p + n_params,
                y.len(),
                format!("AR({}) fit", p),
            ));
        }

        let cov = train.to_array(&used)?;
        let (x, target) = self.design(&y, &cov);

        let mut penalty = Array1::zeros(n_params);
        let center = match &self.prior {
            Some(prior) if prior.coefficients.len() == n_params && prior.covariates == used => {
                penalty.fill(self.config.warm_start_penalty);
                penalty[0] = 0.0;
                debug!(penalty = self.config.warm_start_penalty, "Warm-starting AR fit");
                Some(Array1::from(prior.coefficients.clone()))
            }
            Some(_) => {
                warn!("AR checkpoint shape does not match the configured model; fitting from scratch");
                None
            }
            None => None,
        };

        let beta = ridge_solve(&x, &target, &penalty, center.as_ref())?;

        let last_covariates = if used.is_empty() {
            Vec::new()
        } else {
            cov.row(cov.nrows() - 1).to_vec()
        };

        self.state = Some(ArState {
            coefficients: beta.to_vec(),
            covariates: used,
            history: y[y.len() - p..].to_vec(),
            last_covariates,
            index: TimeIndex::from_frame(train)?,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize, _future: Option<&TimeFrame>) -> Result<ForecastFrame> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        let p = self.config.order;
        let beta = &state.coefficients;

        let mut window = state.history.clone();
        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let n = window.len();
            let mut value = beta[0];
            for lag in 1..=p {
                value += beta[lag] * window[n - lag];
            }
            for (c, x) in state.last_covariates.iter().enumerate() {
                value += beta[1 + p + c] * x;
            }
            out.push(value);
            window.push(value);
        }

        ForecastFrame::new(state.index.future(horizon), out)
    }

    fn checkpoint(&self) -> Result<serde_json::Value> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        Ok(serde_json::to_value(state)?)
    }

    fn warm_start(&mut self, state: serde_json::Value) -> Result<()> {
        self.prior = Some(decode_state(self.kind(), state)?);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;

    fn ar1_series(n: usize) -> TimeFrame {
        // y_t = 1 + 0.5 y_{t-1}, converging to 2
        let mut y = vec![0.0];
        for _ in 1..n {
            let prev = *y.last().unwrap();
            y.push(1.0 + 0.5 * prev);
        }
        TimeFrame::new(hourly(n, 2))
            .unwrap()
            .with_dense_column(Y, y)
            .unwrap()
    }

    #[test]
    fn test_recovers_ar1() {
        let mut model = AutoRegressive::new(ArConfig::default().with_order(1));
        model.fit(&ar1_series(30), &[]).unwrap();
        let beta = &model.state().unwrap().coefficients;
        assert!((beta[0] - 1.0).abs() < 1e-6);
        assert!((beta[1] - 0.5).abs() < 1e-6);

        let forecast = model.predict(5, None).unwrap();
        assert_eq!(forecast.len(), 5);
        assert!(forecast.y.iter().all(|v| (v - 2.0).abs() < 1e-3));
        assert!(!forecast.has_interval());
    }

    #[test]
    fn test_forecast_timestamps_continue_index() {
        let train = ar1_series(30);
        let mut model = AutoRegressive::new(ArConfig::default().with_order(2));
        model.fit(&train, &[]).unwrap();
        let forecast = model.predict(3, None).unwrap();
        assert!(forecast.ds[0] > train.last_timestamp().unwrap());
    }

    #[test]
    fn test_too_short() {
        let mut model = AutoRegressive::new(ArConfig::default().with_order(12));
        assert!(matches!(
            model.fit(&ar1_series(20), &[]),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_predict_before_fit() {
        let model = AutoRegressive::new(ArConfig::default());
        assert!(matches!(model.predict(1, None), Err(ForecastError::ModelNotFitted)));
    }

    #[test]
    fn test_covariates_held_constant() {
        let n = 40;
        let cov: Vec<f64> = (0..n).map(|i| (i % 7) as f64).collect();
        let y: Vec<f64> = cov.iter().map(|c| 3.0 + 2.0 * c).collect();
        let train = TimeFrame::new(hourly(n, 2))
            .unwrap()
            .with_dense_column(Y, y)
            .unwrap()
            .with_dense_column("temp", cov.clone())
            .unwrap();
        let mut model = AutoRegressive::new(ArConfig::default().with_order(1).with_covariates(true));
        model.fit(&train, &["temp".to_string()]).unwrap();
        let forecast = model.predict(4, None).unwrap();
        let expected = 3.0 + 2.0 * cov[n - 1];
        assert!(forecast.y.iter().all(|v| (v - expected).abs() < 1e-4));
    }

    #[test]
    fn test_warm_start_round_trip() {
        let train = ar1_series(30);
        let mut first = AutoRegressive::new(ArConfig::default().with_order(1));
        first.fit(&train, &[]).unwrap();
        let checkpoint = first.checkpoint().unwrap();

        let mut second = AutoRegressive::new(ArConfig::default().with_order(1));
        second.warm_start(checkpoint).unwrap();
        second.fit(&train, &[]).unwrap();
        let a = &first.state().unwrap().coefficients;
        let b = &second.state().unwrap().coefficients;
        assert!((a[1] - b[1]).abs() < 1e-6);
    }
}
