//! Linear regression on lagged covariates
//!
//! Each target is regressed on a window of covariate values ending at the target
//! time, plus optional previous targets. Forecasting consumes explicit future
//! covariates for every step and feeds its own predictions back into the target
//! lags.

use super::linalg::{ridge_solve, with_intercept};
use super::{check_future, decode_state, Forecaster, TimeIndex};
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{LagWindow, TimeFrame, Y};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Configuration for [`LagRegression`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Number of previous targets used as features
    pub target_lags: usize,
    /// Width of the covariate window ending at the target time
    pub covariate_lags: usize,
    /// L2 penalty on the non-intercept coefficients
    pub ridge: f64,
    /// Ridge strength pulling coefficients toward a warm-start checkpoint
    pub warm_start_penalty: f64,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            target_lags: 0,
            covariate_lags: 12,
            ridge: 0.0,
            warm_start_penalty: 10.0,
        }
    }
}

impl LagConfig {
    pub fn with_target_lags(mut self, lags: usize) -> Self {
        self.target_lags = lags;
        self
    }

    pub fn with_covariate_lags(mut self, lags: usize) -> Self {
        self.covariate_lags = lags;
        self
    }

    pub fn window(&self) -> LagWindow {
        LagWindow::new(self.target_lags, self.covariate_lags)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_lags == 0 && self.covariate_lags == 0 {
            return Err(ForecastError::Config(
                "lag model needs target_lags or covariate_lags".to_string(),
            ));
        }
        if self.ridge < 0.0 || self.warm_start_penalty < 0.0 {
            return Err(ForecastError::Config(
                "ridge and warm_start_penalty must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lag features of a fitted series: the window plus the tails needed to keep
/// building feature rows past the end of training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagHistory {
    pub window: LagWindow,
    pub covariates: Vec<String>,
    pub tail_targets: Vec<f64>,
    /// Row-major covariate tail, same length as `tail_targets`
    pub tail_covariates: Vec<Vec<f64>>,
    pub index: TimeIndex,
}

impl LagHistory {
    /// Design matrix of the training frame and the history to forecast from
    pub fn build(
        window: LagWindow,
        train: &TimeFrame,
        covariates: &[String],
    ) -> Result<(Array2<f64>, Array1<f64>, LagHistory)> {
        if window.target_lags == 0 && covariates.is_empty() {
            return Err(ForecastError::Config(
                "lag model without target lags requires covariates".to_string(),
            ));
        }
        let y = train.dense_column(Y)?;
        let cov = train.to_array(covariates)?;
        let (x, target) = window.design(&y, &cov)?;

        let keep = window.first_row();
        let start = y.len() - keep;
        let history = LagHistory {
            window,
            covariates: covariates.to_vec(),
            tail_targets: y[start..].to_vec(),
            tail_covariates: (start..y.len()).map(|i| cov.row(i).to_vec()).collect(),
            index: TimeIndex::from_frame(train)?,
        };
        Ok((x, target, history))
    }

    /// Recursive forecast; `model` maps a feature row to a prediction
    pub fn forecast<F>(&self, horizon: usize, future: Option<&TimeFrame>, model: F) -> Result<ForecastFrame>
    where
        F: Fn(&[f64]) -> Result<f64>,
    {
        let future = if self.covariates.is_empty() {
            None
        } else {
            Some(check_future(future, horizon, &self.covariates)?)
        };

        let keep = self.tail_targets.len();
        let n_cov = self.covariates.len();
        let mut cov = Array2::zeros((keep + horizon, n_cov));
        for (i, row) in self.tail_covariates.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                cov[[i, c]] = *v;
            }
        }
        if let Some(future) = future {
            let values = future.to_array(&self.covariates)?;
            cov.slice_mut(ndarray::s![keep.., ..]).assign(&values);
        }

        let mut targets = self.tail_targets.clone();
        let mut out = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let row = self.window.row(&targets, &cov, keep + step);
            let value = model(&row)?;
            targets.push(value);
            out.push(value);
        }
        ForecastFrame::new(self.index.future(horizon), out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagRegressionState {
    /// Intercept followed by feature coefficients
    pub coefficients: Vec<f64>,
    pub history: LagHistory,
}

#[derive(Debug, Clone)]
pub struct LagRegression {
    config: LagConfig,
    state: Option<LagRegressionState>,
    prior: Option<LagRegressionState>,
}

impl LagRegression {
    pub fn new(config: LagConfig) -> Self {
        Self {
            config,
            state: None,
            prior: None,
        }
    }

    pub fn state(&self) -> Option<&LagRegressionState> {
        self.state.as_ref()
    }
}

impl Forecaster for LagRegression {
    fn kind(&self) -> &'static str {
        "lag_regression"
    }

    fn fit(&mut self, train: &TimeFrame, covariates: &[String]) -> Result<()> {
        let (x, target, history) = LagHistory::build(self.config.window(), train, covariates)?;
        let x = with_intercept(&x);
        let n_params = x.ncols();

        let mut penalty = Array1::from_elem(n_params, self.config.ridge);
        penalty[0] = 0.0;
        let center = match &self.prior {
            Some(prior)
                if prior.coefficients.len() == n_params
                    && prior.history.covariates == history.covariates =>
            {
                penalty
                    .iter_mut()
                    .skip(1)
                    .for_each(|p| *p += self.config.warm_start_penalty);
                debug!(penalty = self.config.warm_start_penalty, "Warm-starting lag regression");
                Some(Array1::from(prior.coefficients.clone()))
            }
            Some(_) => {
                warn!("Lag regression checkpoint does not match the feature layout; fitting from scratch");
                None
            }
            None => None,
        };

        let beta = ridge_solve(&x, &target, &penalty, center.as_ref())?;
        debug!(features = n_params - 1, rows = x.nrows(), "Fitted lag regression");

        self.state = Some(LagRegressionState {
            coefficients: beta.to_vec(),
            history,
        });
        Ok(())
    }

    fn predict(&self, horizon: usize, future: Option<&TimeFrame>) -> Result<ForecastFrame> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        let beta = &state.coefficients;
        state.history.forecast(horizon, future, |row| {
            Ok(beta[0] + row.iter().zip(&beta[1..]).map(|(x, b)| x * b).sum::<f64>())
        })
    }

    fn needs_future_covariates(&self) -> bool {
        true
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
