//! Additive trend + seasonality forecaster
//!
//! `y(t) = g(t) + s(t) + beta_r . r(t)` (additive mode) or
//! `y(t) = g(t) * (1 + s(t) + beta_r . r(t))` (multiplicative mode) where
//!
//! - `g` is a piecewise-linear trend `m + k t + sum_j delta_j (t - s_j)+` with
//!   changepoints `s_j` spread over the first part of the history
//! - `s` is a sum of Fourier series for yearly, weekly and daily cycles
//! - `r` are externally supplied regressors, standardized at fit time
//!
//! Coefficients are MAP estimates under Gaussian priors, which reduces every fit to
//! a ridge system. Prior scales follow the usual conventions: a small
//! `changepoint_prior_scale` gives a stiff trend, a small
//! `seasonality_prior_scale` damps the seasonal terms.

use super::linalg::ridge_solve;
use super::{check_future, decode_state, Forecaster, TimeIndex};
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{TimeFrame, Y};
use chrono::NaiveDateTime;
use ndarray::{concatenate, s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::f64::consts::PI;
use tracing::{debug, warn};

const YEARLY: (f64, usize) = (365.25, 10);
const WEEKLY: (f64, usize) = (7.0, 3);
const DAILY: (f64, usize) = (1.0, 4);

/// Prior scale of the base slope and offset
const TREND_PRIOR_SCALE: f64 = 5.0;
/// Noise scale assumed for the first of the two fitting passes (scaled units)
const INITIAL_NOISE_SCALE: f64 = 0.05;
const MIN_TREND: f64 = 1e-8;
/// Floor on the residual variance used to weigh the priors (scaled units)
const MIN_NOISE_VAR: f64 = 1e-4;

/// How seasonal and regressor terms combine with the trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

impl std::fmt::Display for SeasonalityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeasonalityMode::Additive => f.write_str("additive"),
            SeasonalityMode::Multiplicative => f.write_str("multiplicative"),
        }
    }
}

/// Configuration for [`AdditiveModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveConfig {
    pub seasonality_mode: SeasonalityMode,
    /// Flexibility of the trend
    pub changepoint_prior_scale: f64,
    /// Strength of the seasonal terms
    pub seasonality_prior_scale: f64,
    pub regressor_prior_scale: f64,
    /// Number of potential trend changepoints
    pub n_changepoints: usize,
    /// Share of the history in which changepoints are placed
    pub changepoint_range: f64,
    pub yearly_seasonality: bool,
    pub weekly_seasonality: bool,
    pub daily_seasonality: bool,
    /// Coverage of the prediction interval
    pub interval_width: f64,
    /// Registered external regressors; other covariates are ignored
    pub regressors: Vec<String>,
    /// Multiplier on the prior pulling coefficients toward a warm-start checkpoint
    pub warm_start_penalty: f64,
}

impl Default for AdditiveConfig {
    fn default() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Additive,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            regressor_prior_scale: 10.0,
            n_changepoints: 25,
            changepoint_range: 0.8,
            yearly_seasonality: true,
            weekly_seasonality: true,
            daily_seasonality: true,
            interval_width: 0.95,
            regressors: Vec::new(),
            warm_start_penalty: 1.0,
        }
    }
}

impl AdditiveConfig {
    /// Register an external regressor
    pub fn add_regressor(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.regressors.contains(&name) {
            self.regressors.push(name);
        }
        self
    }

    pub fn with_seasonality_mode(mut self, mode: SeasonalityMode) -> Self {
        self.seasonality_mode = mode;
        self
    }

    pub fn with_changepoint_prior_scale(mut self, scale: f64) -> Self {
        self.changepoint_prior_scale = scale;
        self
    }

    pub fn with_seasonality_prior_scale(mut self, scale: f64) -> Self {
        self.seasonality_prior_scale = scale;
        self
    }

    pub fn with_seasonalities(mut self, yearly: bool, weekly: bool, daily: bool) -> Self {
        self.yearly_seasonality = yearly;
        self.weekly_seasonality = weekly;
        self.daily_seasonality = daily;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let scales = [
            ("changepoint_prior_scale", self.changepoint_prior_scale),
            ("seasonality_prior_scale", self.seasonality_prior_scale),
            ("regressor_prior_scale", self.regressor_prior_scale),
        ];
        for (name, value) in scales {
            if !(value > 0.0) {
                return Err(ForecastError::Config(format!("{} must be positive", name)));
            }
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::Config("changepoint_range must be in (0, 1]".to_string()));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::Config("interval_width must be in (0, 1)".to_string()));
        }
        if self.warm_start_penalty < 0.0 {
            return Err(ForecastError::Config(
                "warm_start_penalty must be non-negative".to_string(),
            ));
        }
        Ok(())
    }

    fn seasonalities(&self) -> Vec<(f64, usize)> {
        let mut out = Vec::new();
        if self.yearly_seasonality {
            out.push(YEARLY);
        }
        if self.weekly_seasonality {
            out.push(WEEKLY);
        }
        if self.daily_seasonality {
            out.push(DAILY);
        }
        out
    }
}

/// Fitted coefficients in scaled units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveParams {
    /// Base growth rate
    pub k: f64,
    /// Offset
    pub m: f64,
    /// Rate adjustments at the changepoints
    pub delta: Vec<f64>,
    /// Seasonal coefficients followed by regressor coefficients
    pub beta: Vec<f64>,
    /// Residual noise scale
    pub sigma_obs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressorScaling {
    pub name: String,
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdditiveState {
    pub params: AdditiveParams,
    pub mode: SeasonalityMode,
    pub start: NaiveDateTime,
    pub t_scale_seconds: f64,
    pub y_scale: f64,
    /// Changepoint locations in scaled time
    pub changepoints: Vec<f64>,
    /// (period in days, Fourier order)
    pub seasonalities: Vec<(f64, usize)>,
    pub regressors: Vec<RegressorScaling>,
    pub history_ds: Vec<NaiveDateTime>,
    /// Raw regressor values over `history_ds`, one vector per regressor
    pub history_regressors: Vec<Vec<f64>>,
    pub interval_width: f64,
    pub index: TimeIndex,
}

impl AdditiveState {
    fn scaled_time(&self, ds: NaiveDateTime) -> f64 {
        (ds - self.start).num_seconds() as f64 / self.t_scale_seconds
    }

    fn trend(&self, t: f64) -> f64 {
        let p = &self.params;
        let mut value = p.m + p.k * t;
        for (delta, s) in p.delta.iter().zip(&self.changepoints) {
            if t > *s {
                value += delta * (t - s);
            }
        }
        value
    }

    /// Seasonal + regressor component for one row, in scaled units
    fn components(&self, ds: NaiveDateTime, regressors: &[f64]) -> f64 {
        let standardized: Vec<f64> = regressors
            .iter()
            .zip(&self.regressors)
            .map(|(v, s)| (v - s.mean) / s.std)
            .collect();
        feature_row(ds, &self.seasonalities, &standardized)
            .iter()
            .zip(&self.params.beta)
            .map(|(x, b)| x * b)
            .sum()
    }

    fn predict_row(&self, ds: NaiveDateTime, regressors: &[f64]) -> f64 {
        let trend = self.trend(self.scaled_time(ds));
        let extra = self.components(ds, regressors);
        let scaled = match self.mode {
            SeasonalityMode::Additive => trend + extra,
            SeasonalityMode::Multiplicative => trend * (1.0 + extra),
        };
        scaled * self.y_scale
    }
}

fn days_since_epoch(ds: NaiveDateTime) -> f64 {
    ds.and_utc().timestamp() as f64 / 86_400.0
}

/// Fourier terms of every seasonality followed by the (standardized) regressors
fn feature_row(ds: NaiveDateTime, seasonalities: &[(f64, usize)], regressors: &[f64]) -> Vec<f64> {
    let days = days_since_epoch(ds);
    let mut row = Vec::new();
    for &(period, order) in seasonalities {
        for n in 1..=order {
            let angle = 2.0 * PI * n as f64 * days / period;
            row.push(angle.sin());
            row.push(angle.cos());
        }
    }
    row.extend_from_slice(regressors);
    row
}

fn trend_row(t: f64, changepoints: &[f64]) -> Vec<f64> {
    let mut row = Vec::with_capacity(2 + changepoints.len());
    row.push(1.0);
    row.push(t);
    for s in changepoints {
        row.push((t - s).max(0.0));
    }
    row
}

/// Changepoints at evenly spaced positions of the first `range` share of the rows
fn place_changepoints(t: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let hist_size = (t.len() as f64 * range).floor() as usize;
    if hist_size < 2 {
        return Vec::new();
    }
    let n = requested.min(hist_size - 1);
    if n == 0 {
        return Vec::new();
    }
    (1..=n)
        .map(|i| {
            let pos = (i as f64 * (hist_size - 1) as f64 / n as f64).round() as usize;
            t[pos]
        })
        .collect()
}

fn rows_to_array(rows: &[Vec<f64>], ncols: usize) -> Array2<f64> {
    let mut out = Array2::zeros((rows.len(), ncols));
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            out[[i, j]] = *v;
        }
    }
    out
}

struct Design {
    trend: Array2<f64>,
    features: Array2<f64>,
    /// Penalty per unit noise variance
    trend_prior: Array1<f64>,
    feature_prior: Array1<f64>,
}

#[derive(Debug, Clone)]
pub struct AdditiveModel {
    config: AdditiveConfig,
    state: Option<AdditiveState>,
    prior: Option<AdditiveParams>,
}

impl AdditiveModel {
    pub fn new(config: AdditiveConfig) -> Self {
        Self {
            config,
            state: None,
            prior: None,
        }
    }

    pub fn config(&self) -> &AdditiveConfig {
        &self.config
    }

    pub fn state(&self) -> Option<&AdditiveState> {
        self.state.as_ref()
    }

    /// Prior center for the current design, when a warm-start checkpoint fits it
    fn prior_center(&self, n_delta: usize, n_beta: usize) -> Option<(Array1<f64>, Array1<f64>)> {
        let prior = self.prior.as_ref()?;
        if prior.delta.len() != n_delta || prior.beta.len() != n_beta {
            warn!("Additive checkpoint does not match the model layout; fitting from scratch");
            return None;
        }
        let mut trend = vec![prior.m, prior.k];
        trend.extend_from_slice(&prior.delta);
        Some((Array1::from(trend), Array1::from(prior.beta.clone())))
    }

    /// One MAP pass for a given noise variance; returns trend coefficients, feature
    /// coefficients and the fitted values
    fn solve(
        &self,
        design: &Design,
        y: &Array1<f64>,
        noise_var: f64,
        center: Option<&(Array1<f64>, Array1<f64>)>,
    ) -> Result<(Array1<f64>, Array1<f64>, Array1<f64>)> {
        let warm = if center.is_some() { self.config.warm_start_penalty } else { 0.0 };
        let trend_penalty = design.trend_prior.mapv(|p| (p + warm) * noise_var);
        let feature_penalty = design.feature_prior.mapv(|p| (p + warm) * noise_var);

        match self.config.seasonality_mode {
            SeasonalityMode::Additive => {
                let x = concatenate(Axis(1), &[design.trend.view(), design.features.view()])
                    .map_err(|e| ForecastError::Training(format!("design matrix: {}", e)))?;
                let penalty = chain(&trend_penalty, &feature_penalty);
                let center = center.map(|(t, f)| chain(t, f));
                let theta = ridge_solve(&x, y, &penalty, center.as_ref())?;
                let fitted = x.dot(&theta);
                let split = design.trend.ncols();
                let trend_theta = theta.slice(s![..split]).to_owned();
                let beta = theta.slice(s![split..]).to_owned();
                Ok((trend_theta, beta, fitted))
            }
            SeasonalityMode::Multiplicative => {
                let trend_theta =
                    ridge_solve(&design.trend, y, &trend_penalty, center.map(|(t, _)| t))?;
                let trend_fit = design.trend.dot(&trend_theta);
                if design.features.ncols() == 0 {
                    return Ok((trend_theta, Array1::zeros(0), trend_fit));
                }
                let guarded = trend_fit.mapv(|g| {
                    if g.abs() < MIN_TREND {
                        MIN_TREND.copysign(g)
                    } else {
                        g
                    }
                });
                // y - g = (g * X) beta
                let weighted = &design.features * &guarded.view().insert_axis(Axis(1));
                let beta = ridge_solve(
                    &weighted,
                    &(y - &guarded),
                    &feature_penalty,
                    center.map(|(_, f)| f),
                )?;
                let fitted = &guarded * &(design.features.dot(&beta) + 1.0);
                Ok((trend_theta, beta, fitted))
            }
        }
    }
}

fn chain(a: &Array1<f64>, b: &Array1<f64>) -> Array1<f64> {
    a.iter().chain(b.iter()).copied().collect()
}

impl Forecaster for AdditiveModel {
    fn kind(&self) -> &'static str {
        "additive"
    }

    fn fit(&mut self, train: &TimeFrame, _covariates: &[String]) -> Result<()> {
        for name in &self.config.regressors {
            if !train.has_column(name) {
                return Err(ForecastError::missing_column(name, "additive model training data"));
            }
        }

        let ds_all = train.timestamps();
        let y_all = train.column(Y)?;
        let rows: Vec<usize> = (0..ds_all.len()).filter(|&i| y_all[i].is_some()).collect();
        if rows.len() < 2 {
            return Err(ForecastError::insufficient(2, rows.len(), "additive model fit"));
        }

        let start = ds_all[0];
        let end = ds_all[ds_all.len() - 1];
        let t_scale_seconds = (end - start).num_seconds() as f64;
        if t_scale_seconds <= 0.0 {
            return Err(ForecastError::insufficient(2, 1, "additive model time span"));
        }

        let y_raw: Vec<f64> = rows.iter().filter_map(|&i| y_all[i]).collect();
        let y_scale = y_raw.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };
        let y = Array1::from_iter(y_raw.iter().map(|v| v / y_scale));

        let mut history_regressors = Vec::with_capacity(self.config.regressors.len());
        let mut scalings = Vec::with_capacity(self.config.regressors.len());
        for name in &self.config.regressors {
            let values = train.dense_column(name)?;
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = if var > 0.0 { var.sqrt() } else { 1.0 };
            scalings.push(RegressorScaling {
                name: name.clone(),
                mean,
                std,
            });
            history_regressors.push(values);
        }

        let t: Vec<f64> = rows
            .iter()
            .map(|&i| (ds_all[i] - start).num_seconds() as f64 / t_scale_seconds)
            .collect();
        let changepoints = place_changepoints(&t, self.config.n_changepoints, self.config.changepoint_range);
        let seasonalities = self.config.seasonalities();

        let trend_rows: Vec<Vec<f64>> = t.iter().map(|&ti| trend_row(ti, &changepoints)).collect();
        let feature_rows: Vec<Vec<f64>> = rows
            .iter()
            .map(|&i| {
                let standardized: Vec<f64> = history_regressors
                    .iter()
                    .zip(&scalings)
                    .map(|(values, s)| (values[i] - s.mean) / s.std)
                    .collect();
                feature_row(ds_all[i], &seasonalities, &standardized)
            })
            .collect();

        let n_seasonal: usize = seasonalities.iter().map(|(_, order)| 2 * order).sum();
        let n_features = n_seasonal + scalings.len();

        let mut trend_prior = vec![1.0 / TREND_PRIOR_SCALE.powi(2); 2];
        trend_prior.extend(
            std::iter::repeat(1.0 / self.config.changepoint_prior_scale.powi(2)).take(changepoints.len()),
        );
        let mut feature_prior =
            vec![1.0 / self.config.seasonality_prior_scale.powi(2); n_seasonal];
        feature_prior.extend(
            std::iter::repeat(1.0 / self.config.regressor_prior_scale.powi(2)).take(scalings.len()),
        );

        let design = Design {
            trend: rows_to_array(&trend_rows, 2 + changepoints.len()),
            features: rows_to_array(&feature_rows, n_features),
            trend_prior: Array1::from(trend_prior),
            feature_prior: Array1::from(feature_prior),
        };

        let center = self.prior_center(changepoints.len(), n_features);

        // the prior strength depends on the noise level, so refit once with the
        // residual variance of a first pass
        let (_, _, first_fit) =
            self.solve(&design, &y, INITIAL_NOISE_SCALE.powi(2), center.as_ref())?;
        let noise_var = residual_variance(&y, &first_fit).max(MIN_NOISE_VAR);
        let (trend_theta, beta, fitted) = self.solve(&design, &y, noise_var, center.as_ref())?;
        let sigma_obs = residual_variance(&y, &fitted).sqrt();

        debug!(
            changepoints = changepoints.len(),
            features = n_features,
            sigma_obs,
            mode = %self.config.seasonality_mode,
            "Fitted additive model"
        );

        self.state = Some(AdditiveState {
            params: AdditiveParams {
                m: trend_theta[0],
                k: trend_theta[1],
                delta: trend_theta.iter().skip(2).copied().collect(),
                beta: beta.to_vec(),
                sigma_obs,
            },
            mode: self.config.seasonality_mode,
            start,
            t_scale_seconds,
            y_scale,
            changepoints,
            seasonalities,
            regressors: scalings,
            history_ds: ds_all.to_vec(),
            history_regressors,
            interval_width: self.config.interval_width,
            index: TimeIndex::from_frame(train)?,
        });
        Ok(())
    }

    /// Forecast over the training history followed by `horizon` future steps
    fn predict(&self, horizon: usize, future: Option<&TimeFrame>) -> Result<ForecastFrame> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        let names: Vec<String> = state.regressors.iter().map(|r| r.name.clone()).collect();

        let future_values: Vec<Vec<f64>> = if names.is_empty() {
            Vec::new()
        } else {
            let future = check_future(future, horizon, &names)?;
            names
                .iter()
                .map(|n| future.dense_column(n))
                .collect::<Result<_>>()?
        };

        let future_ds = state.index.future(horizon);
        let n_hist = state.history_ds.len();
        let mut ds = state.history_ds.clone();
        ds.extend_from_slice(&future_ds);

        let mut yhat = Vec::with_capacity(ds.len());
        let mut regressor_row = vec![0.0; names.len()];
        for (i, &stamp) in ds.iter().enumerate() {
            for (r, slot) in regressor_row.iter_mut().enumerate() {
                *slot = if i < n_hist {
                    state.history_regressors[r][i]
                } else {
                    future_values[r][i - n_hist]
                };
            }
            yhat.push(state.predict_row(stamp, &regressor_row));
        }

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::Training(format!("normal distribution: {}", e)))?;
        let z = normal.inverse_cdf(0.5 + state.interval_width / 2.0);
        let half_width = z * state.params.sigma_obs * state.y_scale;
        let lower = yhat.iter().map(|v| v - half_width).collect();
        let upper = yhat.iter().map(|v| v + half_width).collect();

        ForecastFrame::new(ds, yhat)?.with_interval(lower, upper)
    }

    fn checkpoint(&self) -> Result<serde_json::Value> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        Ok(serde_json::to_value(state)?)
    }

    /// Only the fitted parameters (`k`, `m`, `delta`, `beta`, `sigma_obs`) seed the next fit
    fn warm_start(&mut self, state: serde_json::Value) -> Result<()> {
        let state: AdditiveState = decode_state(self.kind(), state)?;
        self.prior = Some(state.params);
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }
}

fn residual_variance(y: &Array1<f64>, fitted: &Array1<f64>) -> f64 {
    let n = y.len().max(1) as f64;
    y.iter()
        .zip(fitted.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / n
}
