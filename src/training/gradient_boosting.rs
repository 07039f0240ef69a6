//! Gradient boosted trees on lag features

use super::decision_tree::{DecisionTree, TreeConfig};
use super::lag_regression::LagHistory;
use super::{decode_state, Forecaster};
use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{LagWindow, TimeFrame};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row subsample ratio for each tree
    pub subsample: f64,
    /// Column subsample ratio for each tree
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_samples_leaf: 5,
            subsample: 1.0,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

impl BoostingParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::Config("n_estimators must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ForecastError::Config("learning_rate must be positive".to_string()));
        }
        for (name, ratio) in [("subsample", self.subsample), ("colsample_bytree", self.colsample_bytree)] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ForecastError::Config(format!("{} must be in (0, 1]", name)));
            }
        }
        Ok(())
    }
}

/// Gradient boosting regressor with squared loss
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    params: BoostingParams,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    n_features: usize,
}

impl GradientBoostingRegressor {
    pub fn new(params: BoostingParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Fit from scratch
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.trees.clear();
        self.col_indices_per_tree.clear();
        self.n_features = x.ncols();
        self.initial_prediction = y.mean().unwrap_or(0.0);
        self.boost(x, y, self.params.n_estimators, self.params.random_state)
    }

    /// Add `rounds` trees on top of the existing ensemble
    pub fn continue_fit(&mut self, x: &Array2<f64>, y: &Array1<f64>, rounds: usize) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(ForecastError::Training(format!(
                "cannot continue boosting: ensemble has {} features, data has {}",
                self.n_features,
                x.ncols()
            )));
        }
        let seed = self.params.random_state.wrapping_add(self.trees.len() as u64);
        self.boost(x, y, rounds, seed)
    }

    fn boost(&mut self, x: &Array2<f64>, y: &Array1<f64>, rounds: usize, seed: u64) -> Result<()> {
        let n_samples = x.nrows();
        let mut predictions = self.predict(x)?;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let tree_config = TreeConfig {
            max_depth: self.params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: self.params.min_samples_leaf,
        };

        for _ in 0..rounds {
            let residuals: Array1<f64> = y
                .iter()
                .zip(predictions.iter())
                .map(|(yi, pi)| yi - pi)
                .collect();

            let rows = sample_indices(n_samples, self.params.subsample, &mut rng);
            let cols = sample_indices(self.n_features, self.params.colsample_bytree, &mut rng);

            let x_sub = x.select(Axis(0), &rows).select(Axis(1), &cols);
            let r_sub = residuals.select(Axis(0), &rows);

            let mut tree = DecisionTree::new(tree_config);
            tree.fit(&x_sub, &r_sub)?;

            let update = tree.predict(&x.select(Axis(1), &cols))?;
            predictions.scaled_add(self.params.learning_rate, &update);

            self.trees.push(tree);
            self.col_indices_per_tree.push(cols);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let tree_pred = tree.predict(&x.select(Axis(1), cols))?;
            predictions.scaled_add(self.params.learning_rate, &tree_pred);
        }
        Ok(predictions)
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64> {
        let mut value = self.initial_prediction;
        for (tree, cols) in self.trees.iter().zip(&self.col_indices_per_tree) {
            let sub = row.select(Axis(0), cols);
            value += self.params.learning_rate * tree.predict_row(sub.view())?;
        }
        Ok(value)
    }
}

fn sample_indices(n: usize, ratio: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let size = ((n as f64) * ratio).ceil() as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    if size < n {
        indices.shuffle(rng);
        indices.truncate(size.max(1));
        indices.sort_unstable();
    }
    indices
}

/// Configuration for [`GradientBoostedForecaster`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostConfig {
    pub target_lags: usize,
    pub covariate_lags: usize,
    pub boosting: BoostingParams,
    /// Extra rounds added on top of a warm-start checkpoint
    pub warm_start_rounds: usize,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            target_lags: 0,
            covariate_lags: 12,
            boosting: BoostingParams::default(),
            warm_start_rounds: 50,
        }
    }
}

impl BoostConfig {
    pub fn with_lags(mut self, target_lags: usize, covariate_lags: usize) -> Self {
        self.target_lags = target_lags;
        self.covariate_lags = covariate_lags;
        self
    }

    pub fn with_boosting(mut self, boosting: BoostingParams) -> Self {
        self.boosting = boosting;
        self
    }

    pub fn window(&self) -> LagWindow {
        LagWindow::new(self.target_lags, self.covariate_lags)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_lags == 0 && self.covariate_lags == 0 {
            return Err(ForecastError::Config(
                "boosted model needs target_lags or covariate_lags".to_string(),
            ));
        }
        self.boosting.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedState {
    pub ensemble: GradientBoostingRegressor,
    pub history: LagHistory,
}

/// Lag-feature forecaster backed by [`GradientBoostingRegressor`]
#[derive(Debug, Clone)]
pub struct GradientBoostedForecaster {
    config: BoostConfig,
    state: Option<BoostedState>,
    prior: Option<BoostedState>,
}

impl GradientBoostedForecaster {
    pub fn new(config: BoostConfig) -> Self {
        Self {
            config,
            state: None,
            prior: None,
        }
    }

    pub fn state(&self) -> Option<&BoostedState> {
        self.state.as_ref()
    }
}

impl Forecaster for GradientBoostedForecaster {
    fn kind(&self) -> &'static str {
        "gradient_boosted"
    }

    fn fit(&mut self, train: &TimeFrame, covariates: &[String]) -> Result<()> {
        let (x, target, history) = LagHistory::build(self.config.window(), train, covariates)?;

        let ensemble = match self.prior.take() {
            Some(prior)
                if prior.ensemble.n_features() == x.ncols()
                    && prior.history.covariates == history.covariates =>
            {
                let mut ensemble = prior.ensemble;
                let before = ensemble.n_trees();
                ensemble.continue_fit(&x, &target, self.config.warm_start_rounds)?;
                debug!(before, after = ensemble.n_trees(), "Continued boosting from checkpoint");
                ensemble
            }
            other => {
                if other.is_some() {
                    warn!("Boosted checkpoint does not match the feature layout; fitting from scratch");
                }
                let mut ensemble = GradientBoostingRegressor::new(self.config.boosting.clone());
                ensemble.fit(&x, &target)?;
                debug!(trees = ensemble.n_trees(), rows = x.nrows(), "Fitted boosted trees");
                ensemble
            }
        };

        self.state = Some(BoostedState { ensemble, history });
        Ok(())
    }

    fn predict(&self, horizon: usize, future: Option<&TimeFrame>) -> Result<ForecastFrame> {
        let state = self.state.as_ref().ok_or(ForecastError::ModelNotFitted)?;
        state.history.forecast(horizon, future, |row| {
            state.ensemble.predict_row(ArrayView1::from(row))
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
