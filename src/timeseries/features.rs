//! Lag feature construction for regression forecasters

use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Lag window over the target and the covariates.
///
/// The feature row for time `t` holds, per covariate, the `covariate_lags` values
/// ending at `t` (oldest first), followed by the `target_lags` previous targets
/// `y[t-1], y[t-2], ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LagWindow {
    pub target_lags: usize,
    pub covariate_lags: usize,
}

impl Default for LagWindow {
    fn default() -> Self {
        Self {
            target_lags: 0,
            covariate_lags: 12,
        }
    }
}

impl LagWindow {
    pub fn new(target_lags: usize, covariate_lags: usize) -> Self {
        Self {
            target_lags,
            covariate_lags,
        }
    }

    /// First row index with a complete window
    pub fn first_row(&self) -> usize {
        self.covariate_lags.saturating_sub(1).max(self.target_lags)
    }

    pub fn n_features(&self, n_covariates: usize) -> usize {
        n_covariates * self.covariate_lags + self.target_lags
    }

    /// Build the feature row for time `t`.
    ///
    /// `targets` must cover every index below `t` needed by the target lags and
    /// `covariates` every row up to `t`.
    pub fn row(&self, targets: &[f64], covariates: &Array2<f64>, t: usize) -> Vec<f64> {
        let n_cov = covariates.ncols();
        let mut row = Vec::with_capacity(self.n_features(n_cov));
        for c in 0..n_cov {
            for k in (0..self.covariate_lags).rev() {
                row.push(covariates[[t - k, c]]);
            }
        }
        for lag in 1..=self.target_lags {
            row.push(targets[t - lag]);
        }
        row
    }

    /// Training design matrix and targets over every row with a complete window
    pub fn design(&self, y: &[f64], covariates: &Array2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        if covariates.nrows() != y.len() {
            return Err(ForecastError::Alignment(format!(
                "covariates have {} rows, target has {}",
                covariates.nrows(),
                y.len()
            )));
        }
        if self.n_features(covariates.ncols()) == 0 {
            return Err(ForecastError::Config(
                "lag window produces no features".to_string(),
            ));
        }
        let start = self.first_row();
        if y.len() <= start + 1 {
            return Err(ForecastError::insufficient(
                start + 2,
                y.len(),
                "lag feature window",
            ));
        }

        let n_rows = y.len() - start;
        let n_features = self.n_features(covariates.ncols());
        let mut x = Array2::zeros((n_rows, n_features));
        let mut target = Array1::zeros(n_rows);
        for (i, t) in (start..y.len()).enumerate() {
            for (j, v) in self.row(y, covariates, t).into_iter().enumerate() {
                x[[i, j]] = v;
            }
            target[i] = y[t];
        }
        Ok((x, target))
    }
}
