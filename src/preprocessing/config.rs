//! Preprocessing configuration

use crate::error::{ForecastError, Result};
use crate::imputation::ImputeStrategy;
use serde::{Deserialize, Serialize};

/// Configuration for per-sensor preprocessing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Imputation applied to the trimmed series; `None` keeps internal gaps
    pub impute: Option<ImputeStrategy>,

    /// Number of steps to forecast (and hold out when evaluating in-sample)
    pub horizon: usize,

    /// Hold out the last `horizon` points as ground truth
    pub in_sample: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            impute: Some(ImputeStrategy::Mean),
            horizon: 300,
            in_sample: true,
        }
    }
}

impl PreprocessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_impute(mut self, strategy: Option<ImputeStrategy>) -> Self {
        self.impute = strategy;
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_in_sample(mut self, in_sample: bool) -> Self {
        self.in_sample = in_sample;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(ForecastError::Config("horizon must be at least 1".to_string()));
        }
        Ok(())
    }
}
