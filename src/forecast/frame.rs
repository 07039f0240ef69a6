//! Normalized forecast output

use crate::error::{ForecastError, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Forecast with canonical `ds`/`y` columns and, for interval-producing models,
/// `y_lower`/`y_upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastFrame {
    pub ds: Vec<NaiveDateTime>,
    pub y: Vec<f64>,
    pub y_lower: Option<Vec<f64>>,
    pub y_upper: Option<Vec<f64>>,
}

impl ForecastFrame {
    pub fn new(ds: Vec<NaiveDateTime>, y: Vec<f64>) -> Result<Self> {
        if ds.len() != y.len() {
            return Err(ForecastError::Validation(format!(
                "forecast has {} timestamps but {} values",
                ds.len(),
                y.len()
            )));
        }
        Ok(Self {
            ds,
            y,
            y_lower: None,
            y_upper: None,
        })
    }

    pub fn with_interval(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != self.y.len() || upper.len() != self.y.len() {
            return Err(ForecastError::Validation(
                "interval bounds must match forecast length".to_string(),
            ));
        }
        self.y_lower = Some(lower);
        self.y_upper = Some(upper);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn has_interval(&self) -> bool {
        self.y_lower.is_some() && self.y_upper.is_some()
    }

    /// Last `n` rows
    pub fn tail(&self, n: usize) -> ForecastFrame {
        let start = self.len().saturating_sub(n);
        ForecastFrame {
            ds: self.ds[start..].to_vec(),
            y: self.y[start..].to_vec(),
            y_lower: self.y_lower.as_ref().map(|v| v[start..].to_vec()),
            y_upper: self.y_upper.as_ref().map(|v| v[start..].to_vec()),
        }
    }
}
