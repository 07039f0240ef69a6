//! Missing value imputation
//!
//! Scalar (column-independent) imputation in the style of a simple imputer:
//! - Mean
//! - Median
//! - Most frequent value
//! - Constant

mod simple;

pub use simple::SimpleImputer;

use crate::error::ForecastError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strategy for scalar imputation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Mean of the observed values
    Mean,
    /// Median of the observed values
    Median,
    /// Most frequent observed value (smallest value on ties)
    MostFrequent,
    /// Constant fill value
    Constant(f64),
}

impl Default for ImputeStrategy {
    fn default() -> Self {
        ImputeStrategy::Mean
    }
}

impl ImputeStrategy {
    /// Replace the fill value of a `Constant` strategy; other strategies are unchanged
    pub fn with_fill_value(self, value: f64) -> Self {
        match self {
            ImputeStrategy::Constant(_) => ImputeStrategy::Constant(value),
            other => other,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImputeStrategy::Mean => "mean",
            ImputeStrategy::Median => "median",
            ImputeStrategy::MostFrequent => "most_frequent",
            ImputeStrategy::Constant(_) => "constant",
        }
    }
}

impl fmt::Display for ImputeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputeStrategy::Constant(v) => write!(f, "constant({})", v),
            other => f.write_str(other.name()),
        }
    }
}

impl FromStr for ImputeStrategy {
    type Err = ForecastError;

    /// Parse a strategy name; `constant` fills with 0.0 unless a value is attached
    /// with `constant:<value>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "mean" => Ok(ImputeStrategy::Mean),
            "median" => Ok(ImputeStrategy::Median),
            "most_frequent" | "mode" => Ok(ImputeStrategy::MostFrequent),
            "constant" => Ok(ImputeStrategy::Constant(0.0)),
            other => match other.strip_prefix("constant:") {
                Some(value) => value
                    .trim()
                    .parse::<f64>()
                    .map(ImputeStrategy::Constant)
                    .map_err(|_| {
                        ForecastError::Config(format!("invalid constant fill value '{}'", value))
                    }),
                None => Err(ForecastError::Config(format!(
                    "unsupported impute strategy '{}' (expected mean, median, most_frequent or constant)",
                    s
                ))),
            },
        }
    }
}

/// Count missing entries
#[inline]
pub fn count_missing(values: &[Option<f64>]) -> usize {
    values.iter().filter(|v| v.is_none()).count()
}
