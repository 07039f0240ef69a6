//! Hyperparameter grid for the additive model

use super::additive::{AdditiveConfig, SeasonalityMode};
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Candidate values per hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditiveGrid {
    pub changepoint_prior_scale: Vec<f64>,
    pub seasonality_mode: Vec<SeasonalityMode>,
    pub seasonality_prior_scale: Vec<f64>,
}

impl Default for AdditiveGrid {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: vec![0.001, 0.05, 0.1],
            seasonality_mode: vec![SeasonalityMode::Multiplicative, SeasonalityMode::Additive],
            seasonality_prior_scale: vec![0.01, 1.0, 10.0],
        }
    }
}

/// One combination of the grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPoint {
    pub changepoint_prior_scale: f64,
    pub seasonality_mode: SeasonalityMode,
    pub seasonality_prior_scale: f64,
}

impl GridPoint {
    /// Copy of `base` with this point's hyperparameters
    pub fn apply(&self, base: &AdditiveConfig) -> AdditiveConfig {
        base.clone()
            .with_changepoint_prior_scale(self.changepoint_prior_scale)
            .with_seasonality_mode(self.seasonality_mode)
            .with_seasonality_prior_scale(self.seasonality_prior_scale)
    }
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "changepoint_prior_scale={}, seasonality_mode={}, seasonality_prior_scale={}",
            self.changepoint_prior_scale, self.seasonality_mode, self.seasonality_prior_scale
        )
    }
}

impl AdditiveGrid {
    pub fn validate(&self) -> Result<()> {
        if self.changepoint_prior_scale.is_empty()
            || self.seasonality_mode.is_empty()
            || self.seasonality_prior_scale.is_empty()
        {
            return Err(ForecastError::Config(
                "every grid dimension needs at least one value".to_string(),
            ));
        }
        Ok(())
    }

    /// All combinations in key order (changepoint_prior_scale, seasonality_mode,
    /// seasonality_prior_scale), the last key varying fastest
    pub fn points(&self) -> Vec<GridPoint> {
        let mut points = Vec::with_capacity(self.len());
        for &cps in &self.changepoint_prior_scale {
            for &mode in &self.seasonality_mode {
                for &sps in &self.seasonality_prior_scale {
                    points.push(GridPoint {
                        changepoint_prior_scale: cps,
                        seasonality_mode: mode,
                        seasonality_prior_scale: sps,
                    });
                }
            }
        }
        points
    }

    pub fn len(&self) -> usize {
        self.changepoint_prior_scale.len() * self.seasonality_mode.len() * self.seasonality_prior_scale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index of the lowest score; ties go to the earliest point. NaN scores never win.
pub fn best_index(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        if best.map_or(true, |(_, b)| score < b) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_order() {
        let points = AdditiveGrid::default().points();
        assert_eq!(points.len(), 18);
        assert_eq!(points[0].changepoint_prior_scale, 0.001);
        assert_eq!(points[0].seasonality_mode, SeasonalityMode::Multiplicative);
        assert_eq!(points[0].seasonality_prior_scale, 0.01);
        assert_eq!(points[1].seasonality_prior_scale, 1.0);
        assert_eq!(points[3].seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(points[6].changepoint_prior_scale, 0.05);
    }

    #[test]
    fn test_best_index_ties_first() {
        assert_eq!(best_index(&[3.0, 1.0, 1.0, 2.0]), Some(1));
        assert_eq!(best_index(&[f64::NAN, 2.0]), Some(1));
        assert_eq!(best_index(&[]), None);
    }

    #[test]
    fn test_apply_point() {
        let point = AdditiveGrid::default().points()[4];
        let config = point.apply(&AdditiveConfig::default());
        assert_eq!(config.seasonality_mode, SeasonalityMode::Additive);
        assert_eq!(config.seasonality_prior_scale, 1.0);
        assert_eq!(config.changepoint_prior_scale, 0.001);
    }

    #[test]
    fn test_empty_dimension_rejected() {
        let grid = AdditiveGrid {
            seasonality_mode: Vec::new(),
            ..AdditiveGrid::default()
        };
        assert!(grid.validate().is_err());
    }
}
