//! Simple scalar imputer

use super::ImputeStrategy;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Fits one fill value on the observed entries of a column and fills the gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleImputer {
    strategy: ImputeStrategy,
    fill_value: Option<f64>,
}

impl SimpleImputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_value: None,
        }
    }

    pub fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    /// Fitted fill value, if any
    pub fn fill_value(&self) -> Option<f64> {
        self.fill_value
    }

    /// Compute the fill value from the observed entries
    pub fn fit(&mut self, values: &[Option<f64>]) -> Result<&mut Self> {
        let mut observed: Vec<f64> = values.iter().flatten().copied().collect();

        let fill = match self.strategy {
            ImputeStrategy::Constant(v) => v,
            _ if observed.is_empty() => {
                return Err(ForecastError::insufficient(
                    1,
                    0,
                    format!("{} imputation (no observed values)", self.strategy.name()),
                ));
            }
            ImputeStrategy::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
            ImputeStrategy::Median => {
                observed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                let mid = observed.len() / 2;
                if observed.len() % 2 == 0 {
                    (observed[mid - 1] + observed[mid]) / 2.0
                } else {
                    observed[mid]
                }
            }
            ImputeStrategy::MostFrequent => {
                observed.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                most_frequent_sorted(&observed)
            }
        };

        self.fill_value = Some(fill);
        Ok(self)
    }

    /// Fill every missing entry; observed entries pass through unchanged
    pub fn transform(&self, values: &[Option<f64>]) -> Result<Vec<f64>> {
        let fill = self.fill_value.ok_or(ForecastError::ModelNotFitted)?;
        Ok(values.iter().map(|v| v.unwrap_or(fill)).collect())
    }

    pub fn fit_transform(&mut self, values: &[Option<f64>]) -> Result<Vec<f64>> {
        self.fit(values)?;
        self.transform(values)
    }
}

/// Mode of a sorted slice; the earliest (smallest) run wins ties.
fn most_frequent_sorted(sorted: &[f64]) -> f64 {
    let mut best_val = sorted[0];
    let mut best_count = 0usize;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_count {
            best_count = j - i;
            best_val = sorted[i];
        }
        i = j;
    }
    best_val
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gappy() -> Vec<Option<f64>> {
        vec![Some(1.0), None, Some(3.0), Some(4.0), None, Some(4.0)]
    }

    #[test]
    fn test_mean_imputation() {
        let mut imputer = SimpleImputer::new(ImputeStrategy::Mean);
        let filled = imputer.fit_transform(&gappy()).unwrap();
        assert!((filled[1] - 3.0).abs() < 1e-12);
        assert_eq!(filled[0], 1.0);
        assert_eq!(filled.len(), 6);
    }

    #[test]
    fn test_median_imputation() {
        let mut imputer = SimpleImputer::new(ImputeStrategy::Median);
        let filled = imputer.fit_transform(&gappy()).unwrap();
        // observed sorted: 1, 3, 4, 4
        assert!((filled[4] - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_most_frequent_imputation() {
        let mut imputer = SimpleImputer::new(ImputeStrategy::MostFrequent);
        let filled = imputer.fit_transform(&gappy()).unwrap();
        assert_eq!(filled[1], 4.0);

        let mut tie = SimpleImputer::new(ImputeStrategy::MostFrequent);
        let filled = tie.fit_transform(&[Some(2.0), Some(1.0), None]).unwrap();
        assert_eq!(filled[2], 1.0);
    }

    #[test]
    fn test_constant_imputation_without_observations() {
        let mut imputer = SimpleImputer::new(ImputeStrategy::Constant(-1.0));
        let filled = imputer.fit_transform(&[None, None]).unwrap();
        assert_eq!(filled, vec![-1.0, -1.0]);
    }

    #[test]
    fn test_mean_without_observations_fails() {
        let mut imputer = SimpleImputer::new(ImputeStrategy::Mean);
        assert!(imputer.fit(&[None, None]).is_err());
    }

    #[test]
    fn test_transform_before_fit() {
        let imputer = SimpleImputer::new(ImputeStrategy::Mean);
        assert!(matches!(
            imputer.transform(&gappy()),
            Err(ForecastError::ModelNotFitted)
        ));
    }
}
