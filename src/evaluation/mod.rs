//! Forecast evaluation against held-out ground truth

use crate::error::{ForecastError, Result};
use crate::forecast::ForecastFrame;
use crate::timeseries::{TimeFrame, Y};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Error metric computed by the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Mae,
    Rmse,
    Mape,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Mae => "MAE",
            Metric::Rmse => "RMSE",
            Metric::Mape => "MAPE",
        }
    }

    fn compute(&self, truth: &[f64], predicted: &[f64]) -> Option<f64> {
        match self {
            Metric::Mae => Some(mae(truth, predicted)),
            Metric::Rmse => Some(rmse(truth, predicted)),
            Metric::Mape => mape(truth, predicted),
        }
    }
}

/// Metric values of one forecast, keyed by metric label
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub metrics: BTreeMap<String, f64>,
}

impl EvaluationRecord {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(metric.label()).copied()
    }

    /// MAE is always computed
    pub fn mae(&self) -> f64 {
        self.get(Metric::Mae).unwrap_or(f64::NAN)
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    metrics: Vec<Metric>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            metrics: vec![Metric::Mae],
        }
    }
}

impl Evaluator {
    /// MAE is added when absent
    pub fn new(mut metrics: Vec<Metric>) -> Self {
        if !metrics.contains(&Metric::Mae) {
            metrics.insert(0, Metric::Mae);
        }
        Self { metrics }
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// Compare the ground truth with the last `len(groundtruth)` forecast rows
    pub fn evaluate(&self, groundtruth: &TimeFrame, forecast: &ForecastFrame) -> Result<EvaluationRecord> {
        let horizon = groundtruth.len();
        if horizon == 0 {
            return Err(ForecastError::Validation("ground truth is empty".to_string()));
        }
        if forecast.len() < horizon {
            return Err(ForecastError::Validation(format!(
                "forecast has {} rows, ground truth needs {}",
                forecast.len(),
                horizon
            )));
        }
        check_increasing(groundtruth.timestamps(), "ground truth")?;
        check_increasing(&forecast.ds, "forecast")?;

        let truth = groundtruth.dense_column(Y)?;
        let tail = forecast.tail(horizon);
        if tail.ds.as_slice() != groundtruth.timestamps() {
            warn!(
                truth_span = %groundtruth.span_string(),
                forecast_first = ?tail.ds.first(),
                forecast_last = ?tail.ds.last(),
                "Forecast tail timestamps differ from ground truth; comparing by position"
            );
        }

        let mut record = EvaluationRecord::default();
        for metric in &self.metrics {
            match metric.compute(&truth, &tail.y) {
                Some(value) => {
                    record.metrics.insert(metric.label().to_string(), value);
                }
                None => warn!(metric = metric.label(), "Metric undefined for this ground truth"),
            }
        }
        Ok(record)
    }
}

fn check_increasing(stamps: &[NaiveDateTime], what: &str) -> Result<()> {
    if let Some(i) = stamps.windows(2).position(|w| w[0] >= w[1]) {
        return Err(ForecastError::Validation(format!(
            "{} timestamps are not strictly increasing at row {}",
            what,
            i + 1
        )));
    }
    Ok(())
}

/// Mean absolute error; inputs are compared position by position
pub fn mae(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    truth.iter().zip(predicted).map(|(t, p)| (t - p).abs()).sum::<f64>() / n as f64
}

pub fn rmse(truth: &[f64], predicted: &[f64]) -> f64 {
    let n = truth.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mse = truth.iter().zip(predicted).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / n as f64;
    mse.sqrt()
}

/// Percentage error over the non-zero truth values; `None` when every value is zero
pub fn mape(truth: &[f64], predicted: &[f64]) -> Option<f64> {
    let (sum, count) = truth
        .iter()
        .zip(predicted)
        .filter(|(t, _)| **t != 0.0)
        .fold((0.0, 0usize), |(s, c), (t, p)| (s + ((t - p) / t).abs(), c + 1));
    (count > 0).then(|| 100.0 * sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;

    fn truth(values: Vec<f64>) -> TimeFrame {
        let n = values.len();
        TimeFrame::new(hourly(n + 5, 1)[5..].to_vec())
            .unwrap()
            .with_dense_column(Y, values)
            .unwrap()
    }

    fn forecast(values: Vec<f64>) -> ForecastFrame {
        let n = values.len();
        ForecastFrame::new(hourly(n, 1), values).unwrap()
    }

    #[test]
    fn test_mae_identity_is_zero() {
        let x = vec![1.5, -2.0, 3.25];
        assert_eq!(mae(&x, &x), 0.0);
        assert!(mae(&x, &[0.0, 0.0, 0.0]) >= 0.0);
    }

    #[test]
    fn test_evaluate_uses_forecast_tail() {
        let gt = truth(vec![1.0, 2.0, 3.0]);
        let fc = forecast(vec![100.0, 100.0, 100.0, 100.0, 100.0, 1.0, 2.0, 4.0]);
        let record = Evaluator::default().evaluate(&gt, &fc).unwrap();
        assert!((record.mae() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_forecast_rejected() {
        let gt = truth(vec![1.0, 2.0, 3.0]);
        let fc = forecast(vec![1.0, 2.0]);
        assert!(matches!(
            Evaluator::default().evaluate(&gt, &fc),
            Err(ForecastError::Validation(_))
        ));
    }

    #[test]
    fn test_unordered_forecast_rejected() {
        let gt = truth(vec![1.0]);
        let mut fc = forecast(vec![1.0, 2.0]);
        fc.ds.reverse();
        assert!(Evaluator::default().evaluate(&gt, &fc).is_err());
    }

    #[test]
    fn test_extra_metrics() {
        let gt = truth(vec![2.0, 4.0]);
        let fc = forecast(vec![0.0, 0.0, 0.0, 1.0, 2.0, 5.0, 5.0]);
        let record = Evaluator::new(vec![Metric::Rmse, Metric::Mape]).evaluate(&gt, &fc).unwrap();
        assert_eq!(record.metrics.len(), 3);
        assert!((record.get(Metric::Rmse).unwrap() - 5.0f64.sqrt()).abs() < 1e-12);
        assert!((record.get(Metric::Mape).unwrap() - 87.5).abs() < 1e-12);
    }

    #[test]
    fn test_mape_all_zero_truth() {
        assert_eq!(mape(&[0.0, 0.0], &[1.0, 2.0]), None);
    }
}
