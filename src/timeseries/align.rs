//! Series/covariate alignment on the common time span

use super::frame::TimeFrame;
use crate::error::{ForecastError, Result};
use std::collections::HashSet;
use tracing::debug;

/// A series and its covariates restricted to their common time range
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    pub series: TimeFrame,
    pub covariates: TimeFrame,
}

/// Restrict both frames to `[first common timestamp, last common timestamp]`.
///
/// Only exact timestamp matches count as common. Rows inside the range that are
/// not shared are kept; callers that copy values by position check row counts.
pub fn align(series: &TimeFrame, covariates: &TimeFrame) -> Result<AlignedPair> {
    let covariate_index: HashSet<_> = covariates.timestamps().iter().collect();
    let mut common = series
        .timestamps()
        .iter()
        .filter(|t| covariate_index.contains(t));

    let first = common.next().copied();
    let last = common.last().copied().or(first);

    let (first, last) = match (first, last) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(ForecastError::EmptyIntersection {
                series_span: series.span_string(),
                covariate_span: covariates.span_string(),
            })
        }
    };

    debug!(first = %first, last = %last, "Aligned on common span");

    Ok(AlignedPair {
        series: series.slice_range(first, last),
        covariates: covariates.slice_range(first, last),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;

    fn daily_frame(first_day: usize, last_day: usize, name: &str) -> TimeFrame {
        let all = hourly(last_day + 1, 24);
        let ts = all[first_day..=last_day].to_vec();
        let n = ts.len();
        TimeFrame::new(ts)
            .unwrap()
            .with_dense_column(name, (0..n).map(|i| i as f64).collect())
            .unwrap()
    }

    #[test]
    fn test_overlapping_spans() {
        let series = daily_frame(10, 200, "y");
        let covariates = daily_frame(1, 150, "temp");
        let pair = align(&series, &covariates).unwrap();
        assert_eq!(pair.series.len(), 141);
        assert_eq!(pair.covariates.len(), 141);
        assert_eq!(pair.series.first_timestamp(), series.first_timestamp());
        assert_eq!(pair.series.last_timestamp(), covariates.last_timestamp());
        assert_eq!(pair.series.timestamps(), pair.covariates.timestamps());
    }

    #[test]
    fn test_idempotent() {
        let series = daily_frame(10, 200, "y");
        let covariates = daily_frame(1, 150, "temp");
        let once = align(&series, &covariates).unwrap();
        let twice = align(&once.series, &covariates).unwrap();
        assert_eq!(once.series, twice.series);
        assert_eq!(once.covariates, twice.covariates);
    }

    #[test]
    fn test_disjoint_spans() {
        let series = daily_frame(100, 120, "y");
        let covariates = daily_frame(1, 50, "temp");
        let err = align(&series, &covariates).unwrap_err();
        match err {
            ForecastError::EmptyIntersection {
                series_span,
                covariate_span,
            } => {
                assert!(series_span.starts_with('['));
                assert_ne!(series_span, covariate_span);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_common_timestamp() {
        let series = daily_frame(10, 20, "y");
        let covariates = daily_frame(20, 30, "temp");
        let pair = align(&series, &covariates).unwrap();
        assert_eq!(pair.series.len(), 1);
        assert_eq!(pair.covariates.len(), 1);
    }
}
