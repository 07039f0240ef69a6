//! Timestamp-indexed frame of named numeric columns

use crate::error::{ForecastError, Result};
use chrono::{Duration, NaiveDateTime};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical timestamp label
pub const DS: &str = "ds";
/// Canonical target label
pub const Y: &str = "y";

/// Ordered columns of optional values sharing one strictly increasing time index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeFrame {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

impl TimeFrame {
    /// Create an empty-column frame over the given index
    pub fn new(timestamps: Vec<NaiveDateTime>) -> Result<Self> {
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(ForecastError::DataError(format!(
                "timestamps not strictly increasing at row {} ({} after {})",
                pos + 1,
                timestamps[pos + 1],
                timestamps[pos]
            )));
        }
        Ok(Self {
            timestamps,
            columns: Vec::new(),
        })
    }

    /// Add a column, replacing any existing column of the same name
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<Self> {
        self.set_column(name, values)?;
        Ok(self)
    }

    /// Add a fully observed column
    pub fn with_dense_column(self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.with_column(name, values.into_iter().map(Some).collect())
    }

    pub fn set_column(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            return Err(ForecastError::Alignment(format!(
                "column '{}' has {} rows, frame has {}",
                name,
                values.len(),
                self.timestamps.len()
            )));
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = values,
            None => self.columns.push((name, values)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The `ds` view of the index
    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| ForecastError::missing_column(name, "time frame"))
    }

    /// Column values, failing if any entry is missing
    pub fn dense_column(&self, name: &str) -> Result<Vec<f64>> {
        let values = self.column(name)?;
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.ok_or_else(|| {
                    ForecastError::Validation(format!(
                        "column '{}' has a missing value at {}",
                        name, self.timestamps[i]
                    ))
                })
            })
            .collect()
    }

    pub fn missing_count(&self, name: &str) -> Result<usize> {
        Ok(self.column(name)?.iter().filter(|v| v.is_none()).count())
    }

    pub fn rename_column(&mut self, from: &str, to: impl Into<String>) -> Result<()> {
        let to = to.into();
        let slot = self
            .columns
            .iter_mut()
            .find(|(n, _)| n == from)
            .ok_or_else(|| ForecastError::missing_column(from, "time frame"))?;
        slot.0 = to;
        Ok(())
    }

    /// Keep only the named columns, in the given order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<TimeFrame> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            columns.push((name.to_string(), self.column(name)?.to_vec()));
        }
        Ok(TimeFrame {
            timestamps: self.timestamps.clone(),
            columns,
        })
    }

    /// Rows `start..end` by position
    pub fn slice(&self, start: usize, end: usize) -> TimeFrame {
        let end = end.min(self.len());
        let start = start.min(end);
        TimeFrame {
            timestamps: self.timestamps[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v[start..end].to_vec()))
                .collect(),
        }
    }

    /// Rows whose timestamp lies in `[first, last]`
    pub fn slice_range(&self, first: NaiveDateTime, last: NaiveDateTime) -> TimeFrame {
        let start = self.timestamps.partition_point(|t| *t < first);
        let end = self.timestamps.partition_point(|t| *t <= last);
        self.slice(start, end.max(start))
    }

    pub fn head(&self, n: usize) -> TimeFrame {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> TimeFrame {
        self.slice(self.len().saturating_sub(n), self.len())
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }

    /// Human readable `[first, last]` span
    pub fn span_string(&self) -> String {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(a), Some(b)) => format!("[{}, {}]", a, b),
            _ => "[empty]".to_string(),
        }
    }

    /// Append the rows of `other`; columns must match by name and other must start later
    pub fn concat(&self, other: &TimeFrame) -> Result<TimeFrame> {
        if let (Some(last), Some(first)) = (self.last_timestamp(), other.first_timestamp()) {
            if first <= last {
                return Err(ForecastError::Alignment(format!(
                    "cannot append frame starting at {} after {}",
                    first, last
                )));
            }
        }
        let mut timestamps = self.timestamps.clone();
        timestamps.extend_from_slice(&other.timestamps);
        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, values) in &self.columns {
            let mut merged = values.clone();
            merged.extend_from_slice(other.column(name)?);
            columns.push((name.clone(), merged));
        }
        Ok(TimeFrame { timestamps, columns })
    }

    /// Dense row-major matrix of the named columns
    pub fn to_array<S: AsRef<str>>(&self, names: &[S]) -> Result<Array2<f64>> {
        let mut matrix = Array2::zeros((self.len(), names.len()));
        for (j, name) in names.iter().enumerate() {
            let values = self.dense_column(name.as_ref())?;
            for (i, v) in values.into_iter().enumerate() {
                matrix[[i, j]] = v;
            }
        }
        Ok(matrix)
    }

    /// Most common spacing between consecutive timestamps (smallest on ties)
    pub fn modal_interval(&self) -> Option<Duration> {
        modal_interval(&self.timestamps)
    }
}

/// Most common positive spacing of an ordered index
pub fn modal_interval(timestamps: &[NaiveDateTime]) -> Option<Duration> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for w in timestamps.windows(2) {
        let secs = (w[1] - w[0]).num_seconds();
        if secs > 0 {
            *counts.entry(secs).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(secs, _)| Duration::seconds(secs))
}

/// `count` timestamps following `last`, spaced by `step`
pub fn future_timestamps(last: NaiveDateTime, step: Duration, count: usize) -> Vec<NaiveDateTime> {
    (1..=count as i32).map(|i| last + step * i).collect()
}
