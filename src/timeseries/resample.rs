//! Interval strings and forward-fill upsampling

use super::frame::TimeFrame;
use crate::error::{ForecastError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fixed sampling interval such as `2H`, `30min` or `1D`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Interval {
    count: u32,
    unit: IntervalUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl Interval {
    pub fn hours(count: u32) -> Self {
        Self {
            count,
            unit: IntervalUnit::Hour,
        }
    }

    pub fn duration(&self) -> Duration {
        let n = self.count as i64;
        match self.unit {
            IntervalUnit::Second => Duration::seconds(n),
            IntervalUnit::Minute => Duration::minutes(n),
            IntervalUnit::Hour => Duration::hours(n),
            IntervalUnit::Day => Duration::days(n),
        }
    }
}

impl FromStr for Interval {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ForecastError::IntervalParse(s.to_string()))?;
        let (digits, unit) = trimmed.split_at(split);
        let count = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<u32>()
                .map_err(|_| ForecastError::IntervalParse(s.to_string()))?
        };
        if count == 0 {
            return Err(ForecastError::IntervalParse(s.to_string()));
        }
        let unit = match unit {
            "S" | "s" => IntervalUnit::Second,
            "T" | "min" => IntervalUnit::Minute,
            "H" | "h" => IntervalUnit::Hour,
            "D" | "d" => IntervalUnit::Day,
            _ => return Err(ForecastError::IntervalParse(s.to_string())),
        };
        Ok(Self { count, unit })
    }
}

impl TryFrom<String> for Interval {
    type Error = ForecastError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            IntervalUnit::Second => "S",
            IntervalUnit::Minute => "min",
            IntervalUnit::Hour => "H",
            IntervalUnit::Day => "D",
        };
        write!(f, "{}{}", self.count, unit)
    }
}

/// Upsample to a regular grid from the first to the last timestamp, padding each
/// slot with the most recent observed row. Nothing is produced past the last row.
pub fn forward_fill(frame: &TimeFrame, interval: Interval) -> Result<TimeFrame> {
    let (first, last) = match (frame.first_timestamp(), frame.last_timestamp()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(frame.clone()),
    };
    let step = interval.duration();

    let mut slots = Vec::new();
    let mut source_rows = Vec::new();
    let source = frame.timestamps();
    let mut cursor = 0usize;
    let mut t = first;
    while t <= last {
        while cursor + 1 < source.len() && source[cursor + 1] <= t {
            cursor += 1;
        }
        slots.push(t);
        source_rows.push(cursor);
        t += step;
    }

    let mut out = TimeFrame::new(slots)?;
    for name in frame.column_names() {
        let values = frame.column(name)?;
        let padded = source_rows.iter().map(|&r| values[r]).collect();
        out.set_column(name, padded)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseries::frame::tests::hourly;

    #[test]
    fn test_parse_interval() {
        assert_eq!("2H".parse::<Interval>().unwrap().duration(), Duration::hours(2));
        assert_eq!("H".parse::<Interval>().unwrap().duration(), Duration::hours(1));
        assert_eq!("30min".parse::<Interval>().unwrap().duration(), Duration::minutes(30));
        assert_eq!("15T".parse::<Interval>().unwrap().duration(), Duration::minutes(15));
        assert_eq!("1D".parse::<Interval>().unwrap().duration(), Duration::days(1));
    }

    #[test]
    fn test_parse_interval_invalid() {
        for bad in ["", "2", "0H", "2 weeks", "xH"] {
            assert!(
                matches!(bad.parse::<Interval>(), Err(ForecastError::IntervalParse(_))),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_interval_serde() {
        let json = serde_json::to_string(&Interval::hours(2)).unwrap();
        assert_eq!(json, "\"2H\"");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Interval::hours(2));
    }

    #[test]
    fn test_daily_to_two_hourly() {
        let daily = TimeFrame::new(hourly(3, 24))
            .unwrap()
            .with_dense_column("MEAN_TEMPERATURE", vec![1.0, 2.0, 3.0])
            .unwrap();
        let out = forward_fill(&daily, Interval::hours(2)).unwrap();
        // two full days of 12 slots plus the final day's midnight
        assert_eq!(out.len(), 25);
        let values = out.dense_column("MEAN_TEMPERATURE").unwrap();
        assert!(values[..12].iter().all(|v| *v == 1.0));
        assert!(values[12..24].iter().all(|v| *v == 2.0));
        assert_eq!(values[24], 3.0);
        assert_eq!(out.last_timestamp(), daily.last_timestamp());
    }

    #[test]
    fn test_forward_fill_keeps_missing() {
        let daily = TimeFrame::new(hourly(2, 24))
            .unwrap()
            .with_column("a", vec![None, Some(1.0)])
            .unwrap();
        let out = forward_fill(&daily, Interval::hours(12)).unwrap();
        assert_eq!(out.column("a").unwrap(), &[None, None, Some(1.0)]);
    }
}
