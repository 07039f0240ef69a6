//! Sensor worksheets
//!
//! A worksheet is one logger export: a `DateTime` column followed by one numeric
//! column per sensor. Loading cleans the table (whitespace, `NULL` sentinels),
//! parses timestamps and can synthesize an `Aggregate` column.

use super::loader::{parse_numeric_cell, DataLoader, RawTable};
use crate::error::{ForecastError, Result};
use crate::timeseries::TimeFrame;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Timestamp column of a sensor export
pub const DATETIME_COLUMN: &str = "DateTime";
/// Name of the synthesized row-mean column
pub const AGGREGATE_COLUMN: &str = "Aggregate";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_WIDTH: usize = 19;

/// Parse `YYYY-MM-DD HH:MM:SS` ignoring any trailing timezone suffix
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    let head = trimmed
        .get(..TIMESTAMP_WIDTH)
        .ok_or_else(|| ForecastError::DataError(format!("invalid timestamp '{}'", raw)))?;
    NaiveDateTime::parse_from_str(head, TIMESTAMP_FORMAT)
        .map_err(|e| ForecastError::DataError(format!("invalid timestamp '{}': {}", raw, e)))
}

/// A cleaned sensor export
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    frame: TimeFrame,
    sensor_columns: Vec<String>,
}

impl Worksheet {
    /// Load and clean a sensor CSV; the worksheet is named after the file stem
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("worksheet")
            .to_string();
        let table = DataLoader::new().load_table(path)?;
        let sheet = Self::from_table(name, &table)?;
        info!(
            worksheet = %sheet.name,
            rows = sheet.frame.len(),
            sensors = sheet.sensor_columns.len(),
            "Loaded worksheet"
        );
        Ok(sheet)
    }

    /// Build a worksheet from raw cells
    pub fn from_table(name: impl Into<String>, table: &RawTable) -> Result<Self> {
        let name = name.into();
        let context = format!("worksheet '{}'", name);
        let raw_ts = table.column(DATETIME_COLUMN, &context)?;

        let timestamps = raw_ts
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                let cell = cell.as_deref().ok_or_else(|| {
                    ForecastError::DataError(format!("{}: empty timestamp at row {}", context, row))
                })?;
                parse_timestamp(cell)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut frame = TimeFrame::new(timestamps)?;
        let mut sensor_columns = Vec::new();

        for (header, cells) in table.headers.iter().zip(&table.columns) {
            if header == DATETIME_COLUMN {
                continue;
            }
            let values = cells
                .iter()
                .enumerate()
                .map(|(row, cell)| {
                    parse_numeric_cell(cell.as_deref()).map_err(|msg| {
                        ForecastError::DataError(format!(
                            "{}: column '{}' row {}: {}",
                            context, header, row, msg
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            frame.set_column(header.clone(), values)?;
            sensor_columns.push(header.clone());
        }

        Ok(Self {
            name,
            frame,
            sensor_columns,
        })
    }

    /// Build a worksheet directly from a frame; every column counts as a sensor
    pub fn from_frame(name: impl Into<String>, frame: TimeFrame) -> Self {
        let sensor_columns = frame
            .column_names()
            .into_iter()
            .filter(|c| *c != AGGREGATE_COLUMN)
            .map(String::from)
            .collect();
        Self {
            name: name.into(),
            frame,
            sensor_columns,
        }
    }

    /// Add the `Aggregate` column: row mean of the sensor columns, skipping missing
    pub fn with_aggregate(mut self) -> Result<Self> {
        let n = self.frame.len();
        let mut sums = vec![0.0; n];
        let mut counts = vec![0usize; n];
        for name in &self.sensor_columns {
            for (i, v) in self.frame.column(name)?.iter().enumerate() {
                if let Some(v) = v {
                    sums[i] += v;
                    counts[i] += 1;
                }
            }
        }
        let aggregate = sums
            .into_iter()
            .zip(counts)
            .map(|(s, c)| if c == 0 { None } else { Some(s / c as f64) })
            .collect();
        self.frame.set_column(AGGREGATE_COLUMN, aggregate)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &TimeFrame {
        &self.frame
    }

    pub fn sensor_columns(&self) -> &[String] {
        &self.sensor_columns
    }

    pub fn has_aggregate(&self) -> bool {
        self.frame.has_column(AGGREGATE_COLUMN)
    }

    /// Per-column overview used by the `inspect` command
    pub fn summary(&self) -> Result<Vec<ColumnSummary>> {
        self.frame
            .column_names()
            .into_iter()
            .map(|name| {
                let values = self.frame.column(name)?;
                let ts = self.frame.timestamps();
                let first = values.iter().position(|v| v.is_some());
                let last = values.iter().rposition(|v| v.is_some());
                Ok(ColumnSummary {
                    column: name.to_string(),
                    rows: values.len(),
                    missing: values.iter().filter(|v| v.is_none()).count(),
                    first_valid: first.map(|i| ts[i]),
                    last_valid: last.map(|i| ts[i]),
                })
            })
            .collect()
    }
}

/// Overview of one worksheet column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub rows: usize,
    pub missing: usize,
    pub first_valid: Option<NaiveDateTime>,
    pub last_valid: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[(&str, &str, &str)]) -> RawTable {
        let cell = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        RawTable {
            headers: vec![DATETIME_COLUMN.into(), "A".into(), "B".into()],
            columns: vec![
                rows.iter().map(|r| cell(r.0)).collect(),
                rows.iter().map(|r| cell(r.1)).collect(),
                rows.iter().map(|r| cell(r.2)).collect(),
            ],
        }
    }

    #[test]
    fn test_parse_timestamp_ignores_suffix() {
        let ts = parse_timestamp("2021-03-04 05:06:07-0800").unwrap();
        assert_eq!(ts.to_string(), "2021-03-04 05:06:07");
        assert!(parse_timestamp("2021-03-04").is_err());
    }

    #[test]
    fn test_from_table_cleans_sentinels() {
        let sheet = Worksheet::from_table(
            "floor3",
            &table(&[
                ("2021-01-01 00:00:00-0800", "1.0", "NULL"),
                ("2021-01-01 02:00:00-0800", "", "4.0"),
            ]),
        )
        .unwrap();
        assert_eq!(sheet.sensor_columns(), &["A".to_string(), "B".to_string()]);
        assert_eq!(sheet.frame().column("A").unwrap(), &[Some(1.0), None]);
        assert_eq!(sheet.frame().column("B").unwrap(), &[None, Some(4.0)]);
    }

    #[test]
    fn test_non_numeric_cell_names_column() {
        let err = Worksheet::from_table(
            "floor3",
            &table(&[("2021-01-01 00:00:00-0800", "oops", "1")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("column 'A' row 0"));
    }

    #[test]
    fn test_missing_datetime_column() {
        let mut raw = table(&[("2021-01-01 00:00:00-0800", "1", "1")]);
        raw.headers[0] = "Time".into();
        assert!(matches!(
            Worksheet::from_table("x", &raw),
            Err(ForecastError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_aggregate_skips_missing() {
        let sheet = Worksheet::from_table(
            "floor3",
            &table(&[
                ("2021-01-01 00:00:00-0800", "1.0", "3.0"),
                ("2021-01-01 02:00:00-0800", "", "4.0"),
                ("2021-01-01 04:00:00-0800", "NULL", ""),
            ]),
        )
        .unwrap()
        .with_aggregate()
        .unwrap();
        assert!(sheet.has_aggregate());
        assert_eq!(
            sheet.frame().column(AGGREGATE_COLUMN).unwrap(),
            &[Some(2.0), Some(4.0), None]
        );
        // the aggregate is not itself a sensor
        assert_eq!(sheet.sensor_columns().len(), 2);
    }

    #[test]
    fn test_summary() {
        let sheet = Worksheet::from_table(
            "floor3",
            &table(&[
                ("2021-01-01 00:00:00-0800", "", "3.0"),
                ("2021-01-01 02:00:00-0800", "2.0", "4.0"),
            ]),
        )
        .unwrap();
        let summary = sheet.summary().unwrap();
        assert_eq!(summary[0].missing, 1);
        assert_eq!(summary[0].first_valid, Some(sheet.frame().timestamps()[1]));
    }
}
