//! CSV loading

use crate::error::{ForecastError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sentinel used by the logger exports for a missing reading
pub const NULL_SENTINEL: &str = "NULL";

/// Header plus raw string cells, column-major
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub columns: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Index of a header after whitespace stripping
    pub fn position(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column(&self, name: &str, context: &str) -> Result<&[Option<String>]> {
        self.position(name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| ForecastError::missing_column(name, context))
    }
}

/// Reads delimited text files through polars, keeping every cell as text so that
/// sentinels and stray whitespace can be cleaned before numeric parsing.
#[derive(Debug, Clone)]
pub struct DataLoader {
    delimiter: u8,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file as an all-string DataFrame
    pub fn load_csv(&self, path: &Path) -> Result<DataFrame> {
        let file = File::open(path).map_err(|e| {
            ForecastError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default().with_separator(self.delimiter);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;

        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        Ok(df)
    }

    /// Load a CSV file into trimmed header names and trimmed string cells
    pub fn load_table(&self, path: &Path) -> Result<RawTable> {
        let df = self.load_csv(path)?;
        table_from_frame(&df)
    }
}

/// Convert a polars frame into a [`RawTable`], stripping whitespace
pub fn table_from_frame(df: &DataFrame) -> Result<RawTable> {
    let mut headers = Vec::with_capacity(df.width());
    let mut columns = Vec::with_capacity(df.width());

    for column in df.get_columns() {
        headers.push(column.name().trim().to_string());
        let as_text = column.as_materialized_series().cast(&DataType::String)?;
        let cells = as_text
            .str()?
            .into_iter()
            .map(|cell| cell.map(|s| s.trim().to_string()))
            .collect();
        columns.push(cells);
    }

    Ok(RawTable { headers, columns })
}

/// Parse one cell: empty and the `NULL` sentinel become missing
pub fn parse_numeric_cell(cell: Option<&str>) -> std::result::Result<Option<f64>, String> {
    match cell.map(str::trim) {
        None => Ok(None),
        Some("") => Ok(None),
        Some(s) if s.eq_ignore_ascii_case(NULL_SENTINEL) => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .map_err(|_| format!("non-numeric value '{}'", s)),
    }
}

/// CSV files of a directory, sorted by file name
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}
