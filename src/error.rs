//! Error types for the forecasting harness

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Main error type
///
/// Unit-level variants (missing column, empty intersection, insufficient data)
/// abort a single (file, model, column) unit; `Config` aborts the whole run.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Missing column '{column}' in {context}")]
    MissingColumn { column: String, context: String },

    #[error("No common timestamps: series spans {series_span}, covariates span {covariate_span}")]
    EmptyIntersection {
        series_span: String,
        covariate_span: String,
    },

    #[error("Alignment error: {0}")]
    Alignment(String),

    #[error("Insufficient data for {context}: need {needed}, have {available}")]
    InsufficientData {
        needed: usize,
        available: usize,
        context: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid interval '{0}'")]
    IntervalParse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Training error: {0}")]
    Training(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForecastError {
    pub(crate) fn missing_column(column: impl Into<String>, context: impl Into<String>) -> Self {
        ForecastError::MissingColumn {
            column: column.into(),
            context: context.into(),
        }
    }

    pub(crate) fn insufficient(needed: usize, available: usize, context: impl Into<String>) -> Self {
        ForecastError::InsufficientData {
            needed,
            available,
            context: context.into(),
        }
    }

    /// Short machine-friendly tag for reports
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::MissingColumn { .. } => "missing_column",
            ForecastError::EmptyIntersection { .. } | ForecastError::Alignment(_) => "alignment",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::Config(_) => "config",
            ForecastError::DataError(_) | ForecastError::IntervalParse(_) => "data",
            ForecastError::Validation(_) => "validation",
            ForecastError::ModelNotFitted | ForecastError::Training(_) => "training",
            ForecastError::Serialization(_) => "serialization",
            ForecastError::Io(_) => "io",
        }
    }
}

impl From<polars::error::PolarsError> for ForecastError {
    fn from(err: polars::error::PolarsError) -> Self {
        ForecastError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}
