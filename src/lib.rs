//! timber_forecast - forecasting harness for mass-timber sensor data
//!
//! Moisture-content and vertical-movement sensors of a multi-story timber
//! building are forecast from their own history and daily climate covariates.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - CSV loading, worksheet cleaning, climate covariate preparation
//! - [`imputation`] - Scalar imputation of missing readings
//! - [`timeseries`] - Time frames, alignment, forward-fill resampling, lag features
//! - [`preprocessing`] - Per-sensor valid-span extraction, covariate merge, split
//!
//! ## Models
//! - [`training`] - Autoregressive, lag regression, gradient boosted and additive models
//! - [`forecast`] - Forecast driver, normalized output, checkpoints
//! - [`evaluation`] - MAE (and friends) against held-out ground truth
//!
//! ## Orchestration
//! - [`batch`] - Runs every (worksheet, model, column) unit of a directory
//! - [`export`] - CSV result tables
//! - [`config`] - Pipeline configuration
//! - [`cli`] - Command-line interface

pub mod error;

pub mod data;
pub mod imputation;
pub mod preprocessing;
pub mod timeseries;

pub mod evaluation;
pub mod forecast;
pub mod training;

pub mod batch;
pub mod cli;
pub mod config;
pub mod export;

pub use error::{ForecastError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{ForecastError, Result};

    pub use crate::data::{ClimateConfig, ClimatePreparer, DataLoader, Worksheet};
    pub use crate::imputation::{ImputeStrategy, SimpleImputer};
    pub use crate::preprocessing::{CovariateGroup, PreparedSeries, PreprocessConfig, SensorPreprocessor};
    pub use crate::timeseries::{align, forward_fill, AlignedPair, Interval, TimeFrame};

    pub use crate::training::{
        AdditiveConfig, AdditiveGrid, ArConfig, BoostConfig, Forecaster, LagConfig, ModelSpec,
        SeasonalityMode,
    };
    pub use crate::forecast::{DriverConfig, ForecastDriver, ForecastFrame, FutureRegressors};
    pub use crate::evaluation::{Evaluator, Metric};

    pub use crate::batch::{BatchOrchestrator, BatchReport};
    pub use crate::config::{ModelEntry, PipelineConfig};
}
