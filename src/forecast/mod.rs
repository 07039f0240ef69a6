//! Forecast driver, normalized forecast output and model checkpoints

pub mod checkpoint;
pub mod driver;
mod frame;

pub use checkpoint::{checkpoint_path, write_checkpoint, Checkpoint, Stage};
pub use driver::{
    add_transform_columns, DriverConfig, ForecastDriver, ForecastOutcome, FutureRegressors,
    RegressorTransform,
};
pub use frame::ForecastFrame;
