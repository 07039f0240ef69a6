//! Input data: CSV loading, sensor worksheets and climate covariates

pub mod climate;
pub mod loader;
pub mod worksheet;

pub use climate::{ClimateConfig, ClimatePreparer, DATE_COLUMN};
pub use loader::{list_csv_files, DataLoader, RawTable};
pub use worksheet::{ColumnSummary, Worksheet, AGGREGATE_COLUMN, DATETIME_COLUMN};
