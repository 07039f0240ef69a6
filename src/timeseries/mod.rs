//! Time series primitives
//!
//! - Timestamp-indexed frames
//! - Interval parsing and forward-fill resampling
//! - Series/covariate alignment
//! - Lag feature windows

pub mod align;
pub mod features;
pub mod frame;
pub mod resample;

pub use align::{align, AlignedPair};
pub use features::LagWindow;
pub use frame::{future_timestamps, modal_interval, TimeFrame, DS, Y};
pub use resample::{forward_fill, Interval};
