//! Progress reporting for long-running walks.

pub mod meter;

pub use meter::ProgressMeter;
