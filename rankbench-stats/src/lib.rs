#![warn(missing_docs)]
//! rankbench Sample Statistics
//!
//! Timing samples of a benchmark run are summarised here:
//! - the minimum, which is the representative latency of a run
//! - mean, median and sample standard deviation
//! - tail percentiles with linear interpolation
//!
//! Empty samples have no statistics at all (`None`), never zeros.

mod percentiles;
mod summary;

pub use percentiles::{compute_percentile, percentile_of_sorted, sorted_samples};
pub use summary::{SampleSummary, compute_summary, minimum};
