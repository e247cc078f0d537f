//! Summary Statistics
//!
//! The minimum is the statistic a run reports: it is the sample least
//! disturbed by scheduling noise. The rest of the summary describes the
//! spread around it.

use crate::percentiles::{percentile_of_sorted, sorted_samples};
use serde::{Deserialize, Serialize};

/// Distribution of the timing samples of one run, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Number of samples
    pub count: usize,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// 50th percentile
    pub median: f64,
    /// Sample standard deviation (0 for a single sample)
    pub std_dev: f64,
    /// 90th percentile
    pub p90: f64,
    /// 99th percentile
    pub p99: f64,
}

impl SampleSummary {
    /// Standard deviation relative to the mean, in percent
    pub fn cv_percent(&self) -> f64 {
        if self.mean > 0.0 {
            self.std_dev / self.mean * 100.0
        } else {
            0.0
        }
    }
}

/// Smallest sample, `None` when there are none
pub fn minimum(samples: &[f64]) -> Option<f64> {
    samples.iter().copied().min_by(f64::total_cmp)
}

/// Summarise `samples`; `None` for an empty slice
pub fn compute_summary(samples: &[f64]) -> Option<SampleSummary> {
    let sorted = sorted_samples(samples);
    let (&min, &max) = (sorted.first()?, sorted.last()?);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let std_dev = if count < 2 {
        0.0
    } else {
        let variance =
            sorted.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    };

    Some(SampleSummary {
        count,
        min,
        max,
        mean,
        median: percentile_of_sorted(&sorted, 50.0)?,
        std_dev,
        p90: percentile_of_sorted(&sorted, 90.0)?,
        p99: percentile_of_sorted(&sorted, 99.0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_summary() {
        assert!(compute_summary(&[]).is_none());
        assert!(minimum(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let summary = compute_summary(&[0.25]).unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.min, 0.25);
        assert_eq!(summary.max, 0.25);
        assert_eq!(summary.median, 0.25);
        assert_eq!(summary.std_dev, 0.0);
    }

    #[test]
    fn test_basic_summary() {
        let samples = [3.0, 1.0, 4.0, 1.5, 5.0];
        let summary = compute_summary(&samples).unwrap();

        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 5.0);
        assert!((summary.mean - 2.9).abs() < 1e-12);
        assert_eq!(summary.median, 3.0);
        assert!(summary.std_dev > 1.0 && summary.std_dev < 2.0);
        assert!(summary.p90 > summary.median && summary.p99 <= summary.max);
    }

    #[test]
    fn test_minimum_matches_summary() {
        let samples = [0.3, 0.1, 0.2];
        assert_eq!(minimum(&samples), Some(0.1));
        assert_eq!(compute_summary(&samples).unwrap().min, 0.1);
    }

    #[test]
    fn test_cv_percent() {
        let summary = compute_summary(&[1.0, 3.0]).unwrap();
        assert!((summary.cv_percent() - 70.710678).abs() < 1e-3);
        assert_eq!(compute_summary(&[0.0]).unwrap().cv_percent(), 0.0);
    }

    #[test]
    fn test_serializes_field_names() {
        let summary = compute_summary(&[1.0, 2.0]).unwrap();
        let json = serde_json::to_value(summary).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["min"], 1.0);
    }
}
