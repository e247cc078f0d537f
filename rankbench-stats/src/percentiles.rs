//! Percentile Computation
//!
//! Percentiles are read from the raw samples: a slow repetition is part of the
//! tail, not noise to be cleaned away.

/// Copy of `samples` in ascending order (`f64::total_cmp`, so NaNs sort last)
pub fn sorted_samples(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Percentile of already sorted samples, by linear interpolation between
/// nearest ranks. `percentile` is clamped to `0..=100`.
pub fn percentile_of_sorted(sorted: &[f64], percentile: f64) -> Option<f64> {
    match sorted {
        [] => None,
        [only] => Some(*only),
        _ => {
            let n = sorted.len();
            let rank = percentile.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = (lower + 1).min(n - 1);
            let fraction = rank - lower as f64;
            Some(sorted[lower] + fraction * (sorted[upper] - sorted[lower]))
        }
    }
}

/// Percentile of unsorted samples
///
/// ```
/// # use rankbench_stats::compute_percentile;
/// let samples = [5.0, 1.0, 3.0, 2.0, 4.0];
/// assert_eq!(compute_percentile(&samples, 50.0), Some(3.0));
/// assert_eq!(compute_percentile(&[], 50.0), None);
/// ```
pub fn compute_percentile(samples: &[f64], percentile: f64) -> Option<f64> {
    percentile_of_sorted(&sorted_samples(samples), percentile)
}
