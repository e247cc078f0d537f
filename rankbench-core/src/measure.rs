//! Monotonic Timing
//!
//! The benchmark runner reads time through a caller-supplied callback
//! returning seconds. `monotonic_seconds` is the default callback; `Timer`
//! measures the stages of a single driver pass.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Seconds elapsed since the first call in this process
#[inline]
pub fn monotonic_seconds() -> f64 {
    EPOCH.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Stopwatch over one stage or pass
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Time since `start`
    #[inline(always)]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
