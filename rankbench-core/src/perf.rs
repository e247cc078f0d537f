//! Performance Benchmark Runner
//!
//! Times repeated lifecycle passes of one task. Every rank of the group runs
//! the same repetitions, so collectives inside `compute` line up; after each
//! repetition the ranks agree on whether to go on. Only rank 0's clock
//! matters: it alone decides the ceiling and returns the samples.

use crate::driver::{Driver, StageError};
use crate::measure::monotonic_seconds;
use crate::task::{Stage, Task, TaskState};
use rankbench_comm::{Communicator, ReduceOp};
use rankbench_stats::{SampleSummary, compute_summary, minimum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Clock callback returning monotonic seconds since an arbitrary epoch
pub type TimerFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Default repetition count
pub const DEFAULT_NUM_RUNNING: usize = 5;

/// Default ceiling on the repeated-run phase, in seconds
pub const DEFAULT_MAX_TIME: f64 = 10.0;

/// Benchmark attributes
#[derive(Clone)]
pub struct PerfAttr {
    /// Repetitions requested
    pub num_running: usize,
    /// Clock read around every repetition
    pub current_timer: TimerFn,
    /// Ceiling in seconds, checked between repetitions
    pub max_time: f64,
}

impl PerfAttr {
    /// Attributes with `num_running` repetitions and the default clock
    pub fn new(num_running: usize, max_time: f64) -> Self {
        Self {
            num_running,
            max_time,
            ..Self::default()
        }
    }

    /// Replace the clock
    pub fn with_timer(mut self, timer: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.current_timer = Arc::new(timer);
        self
    }

    fn now(&self) -> f64 {
        (self.current_timer)()
    }
}

impl Default for PerfAttr {
    fn default() -> Self {
        Self {
            num_running: DEFAULT_NUM_RUNNING,
            current_timer: Arc::new(monotonic_seconds),
            max_time: DEFAULT_MAX_TIME,
        }
    }
}

impl fmt::Debug for PerfAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PerfAttr")
            .field("num_running", &self.num_running)
            .field("max_time", &self.max_time)
            .finish_non_exhaustive()
    }
}

/// Which stages a repetition times
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// Every stage, every repetition
    #[default]
    Pipeline,
    /// `compute + postprocess` after one untimed `validate + preprocess`
    #[serde(rename = "task_run")]
    Task,
    /// `compute` only after one untimed `validate + preprocess`
    Compute,
}

impl RunKind {
    /// Label used in reports
    pub fn label(self) -> &'static str {
        match self {
            RunKind::Pipeline => "pipeline",
            RunKind::Task => "task_run",
            RunKind::Compute => "compute",
        }
    }

    /// Stages timed by one repetition
    pub fn timed_stages(self) -> &'static [Stage] {
        match self {
            RunKind::Pipeline => &Stage::ALL,
            RunKind::Task => &[Stage::Compute, Stage::Postprocess],
            RunKind::Compute => &[Stage::Compute],
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RunKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pipeline" => Ok(RunKind::Pipeline),
            "task" | "task_run" => Ok(RunKind::Task),
            "compute" => Ok(RunKind::Compute),
            _ => Err(format!("Unknown run mode: {s} (expected pipeline, task or compute)")),
        }
    }
}

/// Why the repetition loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// All requested repetitions ran
    Completed,
    /// The ceiling was exceeded first
    TimeLimit,
}

/// Samples of one benchmark run, as seen by rank 0
#[derive(Debug, Clone, PartialEq)]
pub struct PerfResults {
    /// Run kind
    pub kind: RunKind,
    /// Seconds per repetition, in order
    pub samples: Vec<f64>,
    /// Repetitions requested
    pub requested: usize,
    /// Why the loop ended
    pub stop: StopReason,
}

impl PerfResults {
    /// Representative latency: the fastest repetition, `None` with no samples
    pub fn time_sec(&self) -> Option<f64> {
        minimum(&self.samples)
    }

    /// Distribution of the samples
    pub fn summary(&self) -> Option<SampleSummary> {
        compute_summary(&self.samples)
    }

    /// Whether every requested repetition ran
    pub fn is_complete(&self) -> bool {
        self.stop == StopReason::Completed
    }
}

/// Why a benchmark run was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PerfError {
    /// A timed stage returned `false` on this rank
    #[error("{stage} failed in repetition {repetition}")]
    StageFailed {
        /// Failing stage
        stage: Stage,
        /// Zero-based repetition index
        repetition: usize,
    },

    /// Another rank failed the repetition
    #[error("another rank failed in repetition {repetition}")]
    PeerFailed {
        /// Zero-based repetition index
        repetition: usize,
    },

    /// The untimed `validate` or `preprocess` failed on some rank
    #[error("untimed {stage} failed")]
    Setup {
        /// Failing stage
        stage: Stage,
    },

    /// The runner drove the task out of lifecycle order
    #[error("{stage} called out of order (task is {state:?})")]
    OutOfOrder {
        /// Refused stage
        stage: Stage,
        /// State the task was in
        state: TaskState,
    },
}

/// Benchmark runner over a borrowed task
pub struct Perf<'a> {
    task: &'a mut dyn Task,
    comm: Communicator,
}

impl<'a> Perf<'a> {
    /// Runner for a task on a single rank
    pub fn new(task: &'a mut dyn Task) -> Self {
        Self {
            task,
            comm: Communicator::single(),
        }
    }

    /// Runner for one rank of a group; every rank must make the same calls
    pub fn with_communicator(task: &'a mut dyn Task, comm: &Communicator) -> Self {
        Self {
            task,
            comm: comm.clone(),
        }
    }

    /// Time full lifecycle passes
    pub fn pipeline_run(&mut self, attr: &PerfAttr) -> Result<Option<PerfResults>, PerfError> {
        self.run(RunKind::Pipeline, attr)
    }

    /// Time `compute + postprocess` after one untimed setup
    pub fn task_run(&mut self, attr: &PerfAttr) -> Result<Option<PerfResults>, PerfError> {
        self.run(RunKind::Task, attr)
    }

    /// Time `compute` after one untimed setup
    pub fn compute_run(&mut self, attr: &PerfAttr) -> Result<Option<PerfResults>, PerfError> {
        self.run(RunKind::Compute, attr)
    }

    /// Run `attr.num_running` repetitions of `kind`.
    ///
    /// Returns `Some` on rank 0 and `None` elsewhere. With zero repetitions
    /// the task is not driven at all and the sample is empty.
    pub fn run(
        &mut self,
        kind: RunKind,
        attr: &PerfAttr,
    ) -> Result<Option<PerfResults>, PerfError> {
        let comm = self.comm.clone();
        let requested = attr.num_running;
        let mut driver = Driver::new(&mut *self.task);
        let mut samples = Vec::with_capacity(requested);
        let mut stop = StopReason::Completed;

        if requested > 0 && kind != RunKind::Pipeline {
            for stage in [Stage::Validate, Stage::Preprocess] {
                let outcome = driver.stage(stage);
                if !agree(&comm, outcome.is_ok()) {
                    return Err(match outcome {
                        Err(StageError::OutOfOrder { stage, state }) => {
                            PerfError::OutOfOrder { stage, state }
                        }
                        _ => PerfError::Setup { stage },
                    });
                }
            }
        }

        let loop_start = attr.now();
        for repetition in 0..requested {
            let t0 = attr.now();
            let outcome = kind
                .timed_stages()
                .iter()
                .try_for_each(|&stage| driver.stage(stage));
            let t1 = attr.now();

            let all_ok = agree(&comm, outcome.is_ok());
            match outcome {
                Err(StageError::Rejected { stage }) => {
                    tracing::debug!(rank = comm.rank(), %stage, repetition, "repetition failed");
                    return Err(PerfError::StageFailed { stage, repetition });
                }
                Err(StageError::OutOfOrder { stage, state }) => {
                    return Err(PerfError::OutOfOrder { stage, state });
                }
                Ok(()) if !all_ok => return Err(PerfError::PeerFailed { repetition }),
                Ok(()) => {}
            }
            samples.push((t1 - t0).max(0.0));

            if repetition + 1 < requested {
                let over = attr.now() - loop_start > attr.max_time;
                if comm.broadcast_value(u8::from(over), 0) == 1 {
                    tracing::debug!(
                        completed = repetition + 1,
                        requested,
                        max_time = attr.max_time,
                        "time limit reached"
                    );
                    stop = StopReason::TimeLimit;
                    break;
                }
            }
        }

        tracing::debug!(
            rank = comm.rank(),
            kind = %kind,
            samples = samples.len(),
            traffic = ?comm.traffic(),
            "benchmark finished"
        );

        Ok(comm.is_root().then(|| PerfResults {
            kind,
            samples,
            requested,
            stop,
        }))
    }
}

/// Whether `ok` holds on every rank
fn agree(comm: &Communicator, ok: bool) -> bool {
    comm.all_reduce_value(u8::from(ok), ReduceOp::Min) == 1
}
