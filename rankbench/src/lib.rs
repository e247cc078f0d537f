#![warn(missing_docs)]
//! # rankbench
//!
//! Task lifecycle and distributed benchmarking harness.
//!
//! rankbench drives small computational tasks through a fixed lifecycle and
//! times them, on one rank or across a group of cooperating ranks:
//! - **Lifecycle**: `validate → preprocess → compute → postprocess`, each a
//!   `bool`-returning stage on the `Task` trait, enforced by the `Driver`
//! - **Typed descriptors**: `TaskData` buffers read through bounds-checked,
//!   typed views
//! - **Process groups**: `Communicator` with barrier, broadcast, scatter(v),
//!   gather(v) and reductions, over threads or a pipe mesh of processes
//! - **Benchmarking**: `Perf` repeats the selected stages under a wall-clock
//!   ceiling and reports the minimum sample from rank 0
//! - **Reporting**: a stable `name:mode:seconds` line, human and JSON reports
//!
//! ## Quick Start
//!
//! ```ignore
//! use rankbench::prelude::*;
//!
//! struct Sum { data: SharedTaskData, total: i32 }
//!
//! impl Task for Sum {
//!     fn validate(&mut self) -> bool { self.data.read().outputs_count == [1] }
//!     fn preprocess(&mut self) -> bool { true }
//!     fn compute(&mut self) -> bool {
//!         self.total = self.data.read().input::<i32>(0).map_or(0, |v| v.iter().sum());
//!         true
//!     }
//!     fn postprocess(&mut self) -> bool {
//!         self.data.write().output_mut::<i32>(0).map(|out| out[0] = self.total).is_some()
//!     }
//! }
//!
//! let data: SharedTaskData = TaskData::new()
//!     .with_input(vec![1, 2, 3, 4, 5])
//!     .with_output::<i32>(1)
//!     .into();
//! let mut task = Sum { data: data.clone(), total: 0 };
//! let results = Perf::new(&mut task).pipeline_run(&PerfAttr::default())?;
//! ```
//!
//! ## Plug-in Binaries
//!
//! ```ignore
//! register_task! {
//!     id: "vector_sum_seq",
//!     group: "vector_sum",
//!     variant: "seq",
//!     data: sum_input,
//!     build: build_sum_seq,
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     rankbench::run()
//! }
//! ```

// Re-export core types
pub use rankbench_core::{
    Buffer, BufferElement, DEFAULT_MAX_TIME, DEFAULT_NUM_RUNNING, Driver, Perf, PerfAttr,
    PerfError, PerfResults, RunKind, SharedTaskData, Stage, StageError, StageTimings,
    StopReason, Task, TaskData, TaskDef, TaskState, TestingMode, Timer, TimerFn, find_task,
    monotonic_seconds, registered_tasks, run_once,
};

// Re-export the registration macro
pub use rankbench_core::register_task;

// Re-export the coordinator
pub use rankbench_comm::{
    CommError, Communicator, Element, ElementType, Partition, ReduceOp, Traffic, Transport,
    run_local_group, run_ranks,
};
#[cfg(unix)]
pub use rankbench_comm::{LaunchOptions, PipeTransport, ProcessGroup};

// Re-export stats
pub use rankbench_stats::{SampleSummary, compute_summary, minimum};

// Re-export reporting
pub use rankbench_report::{NO_DATA, OutputFormat, Report, format_perf_line, write_perf_line};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BufferElement, Communicator, Element, Perf, PerfAttr, PerfResults, ReduceOp, RunKind,
        SharedTaskData, Task, TaskData, TestingMode, register_task, run_once,
    };
}

/// Run the rankbench CLI harness.
///
/// Call this from your plug-in binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     rankbench::run()
/// }
/// ```
pub use rankbench_cli::run;
