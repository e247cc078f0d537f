#![warn(missing_docs)]
//! rankbench Core - Task Runtime
//!
//! This crate provides everything between a plug-in task and a timing:
//! - `TaskData` descriptors with typed, bounds-checked buffer views
//! - the `Task` lifecycle contract and its state machine
//! - `run_once` and the stage-tracking `Driver`
//! - `Perf`, the repeated-execution benchmark runner
//! - the `register_task!` registry consumed by the CLI

mod data;
mod driver;
mod measure;
mod perf;
mod registry;
mod task;

pub use data::{Buffer, BufferElement, SharedTaskData, TaskData, TestingMode};
pub use driver::{Driver, StageError, StageTimings, run_once};
pub use measure::{Timer, monotonic_seconds};
pub use perf::{
    DEFAULT_MAX_TIME, DEFAULT_NUM_RUNNING, Perf, PerfAttr, PerfError, PerfResults, RunKind,
    StopReason, TimerFn,
};
pub use registry::{REGISTRY_ANCHOR, TaskDef, find_task, registered_tasks};
pub use task::{Stage, Task, TaskState};

#[doc(hidden)]
pub use inventory;
