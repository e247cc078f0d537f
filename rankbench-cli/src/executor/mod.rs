//! Task Executor
//!
//! Runs the planned tasks on one rank of the group and turns rank 0's
//! outcomes into a report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! TaskDef (registered via register_task!)
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Every rank drives every task in plan order
//! └──────┬──────┘
//!        │  rank 0 only
//!        ▼
//! ┌─────────────┐
//! │   report    │  Summarise outcomes into records (parallel)
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - Per-rank task execution, benchmark and check modes
//! - [`report`] - Record and report building

mod execution;
mod report;

pub use execution::{ExecutionConfig, Executor, RankRun, TaskOutcome};
pub use report::build_report;
