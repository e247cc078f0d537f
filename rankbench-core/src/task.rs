//! Task Lifecycle Contract
//!
//! Every task goes through four stages:
//!
//! ```text
//! Created ─validate→ Validated ─preprocess→ PreProcessed ─compute→ Computed ─postprocess→ PostProcessed
//! ```
//!
//! - `validate` checks the descriptor's shape and must not modify it.
//! - `preprocess` decodes inputs into private state; it fails only on
//!   structural problems.
//! - `compute` works on private state only.
//! - `postprocess` writes results into the output buffers. In a distributed
//!   task only rank 0 writes; the other ranks return `true`.
//!
//! `compute` and `postprocess` may be re-run on the same private state, which
//! is what the benchmark runner relies on.

use std::fmt;

/// The four lifecycle operations every task implements
pub trait Task {
    /// Whether the descriptor satisfies the task's preconditions
    fn validate(&mut self) -> bool;

    /// Decode the descriptor's inputs into private working state
    fn preprocess(&mut self) -> bool;

    /// Run the algorithm on private state
    fn compute(&mut self) -> bool;

    /// Write the private result into the descriptor's outputs
    fn postprocess(&mut self) -> bool;
}

impl<T: Task + ?Sized> Task for Box<T> {
    fn validate(&mut self) -> bool {
        (**self).validate()
    }

    fn preprocess(&mut self) -> bool {
        (**self).preprocess()
    }

    fn compute(&mut self) -> bool {
        (**self).compute()
    }

    fn postprocess(&mut self) -> bool {
        (**self).postprocess()
    }
}

/// One lifecycle operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `Task::validate`
    Validate,
    /// `Task::preprocess`
    Preprocess,
    /// `Task::compute`
    Compute,
    /// `Task::postprocess`
    Postprocess,
}

impl Stage {
    /// Stages of one full pass, in order
    pub const ALL: [Stage; 4] = [
        Stage::Validate,
        Stage::Preprocess,
        Stage::Compute,
        Stage::Postprocess,
    ];

    /// Lower-case name
    pub fn name(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Preprocess => "preprocess",
            Stage::Compute => "compute",
            Stage::Postprocess => "postprocess",
        }
    }

    /// Call this stage on `task`
    pub fn invoke(self, task: &mut dyn Task) -> bool {
        match self {
            Stage::Validate => task.validate(),
            Stage::Preprocess => task.preprocess(),
            Stage::Compute => task.compute(),
            Stage::Postprocess => task.postprocess(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of a task instance, as tracked by the driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Constructed, nothing run yet
    #[default]
    Created,
    /// `validate` succeeded
    Validated,
    /// `preprocess` succeeded
    PreProcessed,
    /// `compute` succeeded
    Computed,
    /// `postprocess` succeeded
    PostProcessed,
}

impl TaskState {
    /// Whether `stage` may run from this state.
    ///
    /// `validate` restarts a pass from anywhere and `preprocess` needs a
    /// successful `validate` of that pass. `compute` may repeat on stable
    /// private state; `postprocess` needs a fresh `compute`.
    pub fn accepts(self, stage: Stage) -> bool {
        match stage {
            Stage::Validate => true,
            Stage::Preprocess => matches!(self, TaskState::Validated | TaskState::PreProcessed),
            Stage::Compute => matches!(
                self,
                TaskState::PreProcessed | TaskState::Computed | TaskState::PostProcessed
            ),
            Stage::Postprocess => self == TaskState::Computed,
        }
    }

    /// State reached when `stage` succeeds
    pub fn after(stage: Stage) -> TaskState {
        match stage {
            Stage::Validate => TaskState::Validated,
            Stage::Preprocess => TaskState::PreProcessed,
            Stage::Compute => TaskState::Computed,
            Stage::Postprocess => TaskState::PostProcessed,
        }
    }
}
