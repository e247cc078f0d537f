//! Execution Driver
//!
//! Drives a task through its stages in order. `run_once` is the stateless
//! entry point; `Driver` additionally tracks the lifecycle state across
//! stage calls, which is what the benchmark runner builds on.

use crate::measure::Timer;
use crate::task::{Stage, Task, TaskState};
use std::time::Duration;
use thiserror::Error;

/// Why a stage did not run to success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StageError {
    /// The task returned `false`
    #[error("{stage} failed")]
    Rejected {
        /// Stage that returned `false`
        stage: Stage,
    },

    /// The stage is not allowed from the current state
    #[error("{stage} called out of order (task is {state:?})")]
    OutOfOrder {
        /// Stage that was refused
        stage: Stage,
        /// State the task was in
        state: TaskState,
    },
}

impl StageError {
    /// Stage the error is about
    pub fn stage(&self) -> Stage {
        match *self {
            StageError::Rejected { stage } | StageError::OutOfOrder { stage, .. } => stage,
        }
    }
}

/// Wall time of each stage of one full pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// `validate`
    pub validate: Duration,
    /// `preprocess`
    pub preprocess: Duration,
    /// `compute`
    pub compute: Duration,
    /// `postprocess`
    pub postprocess: Duration,
}

impl StageTimings {
    /// Time of `stage`
    pub fn get(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Validate => self.validate,
            Stage::Preprocess => self.preprocess,
            Stage::Compute => self.compute,
            Stage::Postprocess => self.postprocess,
        }
    }

    fn set(&mut self, stage: Stage, elapsed: Duration) {
        match stage {
            Stage::Validate => self.validate = elapsed,
            Stage::Preprocess => self.preprocess = elapsed,
            Stage::Compute => self.compute = elapsed,
            Stage::Postprocess => self.postprocess = elapsed,
        }
    }

    /// Sum over all stages
    pub fn total(&self) -> Duration {
        Stage::ALL.iter().map(|&stage| self.get(stage)).sum()
    }
}

/// Run `validate`, `preprocess`, `compute` and `postprocess` once, stopping
/// at the first stage that returns `false`.
pub fn run_once(task: &mut dyn Task) -> bool {
    Driver::new(task).run_once().is_ok()
}

/// Stage-by-stage driver over a borrowed task
pub struct Driver<'a> {
    task: &'a mut dyn Task,
    state: TaskState,
}

impl<'a> Driver<'a> {
    /// Drive `task`, starting from `Created`
    pub fn new(task: &'a mut dyn Task) -> Self {
        Self {
            task,
            state: TaskState::Created,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Run one stage if the current state allows it
    pub fn stage(&mut self, stage: Stage) -> Result<(), StageError> {
        if !self.state.accepts(stage) {
            tracing::trace!(%stage, state = ?self.state, "stage refused");
            return Err(StageError::OutOfOrder {
                stage,
                state: self.state,
            });
        }

        let ok = stage.invoke(&mut *self.task);
        tracing::trace!(%stage, ok, "stage finished");
        if ok {
            self.state = TaskState::after(stage);
            Ok(())
        } else {
            // A rejected descriptor invalidates whatever the last pass built
            if stage == Stage::Validate {
                self.state = TaskState::Created;
            }
            Err(StageError::Rejected { stage })
        }
    }

    /// Run one stage and report its wall time
    pub fn timed_stage(&mut self, stage: Stage) -> Result<Duration, StageError> {
        let timer = Timer::start();
        self.stage(stage)?;
        Ok(timer.elapsed())
    }

    /// Full pass from `validate` through `postprocess`
    pub fn run_once(&mut self) -> Result<StageTimings, StageError> {
        let mut timings = StageTimings::default();
        for stage in Stage::ALL {
            timings.set(stage, self.timed_stage(stage)?);
        }
        Ok(timings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records stage calls, failing at `fail_at` if set
    #[derive(Default)]
    struct Probe {
        calls: Vec<Stage>,
        fail_at: Option<Stage>,
    }

    impl Probe {
        fn failing_at(stage: Stage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Self::default()
            }
        }

        fn record(&mut self, stage: Stage) -> bool {
            self.calls.push(stage);
            self.fail_at != Some(stage)
        }
    }

    impl Task for Probe {
        fn validate(&mut self) -> bool {
            self.record(Stage::Validate)
        }
        fn preprocess(&mut self) -> bool {
            self.record(Stage::Preprocess)
        }
        fn compute(&mut self) -> bool {
            self.record(Stage::Compute)
        }
        fn postprocess(&mut self) -> bool {
            self.record(Stage::Postprocess)
        }
    }

    #[test]
    fn test_run_once_calls_stages_in_order() {
        let mut probe = Probe::default();
        assert!(run_once(&mut probe));
        assert_eq!(probe.calls, Stage::ALL);
    }

    #[test]
    fn test_failed_validate_stops_pass() {
        let mut probe = Probe::failing_at(Stage::Validate);
        assert!(!run_once(&mut probe));
        assert_eq!(probe.calls, vec![Stage::Validate]);
    }

    #[test]
    fn test_short_circuit_on_compute() {
        let mut probe = Probe::failing_at(Stage::Compute);
        let err = Driver::new(&mut probe).run_once().unwrap_err();
        assert_eq!(err, StageError::Rejected { stage: Stage::Compute });
        assert_eq!(
            probe.calls,
            vec![Stage::Validate, Stage::Preprocess, Stage::Compute]
        );
    }

    #[test]
    fn test_run_once_is_repeatable() {
        let mut probe = Probe::default();
        assert!(run_once(&mut probe));
        assert!(run_once(&mut probe));
        assert_eq!(probe.calls.len(), 8);
    }

    #[test]
    fn test_refuses_postprocess_before_compute() {
        let mut probe = Probe::default();
        let mut driver = Driver::new(&mut probe);
        driver.stage(Stage::Validate).unwrap();
        driver.stage(Stage::Preprocess).unwrap();
        let err = driver.stage(Stage::Postprocess).unwrap_err();
        assert!(matches!(
            err,
            StageError::OutOfOrder {
                stage: Stage::Postprocess,
                state: TaskState::PreProcessed
            }
        ));
        assert_eq!(driver.state(), TaskState::PreProcessed);
        drop(driver);
        assert_eq!(probe.calls, vec![Stage::Validate, Stage::Preprocess]);
    }

    #[test]
    fn test_failed_stage_keeps_state() {
        let mut probe = Probe::failing_at(Stage::Preprocess);
        let mut driver = Driver::new(&mut probe);
        driver.stage(Stage::Validate).unwrap();
        assert!(driver.stage(Stage::Preprocess).is_err());
        assert_eq!(driver.state(), TaskState::Validated);
    }

    /// Accepts its descriptor only on the first `validate`
    struct ValidOnce {
        validations: usize,
        computes: usize,
    }

    impl Task for ValidOnce {
        fn validate(&mut self) -> bool {
            self.validations += 1;
            self.validations == 1
        }
        fn preprocess(&mut self) -> bool {
            true
        }
        fn compute(&mut self) -> bool {
            self.computes += 1;
            true
        }
        fn postprocess(&mut self) -> bool {
            true
        }
    }

    #[test]
    fn test_failed_validate_resets_pass() {
        let mut task = ValidOnce {
            validations: 0,
            computes: 0,
        };
        let mut driver = Driver::new(&mut task);
        driver.run_once().unwrap();
        assert_eq!(driver.state(), TaskState::PostProcessed);

        assert_eq!(
            driver.stage(Stage::Validate),
            Err(StageError::Rejected {
                stage: Stage::Validate
            })
        );
        assert_eq!(driver.state(), TaskState::Created);
        assert!(matches!(
            driver.stage(Stage::Preprocess),
            Err(StageError::OutOfOrder {
                stage: Stage::Preprocess,
                state: TaskState::Created
            })
        ));
        assert!(matches!(
            driver.stage(Stage::Compute),
            Err(StageError::OutOfOrder { .. })
        ));
        drop(driver);
        assert_eq!(task.computes, 1);
    }

    #[test]
    fn test_timings_cover_every_stage() {
        let mut probe = Probe::default();
        let timings = Driver::new(&mut probe).run_once().unwrap();
        assert!(timings.total() >= timings.get(Stage::Compute));
        assert_eq!(StageError::Rejected { stage: Stage::Compute }.stage(), Stage::Compute);
    }
}
