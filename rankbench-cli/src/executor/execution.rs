//! Task Execution
//!
//! Every rank of the group walks the same plan in the same order and drives
//! each task collectively; only rank 0 keeps outcomes.
//!
//! ## Execution Modes
//!
//! - **Benchmark** (`run`): `Perf` repeats the selected stages
//!   `num_running` times under the wall-clock ceiling.
//! - **Check** (`check`): one functional lifecycle pass, then the task's
//!   `verify` hook on rank 0.
//!
//! A panic inside a task poisons the whole group: the rank records the crash
//! and stops, which drops its links so that peers blocked on it fail in turn.

use indicatif::{ProgressBar, ProgressStyle};
use rankbench_comm::{Communicator, ReduceOp};
use rankbench_core::{
    DEFAULT_MAX_TIME, DEFAULT_NUM_RUNNING, Driver, Perf, PerfAttr, PerfError, PerfResults,
    RunKind, SharedTaskData, StopReason, Task, TaskDef, TestingMode, Timer,
};
use rankbench_report::{FailureInfo, RecordStatus};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Configuration for task execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Timed stages
    pub kind: RunKind,
    /// Repetitions per task
    pub num_running: usize,
    /// Ceiling on each task's repetition loop, in seconds
    pub max_time: f64,
    /// Functional check instead of a benchmark
    pub check: bool,
}

impl ExecutionConfig {
    fn perf_attr(&self) -> PerfAttr {
        PerfAttr::new(self.num_running, self.max_time)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            kind: RunKind::Pipeline,
            num_running: DEFAULT_NUM_RUNNING,
            max_time: DEFAULT_MAX_TIME,
            check: false,
        }
    }
}

/// What rank 0 learned about one task
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task ran; `results` holds its samples
    Measured {
        /// Task that ran
        def: &'static TaskDef,
        /// Samples gathered by the runner
        results: PerfResults,
    },
    /// The task produced no timing
    Failed {
        /// Task that failed
        def: &'static TaskDef,
        /// Timed stages that were requested
        kind: RunKind,
        /// `Failed` or `Crashed`
        status: RecordStatus,
        /// What went wrong
        failure: FailureInfo,
    },
}

impl TaskOutcome {
    /// Task this outcome belongs to
    pub fn def(&self) -> &'static TaskDef {
        match self {
            TaskOutcome::Measured { def, .. } | TaskOutcome::Failed { def, .. } => def,
        }
    }
}

/// Everything one rank brings back from a run
#[derive(Debug, Default)]
pub struct RankRun {
    /// Outcomes in plan order; empty on ranks other than 0
    pub outcomes: Vec<TaskOutcome>,
    /// Whether a task panicked on this rank
    pub crashed: bool,
}

/// Drives planned tasks on one rank
pub struct Executor {
    config: ExecutionConfig,
    comm: Communicator,
}

impl Executor {
    /// Executor for the rank behind `comm`
    pub fn new(config: ExecutionConfig, comm: Communicator) -> Self {
        Self { config, comm }
    }

    /// Run every task in `tasks`, in order, on this rank
    pub fn execute(&self, tasks: &[&'static TaskDef]) -> RankRun {
        let is_root = self.comm.is_root();
        let pb = if is_root && tasks.len() > 1 {
            progress_bar(tasks.len())
        } else {
            ProgressBar::hidden()
        };

        let mut run = RankRun::default();
        for (index, &def) in tasks.iter().enumerate() {
            pb.set_message(def.id);
            tracing::debug!(task = def.id, "starting task");

            match catch_unwind(AssertUnwindSafe(|| self.execute_single(def))) {
                Ok(outcome) => run.outcomes.extend(outcome),
                Err(panic) => {
                    let message = panic_message(&*panic);
                    tracing::error!(task = def.id, %message, "task crashed");
                    run.crashed = true;
                    if is_root {
                        run.outcomes.push(self.crashed(def, message));
                        for &rest in &tasks[index + 1..] {
                            let message = format!("not run: group torn down by {}", def.id);
                            run.outcomes.push(self.crashed(rest, message));
                        }
                    }
                    break;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        run
    }

    /// Execute a single task on this rank
    fn execute_single(&self, def: &'static TaskDef) -> Option<TaskOutcome> {
        let mode = if self.config.check {
            TestingMode::Functional
        } else {
            TestingMode::Performance
        };
        let (data, mut task) = def.instantiate(&self.comm, mode);

        if self.config.check {
            return self.check(def, &data, &mut *task);
        }

        let kind = self.config.kind;
        match Perf::with_communicator(&mut *task, &self.comm).run(kind, &self.config.perf_attr()) {
            Ok(Some(results)) => Some(TaskOutcome::Measured { def, results }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(task = def.id, error = %e, "task failed");
                self.comm.is_root().then(|| TaskOutcome::Failed {
                    def,
                    kind,
                    status: RecordStatus::Failed,
                    failure: FailureInfo {
                        kind: perf_failure_kind(&e).to_string(),
                        message: e.to_string(),
                    },
                })
            }
        }
    }

    /// One functional pass on every rank, verified on rank 0
    fn check(
        &self,
        def: &'static TaskDef,
        data: &SharedTaskData,
        task: &mut dyn Task,
    ) -> Option<TaskOutcome> {
        let timer = Timer::start();
        let outcome = Driver::new(task).run_once();
        let elapsed = timer.elapsed().as_secs_f64();

        let all_ok = self.agree(outcome.is_ok());
        if !self.comm.is_root() {
            return None;
        }

        let failure = match outcome {
            Err(e) => Some(FailureInfo {
                kind: "stage".to_string(),
                message: e.to_string(),
            }),
            Ok(_) if !all_ok => Some(FailureInfo {
                kind: "peer".to_string(),
                message: "another rank failed the lifecycle pass".to_string(),
            }),
            Ok(_) if def.verify.is_some_and(|verify| !verify(data)) => Some(FailureInfo {
                kind: "verify".to_string(),
                message: "output did not verify".to_string(),
            }),
            Ok(_) => None,
        };

        Some(match failure {
            Some(failure) => TaskOutcome::Failed {
                def,
                kind: RunKind::Pipeline,
                status: RecordStatus::Failed,
                failure,
            },
            None => TaskOutcome::Measured {
                def,
                results: PerfResults {
                    kind: RunKind::Pipeline,
                    samples: vec![elapsed],
                    requested: 1,
                    stop: StopReason::Completed,
                },
            },
        })
    }

    fn crashed(&self, def: &'static TaskDef, message: String) -> TaskOutcome {
        TaskOutcome::Failed {
            def,
            kind: self.config.kind,
            status: RecordStatus::Crashed,
            failure: FailureInfo {
                kind: "crash".to_string(),
                message,
            },
        }
    }

    fn agree(&self, ok: bool) -> bool {
        self.comm.all_reduce_value(u8::from(ok), ReduceOp::Min) == 1
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn perf_failure_kind(error: &PerfError) -> &'static str {
    match error {
        PerfError::StageFailed { .. } => "stage",
        PerfError::PeerFailed { .. } => "peer",
        PerfError::Setup { .. } => "setup",
        PerfError::OutOfOrder { .. } => "lifecycle",
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankbench_comm::run_local_group;
    use rankbench_core::TaskData;

    /// Writes `rank + 1` into its output on every rank, fails compute on `fail_on`
    struct Echo {
        data: SharedTaskData,
        rank: usize,
        fail_on: Option<usize>,
        panic_on: Option<usize>,
    }

    impl Task for Echo {
        fn validate(&mut self) -> bool {
            self.data.read().outputs_count == [1]
        }
        fn preprocess(&mut self) -> bool {
            true
        }
        fn compute(&mut self) -> bool {
            if self.panic_on == Some(self.rank) {
                panic!("echo exploded on rank {}", self.rank);
            }
            self.fail_on != Some(self.rank)
        }
        fn postprocess(&mut self) -> bool {
            match self.data.write().output_mut::<i32>(0) {
                Some(out) => {
                    out[0] = self.rank as i32 + 1;
                    true
                }
                None => false,
            }
        }
    }

    fn echo_data(_comm: &Communicator) -> SharedTaskData {
        TaskData::new().with_output::<i32>(1).into()
    }

    fn leak(def: TaskDef) -> &'static TaskDef {
        Box::leak(Box::new(def))
    }

    fn echo_def(
        id: &'static str,
        build: fn(SharedTaskData, &Communicator) -> Box<dyn Task>,
        verify: Option<fn(&SharedTaskData) -> bool>,
    ) -> &'static TaskDef {
        leak(TaskDef {
            id,
            group: "echo",
            variant: "seq",
            tags: &[],
            data: echo_data,
            build,
            verify,
        })
    }

    fn healthy(data: SharedTaskData, comm: &Communicator) -> Box<dyn Task> {
        Box::new(Echo {
            data,
            rank: comm.rank(),
            fail_on: None,
            panic_on: None,
        })
    }

    fn fails_on_one(data: SharedTaskData, comm: &Communicator) -> Box<dyn Task> {
        Box::new(Echo {
            data,
            rank: comm.rank(),
            fail_on: Some(1),
            panic_on: None,
        })
    }

    fn panics_on_root(data: SharedTaskData, comm: &Communicator) -> Box<dyn Task> {
        Box::new(Echo {
            data,
            rank: comm.rank(),
            fail_on: None,
            panic_on: Some(0),
        })
    }

    fn root_wrote_one(data: &SharedTaskData) -> bool {
        data.output_vec::<i32>(0) == Some(vec![1])
    }

    fn never(_: &SharedTaskData) -> bool {
        false
    }

    fn config(check: bool) -> ExecutionConfig {
        ExecutionConfig {
            num_running: 3,
            check,
            ..ExecutionConfig::default()
        }
    }

    #[test]
    fn test_benchmark_outcomes_only_on_root() {
        let tasks = [echo_def("echo_ok", healthy, None)];
        let runs = run_local_group(3, |comm| Executor::new(config(false), comm).execute(&tasks));

        assert_eq!(runs[0].outcomes.len(), 1);
        match &runs[0].outcomes[0] {
            TaskOutcome::Measured { def, results } => {
                assert_eq!(def.id, "echo_ok");
                assert_eq!(results.samples.len(), 3);
                assert!(results.is_complete());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(runs[1..].iter().all(|run| run.outcomes.is_empty() && !run.crashed));
    }

    #[test]
    fn test_peer_failure_reported_by_root() {
        let tasks = [echo_def("echo_fail", fails_on_one, None)];
        let runs = run_local_group(2, |comm| Executor::new(config(false), comm).execute(&tasks));

        match &runs[0].outcomes[0] {
            TaskOutcome::Failed {
                status, failure, ..
            } => {
                assert_eq!(*status, RecordStatus::Failed);
                assert_eq!(failure.kind, "peer");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_check_runs_verify_on_root() {
        let tasks = [
            echo_def("echo_check_ok", healthy, Some(root_wrote_one)),
            echo_def("echo_check_bad", healthy, Some(never)),
        ];
        let runs = run_local_group(2, |comm| Executor::new(config(true), comm).execute(&tasks));

        let outcomes = &runs[0].outcomes;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], TaskOutcome::Measured { results, .. } if results.samples.len() == 1));
        match &outcomes[1] {
            TaskOutcome::Failed { failure, .. } => assert_eq!(failure.kind, "verify"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_root_panic_marks_rest_crashed() {
        let tasks = [
            echo_def("echo_a_panics", panics_on_root, None),
            echo_def("echo_b_after", healthy, None),
        ];
        let runs = run_local_group(2, |comm| Executor::new(config(false), comm).execute(&tasks));

        assert!(runs[0].crashed);
        assert!(runs[1].crashed);
        let statuses: Vec<_> = runs[0]
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                TaskOutcome::Failed { status, .. } => *status,
                TaskOutcome::Measured { .. } => RecordStatus::Passed,
            })
            .collect();
        assert_eq!(statuses, [RecordStatus::Crashed, RecordStatus::Crashed]);
        assert_eq!(runs[0].outcomes[1].def().id, "echo_b_after");
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(&*boxed), "Unknown panic");
    }
}
