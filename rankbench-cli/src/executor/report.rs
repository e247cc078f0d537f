//! Report Building
//!
//! Turns rank 0's outcomes into report records. Summaries are computed per
//! record in parallel with Rayon; record order follows the plan.

use super::execution::TaskOutcome;
use rankbench_report::{PerfRecord, Report, ReportConfig};
use rayon::prelude::*;

/// Build a complete Report from rank 0's outcomes
pub fn build_report(
    outcomes: &[TaskOutcome],
    config: ReportConfig,
    total_duration_ms: f64,
) -> Report {
    let records: Vec<PerfRecord> = outcomes.par_iter().map(to_record).collect();
    Report::new(config, records, total_duration_ms)
}

fn to_record(outcome: &TaskOutcome) -> PerfRecord {
    match outcome {
        TaskOutcome::Measured { def, results } => {
            PerfRecord::from_results(def.id, def.group, def.variant, results)
        }
        TaskOutcome::Failed {
            def,
            kind,
            status,
            failure,
        } => PerfRecord::failed(
            def.id,
            def.group,
            def.variant,
            *kind,
            *status,
            failure.clone(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankbench_comm::Communicator;
    use rankbench_core::{
        PerfResults, RunKind, SharedTaskData, StopReason, Task, TaskData, TaskDef,
    };
    use rankbench_report::{FailureInfo, RecordStatus};

    fn def(id: &'static str) -> &'static TaskDef {
        fn data(_: &Communicator) -> SharedTaskData {
            TaskData::new().into()
        }
        fn build(_: SharedTaskData, _: &Communicator) -> Box<dyn Task> {
            unreachable!("records never build tasks")
        }
        Box::leak(Box::new(TaskDef {
            id,
            group: "sum",
            variant: "seq",
            tags: &[],
            data,
            build,
            verify: None,
        }))
    }

    fn config() -> ReportConfig {
        ReportConfig {
            ranks: 3,
            transport: "threads".to_string(),
            mode: RunKind::Compute,
            num_running: 2,
            max_time_sec: 1.0,
        }
    }

    #[test]
    fn test_records_follow_outcome_order() {
        let outcomes = vec![
            TaskOutcome::Measured {
                def: def("b_timed"),
                results: PerfResults {
                    kind: RunKind::Compute,
                    samples: vec![0.2, 0.1],
                    requested: 2,
                    stop: StopReason::Completed,
                },
            },
            TaskOutcome::Failed {
                def: def("a_failed"),
                kind: RunKind::Compute,
                status: RecordStatus::Failed,
                failure: FailureInfo {
                    kind: "stage".to_string(),
                    message: "compute failed in repetition 0".to_string(),
                },
            },
        ];

        let report = build_report(&outcomes, config(), 5.0);
        let ids: Vec<_> = report.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["b_timed", "a_failed"]);
        assert_eq!(report.records[0].time_sec, Some(0.1));
        assert_eq!(report.summary.passed, 1);
        assert_eq!(report.summary.failed, 1);
        assert!(report.summary.has_failures());
        assert_eq!(report.meta.config, config());
    }
}
