//! Report Data Structures

use chrono::{DateTime, Utc};
use rankbench_core::{PerfResults, RunKind, StopReason};
use rankbench_stats::SampleSummary;
use serde::{Deserialize, Serialize};

/// Version of the JSON layout below
pub const SCHEMA_VERSION: u32 = 1;

/// Complete run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Where and how the run happened
    pub meta: ReportMeta,
    /// One record per task, in execution order
    pub records: Vec<PerfRecord>,
    /// Counts by status
    pub summary: ReportSummary,
}

impl Report {
    /// Report stamped with the current time
    pub fn new(config: ReportConfig, records: Vec<PerfRecord>, total_duration_ms: f64) -> Self {
        let summary = ReportSummary::from_records(&records, total_duration_ms);
        Self {
            meta: ReportMeta {
                schema_version: SCHEMA_VERSION,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                system: SystemInfo::current(),
                config,
            },
            records,
            summary,
        }
    }
}

/// Report metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMeta {
    /// `SCHEMA_VERSION` at the time of writing
    pub schema_version: u32,
    /// Harness version
    pub version: String,
    /// When the report was produced
    pub timestamp: DateTime<Utc>,
    /// Host description
    pub system: SystemInfo,
    /// Run configuration
    pub config: ReportConfig,
}

/// Run configuration captured in report metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of ranks
    pub ranks: usize,
    /// `process` or `threads`
    pub transport: String,
    /// Timed stages
    pub mode: RunKind,
    /// Repetitions requested per task
    pub num_running: usize,
    /// Ceiling on each task's repetition loop
    pub max_time_sec: f64,
}

/// Host description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Logical CPUs available to the process
    pub cpu_cores: usize,
}

impl SystemInfo {
    /// Description of this host
    pub fn current() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Outcome of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Every repetition ran and succeeded
    Passed,
    /// A stage returned `false` or the output did not verify
    Failed,
    /// A rank died or the group fell apart
    Crashed,
    /// The time ceiling cut the repetitions short
    TimedOut,
}

impl RecordStatus {
    /// Whether the status counts as a failure of the run
    pub fn is_failure(self) -> bool {
        self != RecordStatus::Passed
    }
}

/// Why a task failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Short machine-friendly kind (`stage`, `peer`, `verify`, `crash`)
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// Result of one task in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfRecord {
    /// Task id
    pub id: String,
    /// Task group
    pub group: String,
    /// Task variant
    pub variant: String,
    /// Outcome
    pub status: RecordStatus,
    /// Timed stages
    pub kind: RunKind,
    /// Repetitions requested
    pub requested: usize,
    /// Fastest repetition in seconds, `None` with no samples
    pub time_sec: Option<f64>,
    /// Every repetition in seconds
    pub samples: Vec<f64>,
    /// Distribution of `samples`
    pub summary: Option<SampleSummary>,
    /// Failure details for non-passing records
    pub failure: Option<FailureInfo>,
}

impl PerfRecord {
    /// Record of a finished benchmark run
    pub fn from_results(id: &str, group: &str, variant: &str, results: &PerfResults) -> Self {
        let status = match results.stop {
            StopReason::Completed => RecordStatus::Passed,
            StopReason::TimeLimit => RecordStatus::TimedOut,
        };
        let failure = (status == RecordStatus::TimedOut).then(|| FailureInfo {
            kind: "time_limit".to_string(),
            message: format!(
                "time limit reached after {} of {} repetitions",
                results.samples.len(),
                results.requested
            ),
        });
        Self {
            id: id.to_string(),
            group: group.to_string(),
            variant: variant.to_string(),
            status,
            kind: results.kind,
            requested: results.requested,
            time_sec: results.time_sec(),
            samples: results.samples.clone(),
            summary: results.summary(),
            failure,
        }
    }

    /// Record of a task that produced no timing
    pub fn failed(
        id: &str,
        group: &str,
        variant: &str,
        kind: RunKind,
        status: RecordStatus,
        failure: FailureInfo,
    ) -> Self {
        Self {
            id: id.to_string(),
            group: group.to_string(),
            variant: variant.to_string(),
            status,
            kind,
            requested: 0,
            time_sec: None,
            samples: Vec::new(),
            summary: None,
            failure: Some(failure),
        }
    }
}

/// Counts by status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Records in the report
    pub total: usize,
    /// `Passed` records
    pub passed: usize,
    /// `Failed` records
    pub failed: usize,
    /// `Crashed` records
    pub crashed: usize,
    /// `TimedOut` records
    pub timed_out: usize,
    /// Wall time of the whole run
    pub total_duration_ms: f64,
}

impl ReportSummary {
    /// Tally `records`
    pub fn from_records(records: &[PerfRecord], total_duration_ms: f64) -> Self {
        let mut summary = Self {
            total: records.len(),
            total_duration_ms,
            ..Self::default()
        };
        for record in records {
            match record.status {
                RecordStatus::Passed => summary.passed += 1,
                RecordStatus::Failed => summary.failed += 1,
                RecordStatus::Crashed => summary.crashed += 1,
                RecordStatus::TimedOut => summary.timed_out += 1,
            }
        }
        summary
    }

    /// Whether any record did not pass
    pub fn has_failures(&self) -> bool {
        self.passed != self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(samples: Vec<f64>, stop: StopReason) -> PerfResults {
        PerfResults {
            kind: RunKind::Compute,
            requested: 4,
            samples,
            stop,
        }
    }

    #[test]
    fn test_record_from_complete_run() {
        let record = PerfRecord::from_results(
            "sum_seq",
            "sum",
            "seq",
            &results(vec![0.3, 0.1, 0.2, 0.4], StopReason::Completed),
        );
        assert_eq!(record.status, RecordStatus::Passed);
        assert_eq!(record.time_sec, Some(0.1));
        assert_eq!(record.summary.unwrap().count, 4);
        assert!(record.failure.is_none());
    }

    #[test]
    fn test_record_from_truncated_run() {
        let record = PerfRecord::from_results(
            "sum_seq",
            "sum",
            "seq",
            &results(vec![0.3], StopReason::TimeLimit),
        );
        assert_eq!(record.status, RecordStatus::TimedOut);
        assert!(record.failure.unwrap().message.contains("1 of 4"));
    }

    #[test]
    fn test_summary_counts() {
        let passed = PerfRecord::from_results(
            "a",
            "g",
            "seq",
            &results(vec![1.0], StopReason::Completed),
        );
        let crashed = PerfRecord::failed(
            "b",
            "g",
            "par",
            RunKind::Compute,
            RecordStatus::Crashed,
            FailureInfo {
                kind: "crash".to_string(),
                message: "rank 2 exited".to_string(),
            },
        );
        let summary = ReportSummary::from_records(&[passed, crashed], 12.5);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.crashed, 1);
        assert!(summary.has_failures());
        assert!(!ReportSummary::from_records(&[], 0.0).has_failures());
    }
}
