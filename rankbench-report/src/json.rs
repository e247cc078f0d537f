//! JSON Output

use crate::report::Report;

/// Generate a prettified JSON report.
pub fn generate_json_report(report: &Report) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Read back a report written by `generate_json_report`
pub fn parse_json_report(json: &str) -> Result<Report, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{PerfRecord, ReportConfig};
    use rankbench_core::{PerfResults, RunKind, StopReason};

    #[test]
    fn test_json_report_fields() {
        let results = PerfResults {
            kind: RunKind::Task,
            samples: vec![0.5, 0.25],
            requested: 2,
            stop: StopReason::Completed,
        };
        let config = ReportConfig {
            ranks: 3,
            transport: "threads".to_string(),
            mode: RunKind::Task,
            num_running: 2,
            max_time_sec: 10.0,
        };
        let report = Report::new(
            config.clone(),
            vec![PerfRecord::from_results("sum_par", "sum", "par", &results)],
            1.0,
        );

        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["meta"]["schema_version"], 1);
        assert_eq!(value["meta"]["config"]["mode"], "task_run");
        assert_eq!(value["records"][0]["status"], "passed");
        assert_eq!(value["records"][0]["time_sec"], 0.25);

        let back = parse_json_report(&json).unwrap();
        assert_eq!(back.meta.config, config);
        assert_eq!(back.records.len(), 1);
        assert_eq!(back.records[0].id, "sum_par");
        assert_eq!(back.records[0].time_sec, Some(0.25));
    }
}
