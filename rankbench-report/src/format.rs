//! Text Output
//!
//! The one-line rendering is a stable contract that scripts grep for:
//!
//! ```text
//! <name>:<mode label>:<seconds, 10 decimals>
//! <name>:<mode label>:no data
//! ```
//!
//! The human report is for terminals and carries no stability promise.

use crate::report::{PerfRecord, RecordStatus, Report};
use rankbench_core::PerfResults;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Rendering of a missing measurement
pub const NO_DATA: &str = "no data";

/// Stable one-line rendering of a benchmark result
pub fn format_perf_line(name: &str, results: &PerfResults) -> String {
    perf_line(name, results.kind.label(), results.time_sec())
}

/// Write `format_perf_line` and a newline to `sink`
pub fn write_perf_line<W: Write>(
    sink: &mut W,
    name: &str,
    results: &PerfResults,
) -> io::Result<()> {
    writeln!(sink, "{}", format_perf_line(name, results))
}

/// One line per record, in the `format_perf_line` layout
pub fn format_line_report(report: &Report) -> String {
    report
        .records
        .iter()
        .map(|record| perf_line(&record.id, record.kind.label(), record.time_sec) + "\n")
        .collect()
}

fn perf_line(name: &str, label: &str, time_sec: Option<f64>) -> String {
    match time_sec {
        Some(seconds) => format!("{name}:{label}:{seconds:.10}"),
        None => format!("{name}:{label}:{NO_DATA}"),
    }
}

/// Seconds scaled to a readable unit
pub fn format_seconds(seconds: f64) -> String {
    let abs = seconds.abs();
    if abs >= 1.0 {
        format!("{seconds:.3} s")
    } else if abs >= 1e-3 {
        format!("{:.3} ms", seconds * 1e3)
    } else if abs >= 1e-6 {
        format!("{:.3} µs", seconds * 1e6)
    } else {
        format!("{:.1} ns", seconds * 1e9)
    }
}

fn status_icon(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::Passed => "✓",
        RecordStatus::Failed => "✗",
        RecordStatus::Crashed => "💥",
        RecordStatus::TimedOut => "⏱",
    }
}

/// Format a report for terminal display, grouped by task group
pub fn format_human_report(report: &Report) -> String {
    let mut output = String::new();
    let rule = "-".repeat(60);

    output.push('\n');
    output.push_str("rankbench Results\n");
    output.push_str(&"=".repeat(60));
    output.push('\n');
    let config = &report.meta.config;
    let _ = writeln!(
        output,
        "ranks: {} ({})  mode: {}  repetitions: {}  max time: {} s\n",
        config.ranks, config.transport, config.mode, config.num_running, config.max_time_sec
    );

    let mut groups: BTreeMap<&str, Vec<&PerfRecord>> = BTreeMap::new();
    for record in &report.records {
        groups.entry(&record.group).or_default().push(record);
    }

    for (group, records) in groups {
        let _ = writeln!(output, "Group: {group}");
        output.push_str(&rule);
        output.push('\n');

        for record in records {
            let time = record
                .time_sec
                .map(format_seconds)
                .unwrap_or_else(|| NO_DATA.to_string());
            let _ = writeln!(
                output,
                "  {} {} [{}]  {}: {}",
                status_icon(record.status),
                record.id,
                record.variant,
                record.kind,
                time
            );

            if let Some(summary) = &record.summary {
                let _ = writeln!(
                    output,
                    "      median: {}  mean: {}  stddev: {}",
                    format_seconds(summary.median),
                    format_seconds(summary.mean),
                    format_seconds(summary.std_dev)
                );
                let _ = writeln!(
                    output,
                    "      p90: {}  p99: {}  max: {}  samples: {}/{}",
                    format_seconds(summary.p90),
                    format_seconds(summary.p99),
                    format_seconds(summary.max),
                    summary.count,
                    record.requested
                );
            }

            if let Some(failure) = &record.failure {
                let _ = writeln!(output, "      {}: {}", failure.kind, failure.message);
            }
            output.push('\n');
        }
    }

    output.push_str("Summary\n");
    output.push_str(&rule);
    output.push('\n');
    let summary = &report.summary;
    let _ = writeln!(
        output,
        "  Total: {}  Passed: {}  Failed: {}  Crashed: {}  Timed out: {}",
        summary.total, summary.passed, summary.failed, summary.crashed, summary.timed_out
    );
    let _ = writeln!(output, "  Duration: {:.2} ms", summary.total_duration_ms);

    output
}
