#![warn(missing_docs)]
//! rankbench Report - Result Reporting
//!
//! Pure formatting of benchmark results. Nothing here knows about ranks:
//! callers only report from rank 0.
//! - Line: one stable `name:mode:seconds` line per task
//! - Human: grouped terminal output with summaries
//! - JSON: machine-readable report with metadata

mod format;
mod json;
mod report;

pub use format::{
    NO_DATA, format_human_report, format_line_report, format_perf_line, format_seconds,
    write_perf_line,
};
pub use json::{generate_json_report, parse_json_report};
pub use report::{
    FailureInfo, PerfRecord, RecordStatus, Report, ReportConfig, ReportMeta, ReportSummary,
    SCHEMA_VERSION, SystemInfo,
};

use serde::{Deserialize, Serialize};

/// Output format selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Human,
    /// JSON with full schema
    Json,
    /// One stable line per task
    Line,
}

impl OutputFormat {
    /// Render `report` in this format
    pub fn render(self, report: &Report) -> Result<String, serde_json::Error> {
        match self {
            OutputFormat::Human => Ok(format_human_report(report)),
            OutputFormat::Json => generate_json_report(report),
            OutputFormat::Line => Ok(format_line_report(report)),
        }
    }

    /// Conventional file extension
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Human | OutputFormat::Line => "txt",
            OutputFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            "line" | "lines" => Ok(OutputFormat::Line),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
