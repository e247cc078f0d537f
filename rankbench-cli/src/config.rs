//! Configuration loading from rankbench.toml
//!
//! The configuration is discovered by walking up from the current directory.
//! Command-line flags override every value found here.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "rankbench.toml";

/// rankbench configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RankBenchConfig {
    /// Repetition settings
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Process group settings
    #[serde(default)]
    pub group: GroupConfig,
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// How ranks are realised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// One OS process per rank, joined by pipes (default)
    #[default]
    Process,
    /// One thread per rank inside this process
    Threads,
}

impl TransportKind {
    /// Name used in reports and flags
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Process => "process",
            TransportKind::Threads => "threads",
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "process" | "processes" => Ok(TransportKind::Process),
            "thread" | "threads" => Ok(TransportKind::Threads),
            other => Err(format!("Unknown transport: {}", other)),
        }
    }
}

/// Repetition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Repetitions per task
    #[serde(default = "default_num_running")]
    pub num_running: usize,
    /// Ceiling on each task's repetition loop (e.g., "10s", "500ms")
    #[serde(default = "default_max_time")]
    pub max_time: String,
    /// Timed stages: "pipeline", "task" or "compute"
    #[serde(default = "default_mode")]
    pub mode: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_running: default_num_running(),
            max_time: default_max_time(),
            mode: default_mode(),
        }
    }
}

fn default_num_running() -> usize {
    rankbench_core::DEFAULT_NUM_RUNNING
}
fn default_max_time() -> String {
    "10s".to_string()
}
fn default_mode() -> String {
    "pipeline".to_string()
}

/// Process group settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Number of ranks
    #[serde(default = "default_ranks")]
    pub ranks: usize,
    /// "process" or "threads"
    #[serde(default)]
    pub transport: TransportKind,
    /// Pin each rank to its own CPU
    #[serde(default)]
    pub pin_cpus: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            ranks: default_ranks(),
            transport: TransportKind::default(),
            pin_cpus: false,
        }
    }
}

fn default_ranks() -> usize {
    1
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: "human", "json" or "line"
    #[serde(default = "default_format")]
    pub format: String,
    /// Output directory for reports
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "human".to_string()
}
fn default_output_dir() -> String {
    "target/rankbench".to_string()
}

impl RankBenchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), error = %e, "ignoring invalid config");
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# rankbench Configuration

[runner]
# Repetitions per task
num_running = 5
# Ceiling on the repeated-run phase of each task
max_time = "10s"
# Timed stages: "pipeline" (every stage), "task" (compute + postprocess)
# or "compute" (compute only)
mode = "pipeline"

[group]
# Number of ranks
ranks = 1
# "process" (one OS process per rank) or "threads"
transport = "process"
# Pin rank r to CPU r
pin_cpus = false

[output]
# Default output format: human, json, line
format = "human"
# Output directory for reports
directory = "target/rankbench"
"#
        .to_string()
    }

    /// Parse duration string (e.g., "3s", "500ms", "2m") to seconds
    pub fn parse_duration(s: &str) -> anyhow::Result<f64> {
        let s = s.trim();
        if s.is_empty() {
            return Err(anyhow::anyhow!("Empty duration string"));
        }

        // Find where the number ends and unit begins
        let (num_part, unit_part) = s
            .char_indices()
            .find(|(_, c)| c.is_alphabetic())
            .map(|(i, _)| s.split_at(i))
            .unwrap_or((s, "s"));

        let value: f64 = num_part
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid duration number: {}", num_part))?;
        if !value.is_finite() || value < 0.0 {
            return Err(anyhow::anyhow!("Duration must be a non-negative number: {}", s));
        }

        let seconds_per_unit = match unit_part.to_lowercase().as_str() {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" | "" => 1.0,
            "m" | "min" => 60.0,
            _ => return Err(anyhow::anyhow!("Unknown duration unit: {}", unit_part)),
        };

        Ok(value * seconds_per_unit)
    }
}
