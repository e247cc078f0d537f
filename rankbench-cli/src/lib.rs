#![warn(missing_docs)]
//! rankbench CLI Library
//!
//! This module provides the CLI for plug-in binaries. Register tasks with
//! `register_task!` and call `rankbench::run()` (or `rankbench_cli::run()`)
//! from `main` to list, benchmark or check them across a group of ranks.
//!
//! # Example
//!
//! ```ignore
//! use rankbench::prelude::*;
//!
//! register_task! {
//!     id: "vector_sum_seq",
//!     group: "vector_sum",
//!     variant: "seq",
//!     data: sum_input,
//!     build: build_sum_seq,
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     rankbench_cli::run()
//! }
//! ```
//!
//! Every rank runs the same command line: rank 0 plans, launches the other
//! ranks and reports; child ranks are started with the hidden
//! `--rank-worker` flag and walk the same plan.

mod config;
mod executor;
mod planner;
mod supervisor;

pub use config::*;
pub use executor::{ExecutionConfig, Executor, RankRun, TaskOutcome, build_report};
pub use planner::{ExecutionPlan, build_plan};
pub use supervisor::*;

use clap::{Parser, Subcommand};
use rankbench_comm::Communicator;
use rankbench_core::{RunKind, TaskDef, registered_tasks};
use rankbench_report::{OutputFormat, ReportConfig, generate_json_report};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// rankbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "rankbench")]
#[command(
    author,
    version,
    about = "rankbench - task lifecycle and distributed benchmarking harness"
)]
pub struct Cli {
    /// Optional subcommand (List, Run, Check); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Filter tasks by regex pattern on their id
    #[arg(default_value = ".*")]
    pub filter: String,

    /// Run tasks of this group only
    #[arg(long, global = true)]
    pub group: Option<String>,

    /// Filter by tag
    #[arg(long, global = true)]
    pub tag: Option<String>,

    /// Skip tasks with this tag
    #[arg(long, global = true)]
    pub skip_tag: Option<String>,

    /// Number of ranks
    #[arg(long, global = true)]
    pub ranks: Option<usize>,

    /// How ranks are realised: process or threads
    #[arg(long, global = true)]
    pub transport: Option<TransportKind>,

    /// Pin rank r to CPU r
    #[arg(long, global = true)]
    pub pin_cpus: bool,

    /// Repetitions per task
    #[arg(long, short = 'n', global = true)]
    pub num_running: Option<usize>,

    /// Ceiling on each task's repetition loop (e.g. "10s", "500ms")
    #[arg(long, global = true)]
    pub max_time: Option<String>,

    /// Timed stages: pipeline, task or compute
    #[arg(long, global = true)]
    pub mode: Option<RunKind>,

    /// Output format: human, json, line
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Save the JSON report.
    /// Optionally specify a path; defaults to <output directory>/report.json
    #[arg(long, global = true)]
    pub save_report: Option<Option<PathBuf>>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: run as a child rank (used by the launcher)
    #[arg(long, hide = true, global = true)]
    pub rank_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// List all registered tasks
    List,
    /// Benchmark tasks (default)
    Run,
    /// Run each task once and verify its output
    Check,
}

/// Effective settings: rankbench.toml values overridden by the command line
#[derive(Debug, Clone)]
pub struct Settings {
    /// Per-task execution
    pub execution: ExecutionConfig,
    /// Group shape
    pub ranks: usize,
    /// How ranks are realised
    pub transport: TransportKind,
    /// Pin ranks to CPUs
    pub pin_cpus: bool,
    /// Report rendering
    pub format: OutputFormat,
    /// Directory for saved reports
    pub output_directory: PathBuf,
}

impl Settings {
    /// Layer `cli` over `config`
    pub fn resolve(cli: &Cli, config: &RankBenchConfig) -> anyhow::Result<Self> {
        let max_time = match &cli.max_time {
            Some(flag) => RankBenchConfig::parse_duration(flag)?,
            None => RankBenchConfig::parse_duration(&config.runner.max_time)?,
        };
        let kind = match cli.mode {
            Some(kind) => kind,
            None => config.runner.mode.parse().map_err(anyhow::Error::msg)?,
        };
        let format = match cli.format {
            Some(format) => format,
            None => config.output.format.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to human output");
                OutputFormat::Human
            }),
        };

        Ok(Self {
            execution: ExecutionConfig {
                kind,
                num_running: cli.num_running.unwrap_or(config.runner.num_running),
                max_time,
                check: cli.command == Some(Commands::Check),
            },
            ranks: cli.ranks.unwrap_or(config.group.ranks),
            transport: cli.transport.unwrap_or(config.group.transport),
            pin_cpus: cli.pin_cpus || config.group.pin_cpus,
            format,
            output_directory: PathBuf::from(&config.output.directory),
        })
    }

    fn report_config(&self) -> ReportConfig {
        ReportConfig {
            ranks: self.ranks,
            transport: self.transport.name().to_string(),
            mode: self.execution.kind,
            num_running: self.execution.num_running,
            max_time_sec: self.execution.max_time,
        }
    }
}

/// Run the rankbench CLI with the process arguments.
/// This is the main entry point for plug-in binaries.
///
/// Exits the process with status 1 when any task failed, crashed or hit the
/// time ceiling.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the rankbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    // Discover rankbench.toml configuration (CLI flags override)
    let config = RankBenchConfig::discover().unwrap_or_default();
    let settings = Settings::resolve(&cli, &config)?;

    if is_rank_worker(cli.rank_worker) {
        return run_rank_worker(&cli, &settings);
    }

    match cli.command {
        Some(Commands::List) => list_tasks(&cli),
        Some(Commands::Run) | Some(Commands::Check) | None => run_tasks(&cli, &settings),
    }
}

/// Install the stderr subscriber; `RUST_LOG` overrides the default filter
fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "rankbench=debug"
        } else {
            "rankbench=info"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter registered tasks based on CLI options using the planner module.
fn plan_tasks(cli: &Cli) -> ExecutionPlan {
    let filter_re = match Regex::new(&cli.filter) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(filter = %cli.filter, error = %e, "ignoring invalid filter");
            None
        }
    };

    build_plan(
        registered_tasks(),
        filter_re.as_ref(),
        cli.group.as_deref(),
        cli.tag.as_deref(),
        cli.skip_tag.as_deref(),
    )
}

/// Body of every rank: check the plan against rank 0's, then execute it
fn rank_main(comm: Communicator, settings: &Settings, tasks: &[&'static TaskDef]) -> RankRun {
    let _span = tracing::info_span!("rank", rank = comm.rank()).entered();

    let local = vec![tasks.len() as u64, settings.execution.num_running as u64];
    let mut agreed = local.clone();
    comm.broadcast(&mut agreed, 0);
    if agreed != local {
        tracing::error!(
            ?local,
            root = ?agreed,
            "plan differs from rank 0; leaving the group"
        );
        return RankRun {
            outcomes: Vec::new(),
            crashed: true,
        };
    }

    Executor::new(settings.execution.clone(), comm).execute(tasks)
}

fn run_rank_worker(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let plan = plan_tasks(cli);
    let run = run_child(|comm| rank_main(comm, settings, &plan.tasks))?;
    if run.crashed {
        std::process::exit(1);
    }
    Ok(())
}

fn list_tasks(cli: &Cli) -> anyhow::Result<()> {
    println!("rankbench Plan:");

    let plan = plan_tasks(cli);
    let mut groups: BTreeMap<&str, Vec<&TaskDef>> = BTreeMap::new();
    for task in &plan.tasks {
        groups.entry(task.group).or_default().push(task);
    }

    for (group, tasks) in &groups {
        println!("├── group: {}", group);
        for task in tasks {
            let tags = if task.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", task.tags.join(", "))
            };
            let verify = if task.verify.is_some() { " (verified)" } else { "" };
            println!("│   ├── {} <{}>{}{}", task.id, task.variant, tags, verify);
        }
    }

    println!("{} tasks found.", plan.len());

    // Show every tag in the registry so users can discover what to filter by
    let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for task in registered_tasks() {
        for tag in task.tags {
            *tag_counts.entry(tag).or_default() += 1;
        }
    }
    if !tag_counts.is_empty() {
        let tags_display: Vec<String> = tag_counts
            .iter()
            .map(|(tag, count)| format!("{} ({})", tag, count))
            .collect();
        println!("Tags: {}", tags_display.join(", "));
    }

    Ok(())
}

fn run_tasks(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let plan = plan_tasks(cli);

    if plan.is_empty() {
        // If filtering by tag and no matches, check if the tag exists at all
        if let Some(ref tag) = cli.tag {
            let all_tags: BTreeSet<&str> = registered_tasks()
                .iter()
                .flat_map(|t| t.tags.iter().copied())
                .collect();
            if !all_tags.contains(tag.as_str()) {
                let available: Vec<&str> = all_tags.into_iter().collect();
                tracing::warn!(
                    tag = %tag,
                    available = %available.join(", "),
                    "tag not found"
                );
            }
        }
        println!("No tasks found.");
        return Ok(());
    }

    tracing::info!(
        tasks = plan.len(),
        ranks = settings.ranks,
        transport = settings.transport.name(),
        mode = %settings.execution.kind,
        check = settings.execution.check,
        "running"
    );

    let start_time = Instant::now();
    let options = GroupOptions {
        ranks: settings.ranks,
        transport: settings.transport,
        pin_cpus: settings.pin_cpus,
        child_args: std::env::args().skip(1).collect(),
    };
    let outcome = run_group(&options, |comm| rank_main(comm, settings, &plan.tasks))?;
    let total_duration_ms = start_time.elapsed().as_secs_f64() * 1000.0;

    let report = build_report(
        &outcome.root.outcomes,
        settings.report_config(),
        total_duration_ms,
    );
    let output = settings.format.render(&report)?;

    if let Some(ref path) = cli.output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        eprintln!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }

    save_report_if_needed(cli, settings, &report)?;

    for failure in &outcome.failed_ranks {
        tracing::error!(rank = failure.rank, reason = %failure.reason, "rank failed");
    }

    if report.summary.has_failures() || !outcome.failed_ranks.is_empty() {
        let summary = &report.summary;
        eprintln!(
            "\n{} failed, {} crashed, {} timed out, {} rank failure(s)",
            summary.failed,
            summary.crashed,
            summary.timed_out,
            outcome.failed_ranks.len()
        );
        std::process::exit(1);
    }

    Ok(())
}

/// Save the report as JSON if `--save-report` was passed.
fn save_report_if_needed(
    cli: &Cli,
    settings: &Settings,
    report: &rankbench_report::Report,
) -> anyhow::Result<()> {
    let Some(requested) = &cli.save_report else {
        return Ok(());
    };

    // Resolve path: CLI value > <output directory>/report.json
    let path = requested
        .clone()
        .unwrap_or_else(|| settings.output_directory.join("report.json"));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = generate_json_report(report)?;
    std::fs::write(&path, json)?;
    eprintln!("Report saved to: {}", path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rankbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_come_from_config() {
        let cli = parse(&[]);
        let settings = Settings::resolve(&cli, &RankBenchConfig::default()).unwrap();
        assert_eq!(settings.execution.kind, RunKind::Pipeline);
        assert_eq!(settings.execution.num_running, 5);
        assert_eq!(settings.execution.max_time, 10.0);
        assert!(!settings.execution.check);
        assert_eq!(settings.ranks, 1);
        assert_eq!(settings.transport, TransportKind::Process);
        assert_eq!(settings.format, OutputFormat::Human);
        assert_eq!(cli.filter, ".*");
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "sum_",
            "--ranks",
            "3",
            "--transport",
            "threads",
            "-n",
            "7",
            "--max-time",
            "500ms",
            "--mode",
            "compute",
            "--format",
            "line",
        ]);
        let mut config = RankBenchConfig::default();
        config.group.ranks = 8;
        config.runner.num_running = 2;

        let settings = Settings::resolve(&cli, &config).unwrap();
        assert_eq!(cli.filter, "sum_");
        assert_eq!(settings.ranks, 3);
        assert_eq!(settings.transport, TransportKind::Threads);
        assert_eq!(settings.execution.num_running, 7);
        assert!((settings.execution.max_time - 0.5).abs() < 1e-12);
        assert_eq!(settings.execution.kind, RunKind::Compute);
        assert_eq!(settings.format, OutputFormat::Line);
    }

    #[test]
    fn test_check_subcommand() {
        let cli = parse(&["check"]);
        assert_eq!(cli.command, Some(Commands::Check));
        let settings = Settings::resolve(&cli, &RankBenchConfig::default()).unwrap();
        assert!(settings.execution.check);
    }

    #[test]
    fn test_invalid_config_mode_is_an_error() {
        let mut config = RankBenchConfig::default();
        config.runner.mode = "warp".to_string();
        assert!(Settings::resolve(&parse(&[]), &config).is_err());
    }

    #[test]
    fn test_flags_after_subcommand() {
        let cli = parse(&["check", "--ranks", "3", "--transport", "threads"]);
        assert_eq!(cli.command, Some(Commands::Check));
        assert_eq!(cli.ranks, Some(3));
        assert_eq!(cli.transport, Some(TransportKind::Threads));
    }

    #[test]
    fn test_rank_worker_flag_is_hidden_but_accepted() {
        let cli = parse(&["--rank-worker", "run"]);
        assert!(cli.rank_worker);
        assert_eq!(cli.command, Some(Commands::Run));
    }
}
