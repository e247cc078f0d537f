//! Rank Supervisor
//!
//! Starts the process group for a run and collects each rank's fate.
//!
//! With the `process` transport the calling process is rank 0: it re-runs
//! its own executable once per extra rank with `--rank-worker` and the pipe
//! mesh described in the environment, then waits for every child after the
//! run. With the `threads` transport all ranks are threads of this process.

use crate::config::TransportKind;
use crate::executor::RankRun;
use rankbench_comm::{CommError, Communicator, available_cpus, pin_to_cpu, run_local_group};
use thiserror::Error;

/// Hidden flag marking a child rank's command line
pub const RANK_WORKER_FLAG: &str = "--rank-worker";

/// Failure to assemble or tear down a process group
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A group of zero ranks was requested
    #[error("a process group needs at least one rank")]
    EmptyGroup,

    /// Rank 0 could not start the child ranks
    #[error("failed to start {size} ranks: {source}")]
    Spawn {
        /// Requested group size
        size: usize,
        /// Underlying coordinator error
        #[source]
        source: CommError,
    },

    /// A child rank could not attach to the pipes it inherited
    #[error("failed to join the process group: {0}")]
    Join(#[source] CommError),

    /// `--rank-worker` without the group environment
    #[error("{RANK_WORKER_FLAG} given outside a process group")]
    NotInGroup,

    /// Rank 0 could not collect the child ranks
    #[error("failed to wait for child ranks: {0}")]
    Wait(#[source] CommError),

    /// Process groups need pipes and `fork`/`exec`
    #[error("the process transport is only available on Unix")]
    Unsupported,
}

/// How to assemble the group
#[derive(Debug, Clone)]
pub struct GroupOptions {
    /// Number of ranks
    pub ranks: usize,
    /// Threads or processes
    pub transport: TransportKind,
    /// Pin rank `r` to cpu `r % available_cpus()`
    pub pin_cpus: bool,
    /// Command line for child ranks, without the program name
    pub child_args: Vec<String>,
}

/// A rank other than 0 that did not finish cleanly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankFailure {
    /// Failing rank
    pub rank: usize,
    /// What happened to it
    pub reason: String,
}

/// Result of a whole-group run as seen by rank 0
#[derive(Debug)]
pub struct GroupOutcome {
    /// Rank 0's own run
    pub root: RankRun,
    /// Other ranks that crashed or exited with failure
    pub failed_ranks: Vec<RankFailure>,
}

/// Run `rank_main` on every rank of a new group.
///
/// `rank_main` receives the rank's communicator by value; dropping it closes
/// the rank's links, so it must not outlive the call.
pub fn run_group<F>(options: &GroupOptions, rank_main: F) -> Result<GroupOutcome, LaunchError>
where
    F: Fn(Communicator) -> RankRun + Sync,
{
    if options.ranks == 0 {
        return Err(LaunchError::EmptyGroup);
    }
    tracing::debug!(
        ranks = options.ranks,
        transport = options.transport.name(),
        "starting process group"
    );
    match options.transport {
        TransportKind::Threads => Ok(run_threads(options, rank_main)),
        TransportKind::Process => run_processes(options, rank_main),
    }
}

fn run_threads<F>(options: &GroupOptions, rank_main: F) -> GroupOutcome
where
    F: Fn(Communicator) -> RankRun + Sync,
{
    let cpus = available_cpus();
    let mut runs = run_local_group(options.ranks, |comm| {
        if options.pin_cpus {
            pin_or_warn(comm.rank(), comm.rank() % cpus);
        }
        rank_main(comm)
    })
    .into_iter();

    let root = runs.next().unwrap_or_default();
    let failed_ranks = runs
        .enumerate()
        .filter(|(_, run)| run.crashed)
        .map(|(offset, _)| RankFailure {
            rank: offset + 1,
            reason: "crashed".to_string(),
        })
        .collect();
    GroupOutcome { root, failed_ranks }
}

#[cfg(unix)]
fn run_processes<F>(options: &GroupOptions, rank_main: F) -> Result<GroupOutcome, LaunchError>
where
    F: Fn(Communicator) -> RankRun + Sync,
{
    use rankbench_comm::LaunchOptions;

    let size = options.ranks;
    let mut args = vec![RANK_WORKER_FLAG.to_string()];
    args.extend(options.child_args.iter().cloned());

    let mut launch = LaunchOptions::current_exe(size, args)
        .map_err(|source| LaunchError::Spawn { size, source })?;
    launch.pin_cpus = options.pin_cpus;
    let (mut group, transport) = launch
        .launch()
        .map_err(|source| LaunchError::Spawn { size, source })?;

    let root = rank_main(Communicator::new(transport));

    let exits = group.wait().map_err(LaunchError::Wait)?;
    let failed_ranks = exits
        .into_iter()
        .filter(|exit| !exit.success())
        .map(|exit| RankFailure {
            rank: exit.rank,
            reason: format!("exited with {}", exit.status),
        })
        .collect();
    Ok(GroupOutcome { root, failed_ranks })
}

#[cfg(not(unix))]
fn run_processes<F>(_options: &GroupOptions, _rank_main: F) -> Result<GroupOutcome, LaunchError>
where
    F: Fn(Communicator) -> RankRun + Sync,
{
    Err(LaunchError::Unsupported)
}

/// Whether this process was started as a child rank
pub fn is_rank_worker(flag: bool) -> bool {
    #[cfg(unix)]
    {
        flag || rankbench_comm::is_child_rank()
    }
    #[cfg(not(unix))]
    {
        flag
    }
}

/// Attach to the group this child rank was launched into and run `rank_main`
pub fn run_child<F>(rank_main: F) -> Result<RankRun, LaunchError>
where
    F: FnOnce(Communicator) -> RankRun,
{
    #[cfg(unix)]
    {
        let transport = rankbench_comm::PipeTransport::from_env()
            .map_err(LaunchError::Join)?
            .ok_or(LaunchError::NotInGroup)?;
        Ok(rank_main(Communicator::new(transport)))
    }
    #[cfg(not(unix))]
    {
        let _ = rank_main;
        Err(LaunchError::Unsupported)
    }
}

fn pin_or_warn(rank: usize, cpu: usize) {
    if let Err(e) = pin_to_cpu(cpu) {
        tracing::warn!(rank, cpu, error = %e, "could not pin rank to cpu");
    }
}
