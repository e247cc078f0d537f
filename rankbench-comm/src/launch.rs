//! Process group launcher
//!
//! Rank 0 is the calling process. Ranks `1..size` are fresh copies of a
//! program started with their pipe ends inherited and described in the
//! environment (see `pipe`).

use crate::affinity::{available_cpus, pin_to_cpu};
use crate::error::CommError;
use crate::pipe::{ENV_PEER_FDS, ENV_PIN_CPU, ENV_RANK, ENV_SIZE, PipeTransport, mesh_links};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

/// How to start a process group
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Number of ranks, including the calling process
    pub size: usize,
    /// Program every child rank runs
    pub program: PathBuf,
    /// Arguments passed to every child rank
    pub args: Vec<String>,
    /// Pin rank `r` to cpu `r % available_cpus()`
    pub pin_cpus: bool,
}

impl LaunchOptions {
    /// Re-run the current executable with `args`
    pub fn current_exe(size: usize, args: Vec<String>) -> Result<Self, CommError> {
        Ok(Self {
            size,
            program: std::env::current_exe()?,
            args,
            pin_cpus: false,
        })
    }

    /// Start the child ranks and return rank 0's transport.
    ///
    /// Returns once every child has completed its handshake.
    pub fn launch(&self) -> Result<(ProcessGroup, PipeTransport), CommError> {
        let size = self.size.max(1);
        let mut links = mesh_links(size)?.into_iter();
        let own_links = links.next().unwrap_or_default();
        let cpus = available_cpus();

        if self.pin_cpus {
            if let Err(e) = pin_to_cpu(0) {
                tracing::warn!(rank = 0, error = %e, "could not pin rank to cpu");
            }
        }

        let mut group = ProcessGroup {
            children: Vec::with_capacity(size - 1),
        };
        for (offset, child_links) in links.enumerate() {
            let rank = offset + 1;
            let inherited: Vec<RawFd> = child_links
                .iter()
                .flat_map(|link| [link.read.as_raw_fd(), link.write.as_raw_fd()])
                .collect();
            let peer_fds = child_links
                .iter()
                .map(|link| link.describe())
                .collect::<Vec<_>>()
                .join(",");

            let mut command = Command::new(&self.program);
            command
                .args(&self.args)
                .env(ENV_RANK, rank.to_string())
                .env(ENV_SIZE, size.to_string())
                .env(ENV_PEER_FDS, peer_fds)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::inherit());
            if self.pin_cpus {
                command.env(ENV_PIN_CPU, (rank % cpus).to_string());
            }

            // In the child: keep exactly this rank's pipe ends across exec
            unsafe {
                command.pre_exec(move || {
                    for &fd in &inherited {
                        let flags = libc::fcntl(fd, libc::F_GETFD);
                        if flags < 0
                            || libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                        {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                    Ok(())
                });
            }

            let child = command.spawn()?;
            tracing::debug!(rank, pid = child.id(), "spawned rank");
            group.children.push((rank, child));
            // The parent's copies of the child's ends close here, so the child's
            // exit is seen as end-of-stream by its peers
            drop(child_links);
        }

        let mut transport = PipeTransport::from_links(0, size, own_links);
        transport.await_handshakes()?;
        tracing::debug!(size, "process group ready");
        Ok((group, transport))
    }
}

/// Exit status of one child rank
#[derive(Debug, Clone, Copy)]
pub struct RankExit {
    /// Rank of the child
    pub rank: usize,
    /// How it exited
    pub status: ExitStatus,
}

impl RankExit {
    /// Whether the rank exited with status 0
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Child ranks of a launched group
pub struct ProcessGroup {
    children: Vec<(usize, Child)>,
}

impl ProcessGroup {
    /// Number of child ranks (the group size minus one)
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the group has no child ranks
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// OS process ids by rank
    pub fn pids(&self) -> Vec<(usize, u32)> {
        self.children
            .iter()
            .map(|(rank, child)| (*rank, child.id()))
            .collect()
    }

    /// Block until every child rank has exited
    pub fn wait(&mut self) -> Result<Vec<RankExit>, CommError> {
        let mut exits = Vec::with_capacity(self.children.len());
        for (rank, child) in &mut self.children {
            let status = child.wait()?;
            if !status.success() {
                tracing::debug!(rank = *rank, %status, "rank exited with failure");
            }
            exits.push(RankExit {
                rank: *rank,
                status,
            });
        }
        Ok(exits)
    }
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn is_alive(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(None))
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let mut survivors = false;
        for (_, child) in &mut self.children {
            if is_alive(child) {
                let _ = send_sigterm(child.id());
                survivors = true;
            }
        }
        if !survivors {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
        for (rank, child) in &mut self.children {
            if is_alive(child) {
                tracing::debug!(rank = *rank, "killing rank");
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}
