//! Pipe-mesh transport: every rank is a process
//!
//! Each ordered pair of ranks owns one unidirectional pipe. Child ranks find
//! their pipe ends through environment variables set by the launcher:
//!
//! ```text
//! RANKBENCH_RANK=2
//! RANKBENCH_SIZE=3
//! RANKBENCH_PEER_FDS=0:7:10,1:8:11     # peer:read_fd:write_fd
//! RANKBENCH_PIN_CPU=2                  # optional
//! ```

use crate::affinity::pin_to_cpu;
use crate::error::CommError;
use crate::transport::Transport;
use rankbench_ipc::{Envelope, FrameReader, FrameWriter, Handshake, PROTOCOL_VERSION, WireMessage};
use std::env;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// Rank of a child process
pub const ENV_RANK: &str = "RANKBENCH_RANK";
/// Group size seen by a child process
pub const ENV_SIZE: &str = "RANKBENCH_SIZE";
/// Pipe ends inherited by a child process
pub const ENV_PEER_FDS: &str = "RANKBENCH_PEER_FDS";
/// CPU a child process pins itself to
pub const ENV_PIN_CPU: &str = "RANKBENCH_PIN_CPU";

/// Whether this process was started by the launcher as a child rank
pub fn is_child_rank() -> bool {
    env::var_os(ENV_RANK).is_some()
}

/// One rank's ends of the two pipes it shares with `peer`
pub(crate) struct Link {
    pub(crate) peer: usize,
    pub(crate) read: OwnedFd,
    pub(crate) write: OwnedFd,
}

impl Link {
    pub(crate) fn describe(&self) -> String {
        format!(
            "{}:{}:{}",
            self.peer,
            self.read.as_raw_fd(),
            self.write.as_raw_fd()
        )
    }
}

/// Create a pipe pair with close-on-exec set on both ends, returning (read, write).
fn create_pipe() -> Result<(OwnedFd, OwnedFd), std::io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: pipe() just returned two fresh descriptors we exclusively own
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    // The launcher clears the flag on exactly the ends each child needs
    for fd in [read.as_raw_fd(), write.as_raw_fd()] {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((read, write))
}

/// All pipes of a `size`-rank mesh, grouped by the rank that holds each end
pub(crate) fn mesh_links(size: usize) -> Result<Vec<Vec<Link>>, CommError> {
    let mut links: Vec<Vec<Link>> = (0..size).map(|_| Vec::new()).collect();
    for low in 0..size {
        for high in low + 1..size {
            let (up_read, up_write) = create_pipe()?;
            let (down_read, down_write) = create_pipe()?;
            links[low].push(Link {
                peer: high,
                read: down_read,
                write: up_write,
            });
            links[high].push(Link {
                peer: low,
                read: up_read,
                write: down_write,
            });
        }
    }
    Ok(links)
}

/// One rank's end of a pipe mesh
pub struct PipeTransport {
    rank: usize,
    size: usize,
    readers: Vec<Option<FrameReader<File>>>,
    writers: Vec<Option<FrameWriter<File>>>,
}

impl PipeTransport {
    pub(crate) fn from_links(rank: usize, size: usize, links: Vec<Link>) -> Self {
        let mut readers: Vec<Option<FrameReader<File>>> = (0..size).map(|_| None).collect();
        let mut writers: Vec<Option<FrameWriter<File>>> = (0..size).map(|_| None).collect();
        for link in links {
            readers[link.peer] = Some(FrameReader::new(File::from(link.read)));
            writers[link.peer] = Some(FrameWriter::new(File::from(link.write)));
        }
        Self {
            rank,
            size,
            readers,
            writers,
        }
    }

    /// Build a complete `size`-rank mesh inside this process, indexed by rank.
    ///
    /// The transports behave exactly as in a launched group; run them on
    /// threads (e.g. with `run_ranks`).
    pub fn mesh(size: usize) -> Result<Vec<PipeTransport>, CommError> {
        let size = size.max(1);
        Ok(mesh_links(size)?
            .into_iter()
            .enumerate()
            .map(|(rank, links)| Self::from_links(rank, size, links))
            .collect())
    }

    /// Join the group this process was launched into.
    ///
    /// Returns `Ok(None)` when the process is not a child rank. On success
    /// the handshake has already been sent to rank 0.
    pub fn from_env() -> Result<Option<Self>, CommError> {
        if !is_child_rank() {
            return Ok(None);
        }
        let rank: usize = parse_var(ENV_RANK)?;
        let size: usize = parse_var(ENV_SIZE)?;
        if rank == 0 || rank >= size {
            return Err(CommError::InvalidRank { rank, size });
        }

        let spec = env::var(ENV_PEER_FDS)
            .map_err(|_| CommError::Environment(format!("{ENV_PEER_FDS} is not set")))?;
        let links = parse_peer_fds(&spec, rank, size)?;

        if let Ok(cpu) = env::var(ENV_PIN_CPU) {
            match cpu.parse::<usize>() {
                Ok(cpu) => {
                    if let Err(e) = pin_to_cpu(cpu) {
                        tracing::warn!(rank, cpu, error = %e, "could not pin rank to cpu");
                    }
                }
                Err(_) => {
                    return Err(CommError::Environment(format!(
                        "{ENV_PIN_CPU}={cpu:?} is not a cpu index"
                    )));
                }
            }
        }

        // SAFETY: the launcher handed these descriptors to this process alone
        let links = links
            .into_iter()
            .map(|(peer, read, write)| unsafe {
                Link {
                    peer,
                    read: OwnedFd::from_raw_fd(read),
                    write: OwnedFd::from_raw_fd(write),
                }
            })
            .collect();

        let mut transport = Self::from_links(rank, size, links);
        transport.announce()?;
        tracing::debug!(rank, size, "joined process group");
        Ok(Some(transport))
    }

    /// Send this rank's handshake to rank 0
    fn announce(&mut self) -> Result<(), CommError> {
        let hello = WireMessage::Hello(Handshake::new(self.rank, self.size));
        self.writer(0)?
            .write(&hello)
            .map_err(|e| CommError::frame(0, e))
    }

    /// On rank 0: read and check the handshake of every child rank
    pub(crate) fn await_handshakes(&mut self) -> Result<(), CommError> {
        for peer in 1..self.size {
            let message: WireMessage = self
                .reader(peer)?
                .read()
                .map_err(|e| CommError::frame(peer, e))?;
            let hello = match message {
                WireMessage::Hello(hello) => hello,
                WireMessage::Data(_) => {
                    return Err(CommError::Protocol(format!(
                        "rank {peer} sent data before its handshake"
                    )));
                }
            };
            if hello.protocol_version != PROTOCOL_VERSION {
                return Err(CommError::Protocol(format!(
                    "rank {peer} speaks protocol version {}, expected {PROTOCOL_VERSION}",
                    hello.protocol_version
                )));
            }
            if hello.rank as usize != peer || hello.size as usize != self.size {
                return Err(CommError::Protocol(format!(
                    "rank {peer} announced itself as rank {} of {}",
                    hello.rank, hello.size
                )));
            }
            tracing::debug!(rank = peer, pid = hello.pid, "rank joined");
        }
        Ok(())
    }

    fn reader(&mut self, peer: usize) -> Result<&mut FrameReader<File>, CommError> {
        let size = self.size;
        self.readers
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or(CommError::InvalidRank { rank: peer, size })
    }

    fn writer(&mut self, peer: usize) -> Result<&mut FrameWriter<File>, CommError> {
        let size = self.size;
        self.writers
            .get_mut(peer)
            .and_then(Option::as_mut)
            .ok_or(CommError::InvalidRank { rank: peer, size })
    }
}

impl Transport for PipeTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, envelope: Envelope) -> Result<(), CommError> {
        self.writer(dest)?
            .write(&WireMessage::Data(envelope))
            .map_err(|e| CommError::frame(dest, e))
    }

    fn recv(&mut self, source: usize) -> Result<Envelope, CommError> {
        let message: WireMessage = self
            .reader(source)?
            .read()
            .map_err(|e| CommError::frame(source, e))?;
        match message {
            WireMessage::Data(envelope) => Ok(envelope),
            WireMessage::Hello(_) => Err(CommError::Protocol(format!(
                "unexpected handshake from rank {source}"
            ))),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<T, CommError> {
    let value = env::var(name).map_err(|_| CommError::Environment(format!("{name} is not set")))?;
    value
        .parse()
        .map_err(|_| CommError::Environment(format!("{name}={value:?} is not a number")))
}

/// Parse `peer:read:write,...`, requiring exactly one entry per other rank
fn parse_peer_fds(
    spec: &str,
    rank: usize,
    size: usize,
) -> Result<Vec<(usize, RawFd, RawFd)>, CommError> {
    let malformed = || CommError::Environment(format!("{ENV_PEER_FDS}={spec:?} is malformed"));
    let mut seen = vec![false; size];
    let mut links = Vec::with_capacity(size.saturating_sub(1));

    for entry in spec.split(',').filter(|entry| !entry.is_empty()) {
        let mut parts = entry.split(':');
        let (Some(peer), Some(read), Some(write), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let peer: usize = peer.parse().map_err(|_| malformed())?;
        let read: RawFd = read.parse().map_err(|_| malformed())?;
        let write: RawFd = write.parse().map_err(|_| malformed())?;

        if peer >= size || peer == rank {
            return Err(CommError::InvalidRank { rank: peer, size });
        }
        if std::mem::replace(&mut seen[peer], true) {
            return Err(malformed());
        }
        links.push((peer, read, write));
    }

    if links.len() != size - 1 {
        return Err(CommError::Environment(format!(
            "{ENV_PEER_FDS} lists {} peers, expected {}",
            links.len(),
            size - 1
        )));
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ReduceOp;
    use crate::local::run_ranks;
    use crate::partition::Partition;

    #[test]
    fn test_parse_peer_fds() {
        let links = parse_peer_fds("0:7:10,2:8:11", 1, 3).unwrap();
        assert_eq!(links, vec![(0, 7, 10), (2, 8, 11)]);
    }

    #[test]
    fn test_parse_peer_fds_rejects_bad_input() {
        assert!(parse_peer_fds("0:7", 1, 2).is_err());
        assert!(parse_peer_fds("0:7:x", 1, 2).is_err());
        assert!(parse_peer_fds("1:7:8", 1, 2).is_err());
        assert!(parse_peer_fds("0:7:8,0:9:10", 1, 3).is_err());
        assert!(parse_peer_fds("0:7:8", 1, 3).is_err());
    }

    #[test]
    fn test_mesh_links_pair_up() {
        let links = mesh_links(3).unwrap();
        for (rank, own) in links.iter().enumerate() {
            let mut peers: Vec<usize> = own.iter().map(|link| link.peer).collect();
            peers.sort_unstable();
            let expected: Vec<usize> = (0..3).filter(|&peer| peer != rank).collect();
            assert_eq!(peers, expected);
        }
        assert!(links[0][0].describe().starts_with("1:"));
    }

    #[test]
    fn test_handshake_over_mesh() {
        let mut mesh = PipeTransport::mesh(3).unwrap();
        for child in mesh.iter_mut().skip(1) {
            child.announce().unwrap();
        }
        mesh[0].await_handshakes().unwrap();
    }

    #[test]
    fn test_data_before_handshake_is_rejected() {
        let mut mesh = PipeTransport::mesh(2).unwrap();
        let envelope = Envelope {
            source: 1,
            tag: 0,
            payload: vec![1],
        };
        mesh[1].send(0, envelope).unwrap();
        assert!(matches!(
            mesh[0].await_handshakes(),
            Err(CommError::Protocol(_))
        ));
    }

    #[test]
    fn test_closed_peer_reads_as_disconnect() {
        let mut mesh = PipeTransport::mesh(2).unwrap();
        let second = mesh.pop().unwrap();
        drop(second);
        assert!(matches!(
            mesh[0].recv(1),
            Err(CommError::Disconnected { peer: 1 })
        ));
    }

    #[test]
    fn test_scatter_gather_over_pipes() {
        for len in 0..=12usize {
            for size in 1..=len + 1 {
                let results = run_ranks(PipeTransport::mesh(size).unwrap(), |comm| {
                    let source: Vec<f64> = if comm.is_root() {
                        (0..len).map(|v| v as f64).collect()
                    } else {
                        Vec::new()
                    };
                    let chunk = comm.scatter(&source, 0);
                    assert_eq!(
                        chunk.len(),
                        Partition::even(len, comm.size()).range(comm.rank()).len()
                    );
                    comm.gather(&chunk, 0)
                });
                let expected: Vec<f64> = (0..len).map(|v| v as f64).collect();
                assert_eq!(results[0].as_ref(), Some(&expected), "len={len} size={size}");
            }
        }
    }

    #[test]
    fn test_all_reduce_over_pipes() {
        let results = run_ranks(PipeTransport::mesh(4).unwrap(), |comm| {
            comm.barrier();
            comm.all_reduce_value(comm.rank() as u64 + 1, ReduceOp::Sum)
        });
        assert_eq!(results, vec![10, 10, 10, 10]);
    }

    #[test]
    fn test_large_broadcast_over_pipes() {
        // Larger than a pipe buffer, so writes block until the peer reads
        let results = run_ranks(PipeTransport::mesh(3).unwrap(), |comm| {
            let mut data = if comm.is_root() {
                (0..100_000u32).collect()
            } else {
                Vec::new()
            };
            comm.broadcast(&mut data, 0);
            data.iter().map(|&v| v as u64).sum::<u64>()
        });
        let expected: u64 = (0..100_000u64).sum();
        assert!(results.iter().all(|&sum| sum == expected));
    }
}
