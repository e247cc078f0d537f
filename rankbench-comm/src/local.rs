//! In-process transport: every rank is a thread
//!
//! Used by tests and by `--transport threads`. Sends never block (channels
//! are unbounded); receives block until the peer sends or drops its end.

use crate::communicator::Communicator;
use crate::error::CommError;
use crate::transport::Transport;
use rankbench_ipc::Envelope;
use std::sync::mpsc::{Receiver, Sender, channel};

/// One rank's end of a full mesh of channels
pub struct LocalTransport {
    rank: usize,
    size: usize,
    outboxes: Vec<Option<Sender<Envelope>>>,
    inboxes: Vec<Option<Receiver<Envelope>>>,
}

impl LocalTransport {
    /// Build the transports of a `size`-rank group, indexed by rank
    pub fn group(size: usize) -> Vec<LocalTransport> {
        let size = size.max(1);
        let mut outboxes: Vec<Vec<Option<Sender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Receiver<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in (0..size).filter(|&dst| dst != src) {
                let (tx, rx) = channel();
                outboxes[src][dst] = Some(tx);
                inboxes[dst][src] = Some(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalTransport {
                rank,
                size,
                outboxes,
                inboxes,
            })
            .collect()
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&mut self, dest: usize, envelope: Envelope) -> Result<(), CommError> {
        let outbox = self
            .outboxes
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or(CommError::InvalidRank {
                rank: dest,
                size: self.size,
            })?;
        outbox
            .send(envelope)
            .map_err(|_| CommError::Disconnected { peer: dest })
    }

    fn recv(&mut self, source: usize) -> Result<Envelope, CommError> {
        let inbox = self
            .inboxes
            .get(source)
            .and_then(Option::as_ref)
            .ok_or(CommError::InvalidRank {
                rank: source,
                size: self.size,
            })?;
        inbox
            .recv()
            .map_err(|_| CommError::Disconnected { peer: source })
    }
}

/// Run `f` once per transport, each on its own thread, and return the
/// results indexed by rank.
///
/// A panic on any rank is re-raised on the caller after every rank has
/// finished; peers blocked on the panicking rank observe a disconnect and
/// fail in turn.
pub fn run_ranks<T, F, R>(transports: Vec<T>, f: F) -> Vec<R>
where
    T: Transport + 'static,
    F: Fn(Communicator) -> R + Sync,
    R: Send,
{
    std::thread::scope(|scope| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| {
                let f = &f;
                scope.spawn(move || f(Communicator::new(transport)))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        let mut first_panic = None;
        for handle in handles {
            match handle.join() {
                Ok(value) => results.push(value),
                Err(payload) => {
                    first_panic.get_or_insert(payload);
                }
            }
        }
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }
        results
    })
}

/// Run `f` on every rank of an in-process group of `size` ranks
pub fn run_local_group<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(Communicator) -> R + Sync,
    R: Send,
{
    run_ranks(LocalTransport::group(size), f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(source: usize, tag: u32, byte: u8) -> Envelope {
        Envelope {
            source: source as u32,
            tag,
            payload: vec![byte],
        }
    }

    #[test]
    fn test_group_shape() {
        let group = LocalTransport::group(3);
        assert_eq!(group.len(), 3);
        for (rank, transport) in group.iter().enumerate() {
            assert_eq!(transport.rank(), rank);
            assert_eq!(transport.size(), 3);
            assert!(transport.outboxes[rank].is_none());
        }
    }

    #[test]
    fn test_per_pair_fifo() {
        let mut group = LocalTransport::group(2);
        let mut second = group.pop().unwrap();
        let mut first = group.pop().unwrap();

        first.send(1, envelope(0, 1, 10)).unwrap();
        first.send(1, envelope(0, 2, 20)).unwrap();

        assert_eq!(second.recv(0).unwrap().payload, vec![10]);
        assert_eq!(second.recv(0).unwrap().payload, vec![20]);
    }

    #[test]
    fn test_dropped_peer_disconnects() {
        let mut group = LocalTransport::group(2);
        let second = group.pop().unwrap();
        let mut first = group.pop().unwrap();
        drop(second);

        assert!(matches!(
            first.recv(1),
            Err(CommError::Disconnected { peer: 1 })
        ));
        assert!(matches!(
            first.send(1, envelope(0, 0, 0)),
            Err(CommError::Disconnected { peer: 1 })
        ));
    }

    #[test]
    fn test_self_link_is_invalid() {
        let mut group = LocalTransport::group(2);
        assert!(matches!(
            group[0].send(0, envelope(0, 0, 0)),
            Err(CommError::InvalidRank { rank: 0, size: 2 })
        ));
    }

    #[test]
    fn test_run_local_group_results_by_rank() {
        let ranks = run_local_group(4, |comm| (comm.rank(), comm.size()));
        assert_eq!(ranks, vec![(0, 4), (1, 4), (2, 4), (3, 4)]);
    }

    #[test]
    #[should_panic]
    fn test_rank_panic_propagates() {
        run_local_group(2, |comm| {
            if comm.rank() == 1 {
                panic!("rank 1 failed");
            }
            comm.barrier();
        });
    }
}
