//! Communicator: the collective vocabulary of a rank group
//!
//! All rooted collectives are linear: the root talks to every other rank
//! directly, and contributions are combined in rank order so results are
//! reproducible for a fixed group size.

use crate::element::{Element, ReduceOp};
use crate::error::CommError;
use crate::partition::Partition;
use crate::transport::{SoloTransport, Transport};
use rankbench_ipc::{Envelope, RESERVED_TAG_BASE};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const TAG_BARRIER: u32 = RESERVED_TAG_BASE;
const TAG_BROADCAST: u32 = RESERVED_TAG_BASE + 1;
const TAG_SCATTER: u32 = RESERVED_TAG_BASE + 2;
const TAG_GATHER: u32 = RESERVED_TAG_BASE + 3;
const TAG_REDUCE: u32 = RESERVED_TAG_BASE + 4;

/// Messages and bytes moved by one rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    /// Envelopes handed to the transport
    pub messages_sent: u64,
    /// Payload bytes handed to the transport
    pub bytes_sent: u64,
    /// Envelopes taken from the transport
    pub messages_received: u64,
    /// Payload bytes taken from the transport
    pub bytes_received: u64,
}

struct Inner {
    transport: Box<dyn Transport>,
    /// Envelopes that arrived before anyone asked for their tag, per source
    pending: Vec<VecDeque<Envelope>>,
    traffic: Traffic,
}

/// Handle on this rank's membership in a process group.
///
/// Cheap to clone: tasks and the benchmark runner share the same underlying
/// transport. Every operation blocks until its collective condition holds,
/// and any transport failure panics (see crate docs).
///
/// Clones share one lock, held for the whole of a blocking receive. A rank
/// is driven by one thread at a time: if a task hands clones to its own
/// worker threads, every other call on that rank waits behind a receive in
/// progress. Collectives must also be issued in the same order on every
/// rank, so concurrent collectives from one rank are never valid anyway.
#[derive(Clone)]
pub struct Communicator {
    rank: usize,
    size: usize,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Communicator")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator {
    /// Wrap a transport
    pub fn new(transport: impl Transport + 'static) -> Self {
        let rank = transport.rank();
        let size = transport.size().max(1);
        Self {
            rank,
            size,
            inner: Arc::new(Mutex::new(Inner {
                transport: Box::new(transport),
                pending: (0..size).map(|_| VecDeque::new()).collect(),
                traffic: Traffic::default(),
            })),
        }
    }

    /// Group containing only this process
    pub fn single() -> Self {
        Self::new(SoloTransport)
    }

    /// This rank's index
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks in the group
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether this rank is rank 0, the designated reporter
    pub fn is_root(&self) -> bool {
        self.rank == 0
    }

    /// Traffic counters of this rank so far
    pub fn traffic(&self) -> Traffic {
        self.lock().traffic
    }

    // ─── Collectives ─────────────────────────────────────────────────────

    /// Block until every rank has entered the barrier
    pub fn barrier(&self) {
        if self.size == 1 {
            return;
        }
        let result = if self.is_root() {
            (1..self.size)
                .try_for_each(|peer| self.take(peer, TAG_BARRIER).map(drop))
                .and_then(|()| {
                    (1..self.size).try_for_each(|peer| self.post(peer, TAG_BARRIER, Vec::new()))
                })
        } else {
            self.post(0, TAG_BARRIER, Vec::new())
                .and_then(|()| self.take(0, TAG_BARRIER).map(drop))
        };
        self.check("barrier", result)
    }

    /// Replace `data` on every rank with the root's contents
    pub fn broadcast<T: Element>(&self, data: &mut Vec<T>, root: usize) {
        self.check_root("broadcast", root);
        if self.size == 1 {
            return;
        }
        if self.rank == root {
            let payload = T::encode(data);
            let result = self
                .peers()
                .try_for_each(|peer| self.post(peer, TAG_BROADCAST, payload.clone()));
            self.check("broadcast", result);
        } else {
            *data = self.check("broadcast", self.take_decoded(root, TAG_BROADCAST));
        }
    }

    /// The root's `value`, on every rank
    pub fn broadcast_value<T: Element>(&self, value: T, root: usize) -> T {
        let mut data = vec![value];
        self.broadcast(&mut data, root);
        self.check("broadcast", single(data))
    }

    /// Split the root's `data` into near-equal contiguous chunks, one per rank.
    ///
    /// The first `data.len() % size` ranks receive one extra element. Only the
    /// root's `data` is read.
    pub fn scatter<T: Element>(&self, data: &[T], root: usize) -> Vec<T> {
        let partition = Partition::even(data.len(), self.size);
        self.scatterv(data, partition.counts(), root)
    }

    /// Split the root's `data` into chunks of `counts[rank]` elements.
    ///
    /// `counts` is only read on the root, where it must have one entry per
    /// rank and sum to `data.len()`.
    pub fn scatterv<T: Element>(&self, data: &[T], counts: &[usize], root: usize) -> Vec<T> {
        self.check_root("scatter", root);
        if self.rank != root {
            return self.check("scatter", self.take_decoded(root, TAG_SCATTER));
        }

        if counts.len() != self.size {
            self.fatal(
                "scatter",
                CommError::SizeMismatch {
                    expected: self.size,
                    actual: counts.len(),
                },
            );
        }
        let partition = Partition::from_counts(counts.to_vec());
        if partition.total() != data.len() {
            self.fatal(
                "scatter",
                CommError::SizeMismatch {
                    expected: data.len(),
                    actual: partition.total(),
                },
            );
        }

        let result = self.peers().try_for_each(|peer| {
            let chunk = &data[partition.range(peer)];
            self.post(peer, TAG_SCATTER, T::encode(chunk))
        });
        self.check("scatter", result);
        data[partition.range(root)].to_vec()
    }

    /// Concatenate every rank's `local` on the root, in rank order
    pub fn gather<T: Element>(&self, local: &[T], root: usize) -> Option<Vec<T>> {
        self.gatherv(local, root).map(|(data, _)| data)
    }

    /// Like `gather`, also returning each rank's contribution length
    pub fn gatherv<T: Element>(&self, local: &[T], root: usize) -> Option<(Vec<T>, Vec<usize>)> {
        self.check_root("gather", root);
        let parts = self.collect_at_root("gather", TAG_GATHER, local, root)?;
        let counts = parts.iter().map(Vec::len).collect();
        Some((parts.into_iter().flatten().collect(), counts))
    }

    /// Concatenation of every rank's `local`, on every rank
    pub fn all_gather<T: Element>(&self, local: &[T]) -> Vec<T> {
        let mut data = self.gather(local, 0).unwrap_or_default();
        self.broadcast(&mut data, 0);
        data
    }

    /// Element-wise reduction of every rank's `local` onto the root
    pub fn reduce<T: Element>(&self, local: &[T], op: ReduceOp, root: usize) -> Option<Vec<T>> {
        self.reduce_with(local, root, |a, b| a.combine(b, op))
    }

    /// Element-wise reduction with a caller-supplied associative, commutative combinator
    pub fn reduce_with<T, F>(&self, local: &[T], root: usize, combine: F) -> Option<Vec<T>>
    where
        T: Element,
        F: Fn(T, T) -> T,
    {
        self.check_root("reduce", root);
        let mut parts = self
            .collect_at_root("reduce", TAG_REDUCE, local, root)?
            .into_iter();
        let mut acc = parts.next().unwrap_or_default();
        for part in parts {
            if part.len() != acc.len() {
                self.fatal(
                    "reduce",
                    CommError::SizeMismatch {
                        expected: acc.len(),
                        actual: part.len(),
                    },
                );
            }
            for (slot, value) in acc.iter_mut().zip(part) {
                *slot = combine(*slot, value);
            }
        }
        Some(acc)
    }

    /// Element-wise reduction, result on every rank
    pub fn all_reduce<T: Element>(&self, local: &[T], op: ReduceOp) -> Vec<T> {
        self.all_reduce_with(local, |a, b| a.combine(b, op))
    }

    /// Element-wise reduction with a custom combinator, result on every rank
    pub fn all_reduce_with<T, F>(&self, local: &[T], combine: F) -> Vec<T>
    where
        T: Element,
        F: Fn(T, T) -> T,
    {
        let mut data = self.reduce_with(local, 0, combine).unwrap_or_default();
        self.broadcast(&mut data, 0);
        data
    }

    /// Reduction of one scalar per rank, result on every rank
    pub fn all_reduce_value<T: Element>(&self, value: T, op: ReduceOp) -> T {
        let data = self.all_reduce(&[value], op);
        self.check("all_reduce", single(data))
    }

    // ─── Point-to-point ──────────────────────────────────────────────────

    /// Send `data` to `dest` with a user tag (below `RESERVED_TAG_BASE`)
    pub fn send<T: Element>(&self, data: &[T], dest: usize, tag: u32) {
        self.check_user_tag("send", tag);
        self.check("send", self.post(dest, tag, T::encode(data)));
    }

    /// Receive the next message from `source` carrying `tag`.
    ///
    /// Messages from `source` with other tags stay queued for later receives.
    pub fn recv<T: Element>(&self, source: usize, tag: u32) -> Vec<T> {
        self.check_user_tag("recv", tag);
        self.check("recv", self.take_decoded(source, tag))
    }

    /// Send one value
    pub fn send_value<T: Element>(&self, value: T, dest: usize, tag: u32) {
        self.send(&[value], dest, tag);
    }

    /// Receive one value
    pub fn recv_value<T: Element>(&self, source: usize, tag: u32) -> T {
        let data = self.recv(source, tag);
        self.check("recv", single(data))
    }

    // ─── Internals ───────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&peer| peer != self.rank)
    }

    fn post(&self, dest: usize, tag: u32, payload: Vec<u8>) -> Result<(), CommError> {
        if dest >= self.size {
            return Err(CommError::InvalidRank {
                rank: dest,
                size: self.size,
            });
        }
        let envelope = Envelope {
            source: self.rank as u32,
            tag,
            payload,
        };
        let mut inner = self.lock();
        if dest == self.rank {
            inner.pending[dest].push_back(envelope);
            return Ok(());
        }
        inner.traffic.messages_sent += 1;
        inner.traffic.bytes_sent += envelope.payload.len() as u64;
        inner.transport.send(dest, envelope)
    }

    fn take(&self, source: usize, tag: u32) -> Result<Vec<u8>, CommError> {
        if source >= self.size {
            return Err(CommError::InvalidRank {
                rank: source,
                size: self.size,
            });
        }
        let mut inner = self.lock();
        if let Some(pos) = inner.pending[source].iter().position(|e| e.tag == tag) {
            if let Some(envelope) = inner.pending[source].remove(pos) {
                return Ok(envelope.payload);
            }
        }
        if source == self.rank {
            return Err(CommError::Protocol(format!(
                "rank {source} receives tag {tag:#x} from itself with no matching send"
            )));
        }

        loop {
            let envelope = inner.transport.recv(source)?;
            if envelope.source as usize != source {
                return Err(CommError::Protocol(format!(
                    "envelope from rank {} arrived on the link with rank {source}",
                    envelope.source
                )));
            }
            inner.traffic.messages_received += 1;
            inner.traffic.bytes_received += envelope.payload.len() as u64;
            if envelope.tag == tag {
                return Ok(envelope.payload);
            }
            tracing::trace!(rank = self.rank, source, tag = envelope.tag, "queued early message");
            inner.pending[source].push_back(envelope);
        }
    }

    fn take_decoded<T: Element>(&self, source: usize, tag: u32) -> Result<Vec<T>, CommError> {
        T::decode(&self.take(source, tag)?)
    }

    /// Every rank's `local` on the root (indexed by rank), `None` elsewhere
    fn collect_at_root<T: Element>(
        &self,
        op: &'static str,
        tag: u32,
        local: &[T],
        root: usize,
    ) -> Option<Vec<Vec<T>>> {
        if self.rank != root {
            self.check(op, self.post(root, tag, T::encode(local)));
            return None;
        }
        let parts = (0..self.size)
            .map(|peer| {
                if peer == root {
                    Ok(local.to_vec())
                } else {
                    self.take_decoded(peer, tag)
                }
            })
            .collect::<Result<Vec<_>, _>>();
        Some(self.check(op, parts))
    }

    fn check_root(&self, op: &'static str, root: usize) {
        if root >= self.size {
            self.fatal(
                op,
                CommError::InvalidRank {
                    rank: root,
                    size: self.size,
                },
            );
        }
    }

    fn check_user_tag(&self, op: &'static str, tag: u32) {
        if tag >= RESERVED_TAG_BASE {
            self.fatal(
                op,
                CommError::Protocol(format!("tag {tag:#x} is reserved for collectives")),
            );
        }
    }

    fn check<T>(&self, op: &'static str, result: Result<T, CommError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.fatal(op, err),
        }
    }

    fn fatal(&self, op: &'static str, err: CommError) -> ! {
        tracing::error!(rank = self.rank, op, error = %err, "transport failure");
        panic!("rank {}: {op} failed: {err}", self.rank);
    }
}

fn single<T: Element>(data: Vec<T>) -> Result<T, CommError> {
    match data.as_slice() {
        [value] => Ok(*value),
        _ => Err(CommError::SizeMismatch {
            expected: 1,
            actual: data.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::run_local_group;

    #[test]
    fn test_single_rank_collectives_are_local() {
        let comm = Communicator::single();
        comm.barrier();
        assert_eq!(comm.broadcast_value(7u32, 0), 7);
        assert_eq!(comm.scatter(&[1, 2, 3i32], 0), vec![1, 2, 3]);
        assert_eq!(comm.gather(&[4i32], 0), Some(vec![4]));
        assert_eq!(comm.all_reduce_value(2.5f64, ReduceOp::Sum), 2.5);
        assert_eq!(comm.traffic(), Traffic::default());
    }

    #[test]
    fn test_broadcast_from_non_zero_root() {
        let results = run_local_group(4, |comm| {
            let mut data = if comm.rank() == 2 {
                vec![1.0f64, 2.0, 3.0]
            } else {
                Vec::new()
            };
            comm.broadcast(&mut data, 2);
            data
        });
        for data in results {
            assert_eq!(data, vec![1.0, 2.0, 3.0]);
        }
    }

    #[test]
    fn test_scatter_gather_reassembles_buffer() {
        for len in 0..=12usize {
            for size in 1..=len + 1 {
                let results = run_local_group(size, |comm| {
                    let source: Vec<i64> = if comm.is_root() {
                        (0..len as i64).collect()
                    } else {
                        Vec::new()
                    };
                    let chunk = comm.scatter(&source, 0);
                    let expected = Partition::even(len, comm.size()).range(comm.rank());
                    assert_eq!(chunk.len(), expected.len());
                    // Transform in place so misplaced chunks would show up
                    let doubled: Vec<i64> = chunk.iter().map(|v| v * 2).collect();
                    comm.gather(&doubled, 0)
                });
                let gathered = results[0].clone().unwrap();
                let expected: Vec<i64> = (0..len as i64).map(|v| v * 2).collect();
                assert_eq!(gathered, expected, "len={len} size={size}");
                assert!(results[1..].iter().all(Option::is_none));
            }
        }
    }

    #[test]
    fn test_scatterv_and_gatherv_counts() {
        let results = run_local_group(3, |comm| {
            let chunk = comm.scatterv(&[1u32, 2, 3, 4, 5, 6], &[1, 0, 5], 0);
            comm.gatherv(&chunk, 0)
        });
        let (data, counts) = results[0].clone().unwrap();
        assert_eq!(data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(counts, vec![1, 0, 5]);
    }

    #[test]
    fn test_sum_of_ones_matches_sequential() {
        let n = 101;
        let results = run_local_group(4, |comm| {
            let ones = if comm.is_root() { vec![1i32; n] } else { Vec::new() };
            let chunk = comm.scatter(&ones, 0);
            let local: i32 = chunk.iter().sum();
            comm.reduce(&[local], ReduceOp::Sum, 0)
        });
        assert_eq!(results[0], Some(vec![n as i32]));
    }

    #[test]
    fn test_all_reduce_ops() {
        let results = run_local_group(3, |comm| {
            let r = comm.rank() as i64;
            (
                comm.all_reduce(&[r, 10 - r], ReduceOp::Max),
                comm.all_reduce_value(r + 1, ReduceOp::Prod),
                comm.all_reduce_value(r as f64 - 1.0, ReduceOp::Min),
            )
        });
        for (max, prod, min) in results {
            assert_eq!(max, vec![2, 10]);
            assert_eq!(prod, 6);
            assert_eq!(min, -1.0);
        }
    }

    #[test]
    fn test_custom_combinator_reduce() {
        // gcd is associative and commutative
        fn gcd(a: u64, b: u64) -> u64 {
            if b == 0 { a } else { gcd(b, a % b) }
        }
        let results = run_local_group(3, |comm| {
            let values = [12u64, 18, 30];
            comm.all_reduce_with(&[values[comm.rank()]], gcd)
        });
        for value in results {
            assert_eq!(value, vec![6]);
        }
    }

    #[test]
    fn test_all_gather_everywhere() {
        let results = run_local_group(3, |comm| comm.all_gather(&vec![comm.rank() as u8; comm.rank()]));
        for data in results {
            assert_eq!(data, vec![1, 2, 2]);
        }
    }

    #[test]
    fn test_tag_matching_out_of_order() {
        let results = run_local_group(2, |comm| {
            if comm.rank() == 0 {
                comm.send_value(1i32, 1, 5);
                comm.send_value(2i32, 1, 6);
                comm.barrier();
                Vec::new()
            } else {
                comm.barrier();
                let later = comm.recv_value::<i32>(0, 6);
                let earlier = comm.recv_value::<i32>(0, 5);
                vec![later, earlier]
            }
        });
        assert_eq!(results[1], vec![2, 1]);
    }

    #[test]
    fn test_clones_share_pending_queue() {
        let results = run_local_group(2, |comm| {
            if comm.rank() == 0 {
                comm.send_value(1i32, 1, 5);
                comm.send_value(2i32, 1, 6);
                0
            } else {
                let later = comm.recv_value::<i32>(0, 6);
                let clone = comm.clone();
                let earlier = std::thread::spawn(move || clone.recv_value::<i32>(0, 5))
                    .join()
                    .unwrap();
                later * 10 + earlier
            }
        });
        assert_eq!(results[1], 21);
    }

    #[test]
    fn test_self_send_loops_back() {
        let comm = Communicator::single();
        comm.send(&[3.5f32, 4.5], 0, 1);
        assert_eq!(comm.recv::<f32>(0, 1), vec![3.5, 4.5]);
    }

    #[test]
    fn test_traffic_counts_remote_messages_only() {
        let results = run_local_group(2, |comm| {
            comm.barrier();
            comm.traffic()
        });
        assert_eq!(results[0].messages_sent, 1);
        assert_eq!(results[0].messages_received, 1);
        assert_eq!(results[1].bytes_sent, 0);
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn test_reserved_tag_rejected() {
        Communicator::single().send_value(1u8, 0, RESERVED_TAG_BASE);
    }

    #[test]
    #[should_panic(expected = "invalid rank")]
    fn test_invalid_root_is_fatal() {
        Communicator::single().broadcast_value(1u8, 3);
    }

    #[test]
    #[should_panic(expected = "no matching send")]
    fn test_self_receive_without_send_is_fatal() {
        Communicator::single().recv::<u8>(0, 9);
    }
}
