//! Point-to-point seam under the `Communicator`

use crate::error::CommError;
use rankbench_ipc::Envelope;

/// Ordered, reliable delivery of envelopes between the ranks of one group.
///
/// Implementations deliver messages from one source in the order they were
/// sent. Tag matching and self-sends are handled by the `Communicator`, so a
/// transport only ever sees `dest != rank()` and `source != rank()`.
pub trait Transport: Send {
    /// This rank's index
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Deliver `envelope` to `dest`
    fn send(&mut self, dest: usize, envelope: Envelope) -> Result<(), CommError>;

    /// Block until the next envelope from `source` arrives
    fn recv(&mut self, source: usize) -> Result<Envelope, CommError>;
}

/// Transport of a group with a single rank
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloTransport;

impl Transport for SoloTransport {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&mut self, dest: usize, _envelope: Envelope) -> Result<(), CommError> {
        Err(CommError::InvalidRank {
            rank: dest,
            size: 1,
        })
    }

    fn recv(&mut self, source: usize) -> Result<Envelope, CommError> {
        Err(CommError::InvalidRank {
            rank: source,
            size: 1,
        })
    }
}
