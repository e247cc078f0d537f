//! Coordinator errors

use crate::element::ElementType;
use rankbench_ipc::FrameError;
use thiserror::Error;

/// Errors raised below the `Communicator`.
///
/// The `Communicator` treats every one of them as fatal; they surface as
/// values only from constructors such as `PipeTransport::from_env` or
/// `ProcessGroup::launch`.
#[derive(Debug, Error)]
pub enum CommError {
    /// Framing failed on the link with `peer`
    #[error("link with rank {peer}: {source}")]
    Frame {
        /// Rank at the other end of the link
        peer: usize,
        /// Underlying framing error
        #[source]
        source: FrameError,
    },

    /// The peer's end of the link is gone (it exited or panicked)
    #[error("rank {peer} disconnected")]
    Disconnected {
        /// Rank at the other end of the link
        peer: usize,
    },

    /// A rank argument outside `0..size`
    #[error("invalid rank {rank} for a group of size {size}")]
    InvalidRank {
        /// Offending rank
        rank: usize,
        /// Group size
        size: usize,
    },

    /// Payload length is not a multiple of the element width
    #[error("payload of {len} bytes is not a whole number of {element} elements")]
    Decode {
        /// Payload length in bytes
        len: usize,
        /// Expected element type
        element: ElementType,
    },

    /// Element counts disagree between ranks or with the root's buffer
    #[error("size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Expected element count
        expected: usize,
        /// Observed element count
        actual: usize,
    },

    /// Peers disagree on the protocol (unexpected message, bad handshake, tag misuse)
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Group environment variables are missing or malformed
    #[error("invalid group environment: {0}")]
    Environment(String),

    /// OS-level failure (pipe creation, process spawn)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommError {
    pub(crate) fn frame(peer: usize, source: FrameError) -> Self {
        match source {
            FrameError::Closed => CommError::Disconnected { peer },
            FrameError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                CommError::Disconnected { peer }
            }
            source => CommError::Frame { peer, source },
        }
    }
}
