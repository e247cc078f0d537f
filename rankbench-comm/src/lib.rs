#![warn(missing_docs)]
//! rankbench Process Group Coordinator
//!
//! A fixed group of cooperating ranks and the small collective vocabulary
//! parallel tasks are written against:
//! - `Communicator`: rank/size, barrier, broadcast, scatter(v), gather(v),
//!   reduce/all-reduce with built-in or custom combinators, tagged send/recv
//! - `Transport`: the point-to-point seam underneath
//!   - `LocalTransport`: ranks as threads of one process
//!   - `PipeTransport`: ranks as processes joined by a pipe mesh (Unix)
//! - `ProcessGroup`: launches the child ranks of a pipe-mesh group (Unix)
//! - `Partition`: contiguous near-equal chunking used by `scatter`
//!
//! Transport failures are fatal: there is no partial result for a torn
//! multi-rank computation, so collectives panic instead of returning errors.

mod affinity;
mod communicator;
mod element;
mod error;
#[cfg(unix)]
mod launch;
mod local;
mod partition;
#[cfg(unix)]
mod pipe;
mod transport;

pub use affinity::{available_cpus, pin_to_cpu};
pub use communicator::{Communicator, Traffic};
pub use element::{Element, ElementType, ReduceOp};
pub use error::CommError;
#[cfg(unix)]
pub use launch::{LaunchOptions, ProcessGroup, RankExit};
pub use local::{LocalTransport, run_local_group, run_ranks};
pub use partition::Partition;
#[cfg(unix)]
pub use pipe::{
    ENV_PEER_FDS, ENV_PIN_CPU, ENV_RANK, ENV_SIZE, PipeTransport, is_child_rank,
};
pub use rankbench_ipc::RESERVED_TAG_BASE;
pub use transport::{SoloTransport, Transport};
