#![warn(missing_docs)]
//! rankbench IPC Protocol
//!
//! Wire layer shared by the ranks of a process group:
//! - Length-prefixed frames over pipes, payloads serialized with rkyv
//! - `Handshake` sent once by every child rank when it joins the group
//! - `Envelope` carrying one tagged point-to-point payload
//!
//! The payload bytes are opaque here; typed encoding lives in `rankbench-comm`.

mod framing;
mod messages;

pub use framing::{FrameError, FrameReader, FrameWriter, MAX_FRAME_SIZE, read_frame, write_frame};
pub use messages::{Envelope, Handshake, WireMessage};

/// Protocol version for compatibility checking between ranks of one group
pub const PROTOCOL_VERSION: u32 = 1;

/// Tags at or above this value are reserved for collective operations
pub const RESERVED_TAG_BASE: u32 = 0xFFFF_0000;
