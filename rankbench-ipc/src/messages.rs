//! IPC Message Types
//!
//! Everything on a rank-to-rank pipe is a `WireMessage`, serialized with rkyv.

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};

/// Identity a child rank announces to rank 0 when it joins the group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Handshake {
    /// Protocol version for compatibility
    pub protocol_version: u32,
    /// Rank the child believes it has
    pub rank: u32,
    /// Group size the child was started with
    pub size: u32,
    /// OS process id of the child
    pub pid: u32,
}

impl Handshake {
    /// Handshake for the current process
    pub fn new(rank: usize, size: usize) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            rank: rank as u32,
            size: size as u32,
            pid: std::process::id(),
        }
    }
}

/// One tagged payload travelling from `source` to the reader of the pipe
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub struct Envelope {
    /// Sending rank
    pub source: u32,
    /// Matching tag; user tags stay below `RESERVED_TAG_BASE`
    pub tag: u32,
    /// Encoded elements
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Whether this envelope belongs to a collective operation
    pub fn is_collective(&self) -> bool {
        self.tag >= crate::RESERVED_TAG_BASE
    }
}

/// Frame contents on a rank-to-rank pipe
#[derive(Debug, Clone, PartialEq, Eq, Archive, RkyvSerialize, RkyvDeserialize)]
#[archive(check_bytes)]
pub enum WireMessage {
    /// First frame on every child → rank 0 pipe
    Hello(Handshake),
    /// Point-to-point or collective payload
    Data(Envelope),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_current_process() {
        let hello = Handshake::new(2, 4);
        assert_eq!(hello.protocol_version, crate::PROTOCOL_VERSION);
        assert_eq!(hello.rank, 2);
        assert_eq!(hello.size, 4);
        assert_eq!(hello.pid, std::process::id());
    }

    #[test]
    fn test_collective_tags() {
        let user = Envelope {
            source: 0,
            tag: 42,
            payload: Vec::new(),
        };
        let collective = Envelope {
            tag: crate::RESERVED_TAG_BASE + 3,
            ..user.clone()
        };
        assert!(!user.is_collective());
        assert!(collective.is_collective());
    }
}
