//! Length-Prefixed Frame Encoding
//!
//! Pipes are byte streams; frames restore message boundaries between ranks.
//!
//! ```text
//! +----------------+------------------+
//! | length (u32 LE)| rkyv archive     |
//! +----------------+------------------+
//! ```

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use thiserror::Error;

/// Largest archive a single frame may carry (1 GiB). A scatter of a large
/// input buffer travels in one frame.
pub const MAX_FRAME_SIZE: usize = 1 << 30;

const PREFIX_LEN: usize = size_of::<u32>();
const PIPE_BUFFER: usize = 64 * 1024;

/// Failures on one rank-to-rank pipe
#[derive(Debug, Error)]
pub enum FrameError {
    /// The pipe itself failed
    #[error("pipe I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The message could not be archived
    #[error("could not encode message: {0}")]
    Encode(String),

    /// The frame did not hold a valid archive of the expected type
    #[error("could not decode frame: {0}")]
    Decode(String),

    /// Length exceeds `MAX_FRAME_SIZE`
    #[error("frame of {size} bytes exceeds the {max}-byte limit")]
    TooLarge {
        /// Announced or encoded length
        size: usize,
        /// `MAX_FRAME_SIZE`
        max: usize,
    },

    /// Structurally broken frame (empty, or cut short by the peer)
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The peer closed the pipe on a frame boundary
    #[error("peer closed the pipe")]
    Closed,
}

fn check_size(size: usize) -> Result<(), FrameError> {
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Archive `message` and send it as one frame, flushing the pipe.
///
/// Returns the bytes put on the wire, prefix included.
pub fn write_frame<W, T>(writer: &mut BufWriter<W>, message: &T) -> Result<usize, FrameError>
where
    W: Write,
    T: Serialize<AllocSerializer<256>>,
{
    let archive =
        rkyv::to_bytes::<_, 256>(message).map_err(|e| FrameError::Encode(e.to_string()))?;
    check_size(archive.len())?;

    let prefix = (archive.len() as u32).to_le_bytes();
    writer.write_all(&prefix)?;
    writer.write_all(&archive)?;
    // Peers block on the read side
    writer.flush()?;

    Ok(PREFIX_LEN + archive.len())
}

/// Block until one whole frame has arrived and decode it as `T`
pub fn read_frame<R, T>(reader: &mut BufReader<R>) -> Result<T, FrameError>
where
    R: Read,
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let mut prefix = [0u8; PREFIX_LEN];
    reader.read_exact(&mut prefix).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => FrameError::Closed,
        _ => FrameError::Io(e),
    })?;

    let len = u32::from_le_bytes(prefix) as usize;
    check_size(len)?;
    if len == 0 {
        return Err(FrameError::Malformed("empty frame".to_string()));
    }

    // In-place validation needs an aligned buffer
    let mut archive = AlignedVec::with_capacity(len);
    archive.resize(len, 0);
    reader.read_exact(&mut archive).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => {
            FrameError::Malformed(format!("pipe closed inside a {len}-byte frame"))
        }
        _ => FrameError::Io(e),
    })?;

    rkyv::check_archived_root::<T>(&archive)
        .map_err(|e| FrameError::Decode(e.to_string()))?
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Decode("archived value rejected".to_string()))
}

/// Sending half of a rank-to-rank pipe
pub struct FrameWriter<W: Write> {
    inner: BufWriter<W>,
    sent: u64,
}

impl<W: Write> FrameWriter<W> {
    /// Buffered frame writer over `pipe`
    pub fn new(pipe: W) -> Self {
        Self {
            inner: BufWriter::with_capacity(PIPE_BUFFER, pipe),
            sent: 0,
        }
    }

    /// Send one message
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<256>>,
    {
        self.sent += write_frame(&mut self.inner, message)? as u64;
        Ok(())
    }

    /// Bytes sent through this writer, prefixes included
    pub fn bytes_written(&self) -> u64 {
        self.sent
    }
}

/// Receiving half of a rank-to-rank pipe
pub struct FrameReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Buffered frame reader over `pipe`
    pub fn new(pipe: R) -> Self {
        Self {
            inner: BufReader::with_capacity(PIPE_BUFFER, pipe),
        }
    }

    /// Receive one message, blocking until its frame is complete
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        read_frame(&mut self.inner)
    }
}
