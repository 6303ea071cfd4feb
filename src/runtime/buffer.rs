//! Per-connection write staging.
//!
//! Echoed bytes wait here between the read that produced them and the
//! moment the socket accepts them. The buffer is a fixed-capacity region
//! with two cursors: `size` counts staged bytes, `offset` counts staged
//! bytes already transmitted. The drained prefix `[0, offset)` is never
//! compacted; its space becomes reusable only once the buffer fully
//! drains and resets.

use std::io::{self, Write};

/// Error returned when an append would exceed the buffer's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFull;

/// Outcome of a flush pass over the staged range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything staged went out; the buffer reset to empty.
    Done,
    /// The kernel pushed back mid-range; `offset` keeps the progress.
    Partial,
}

/// Fixed-capacity staging buffer for one connection.
pub struct WriteBuffer {
    data: Box<[u8]>,
    /// Bytes staged, `0 <= size <= capacity`.
    size: usize,
    /// Staged bytes already transmitted, `0 <= offset <= size`.
    offset: usize,
}

impl WriteBuffer {
    /// Create an empty buffer holding at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            size: 0,
            offset: 0,
        }
    }

    /// `true` when no staged byte remains untransmitted.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.size
    }

    /// Staged bytes not yet transmitted.
    pub fn pending(&self) -> usize {
        self.size - self.offset
    }

    /// Stage `bytes` behind whatever is already staged.
    ///
    /// A logically empty buffer is reset first so the whole region is
    /// available again. Fails with `BufferFull` when the bytes do not fit
    /// behind `size`; the drained prefix does not count as free space.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        if self.offset >= self.size {
            self.size = 0;
            self.offset = 0;
        }
        if self.size + bytes.len() > self.data.len() {
            return Err(BufferFull);
        }
        self.data[self.size..self.size + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        Ok(())
    }

    /// Transmit the staged range until it drains or the writer pushes back.
    ///
    /// `Done` resets the buffer to empty. `Partial` means `WouldBlock`
    /// interrupted the pass with `offset` advanced by what went out. Any
    /// other write error is returned as-is; a write of zero bytes into a
    /// non-empty range is reported as `WriteZero`.
    pub fn flush<W: Write>(&mut self, writer: &mut W) -> io::Result<FlushStatus> {
        while self.offset < self.size {
            match writer.write(&self.data[self.offset..self.size]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "write returned 0",
                    ));
                }
                Ok(n) => self.offset += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(FlushStatus::Partial);
                }
                Err(e) => return Err(e),
            }
        }

        self.size = 0;
        self.offset = 0;
        Ok(FlushStatus::Done)
    }

    /// Reset to empty, discarding anything staged.
    pub fn clear(&mut self) {
        self.size = 0;
        self.offset = 0;
    }
}
