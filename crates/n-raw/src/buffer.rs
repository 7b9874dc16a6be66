// SPDX-License-Identifier: MIT
//
// Frame staging buffer.
//
// Every escape sequence and glyph of a frame lands here first, and the
// whole frame leaves in a single `write_all`. The terminal never sees a
// half-drawn screen, and we pay for one syscall instead of hundreds.
//
// Growth goes through `Vec::try_reserve`, so running out of memory is an
// error value instead of an abort. `try_append` surfaces it; `append`
// drops that call's bytes and logs, keeping the frame alive.

use std::collections::TryReserveError;
use std::io::{self, Write};

use tracing::warn;

use crate::error::{Error, Result};

/// Room for a full 80×24 frame of placeholders plus escapes.
const DEFAULT_CAPACITY: usize = 4096;

/// A growable byte accumulator for one frame of output.
///
/// Content is opaque bytes; nothing here requires valid UTF-8.
///
/// # Example
///
/// ```
/// use n_raw::buffer::AppendBuffer;
///
/// let mut frame = AppendBuffer::new();
/// frame.append(b"\x1b[H");
/// frame.append(b"~");
///
/// let mut out = Vec::new();
/// frame.flush_to(&mut out)?;
/// assert_eq!(out, b"\x1b[H~");
/// # Ok::<(), n_raw::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct AppendBuffer {
    buf: Vec<u8>,
    /// Pretend the allocator gives up past this many bytes.
    #[cfg(test)]
    growth_limit: Option<usize>,
}

impl AppendBuffer {
    /// Create an empty buffer with a default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty buffer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            #[cfg(test)]
            growth_limit: None,
        }
    }

    /// Number of bytes accumulated.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been appended since creation or the last reset.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes the buffer can hold before it has to grow.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// The accumulated bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append `bytes`, reporting allocation failure instead of aborting.
    ///
    /// On failure the buffer is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationExhausted`] if storage cannot grow.
    pub fn try_append(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())
            .map_err(|_| Error::AllocationExhausted {
                requested: bytes.len(),
            })?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> std::result::Result<(), TryReserveError> {
        #[cfg(test)]
        if self
            .growth_limit
            .is_some_and(|limit| self.buf.len().saturating_add(additional) > limit)
        {
            // Overflows the capacity check, so it fails without allocating.
            return self.buf.try_reserve(usize::MAX);
        }
        self.buf.try_reserve(additional)
    }

    /// Append `bytes`. If storage cannot grow, the bytes of this call are
    /// dropped and the rest of the frame carries on.
    pub fn append(&mut self, bytes: &[u8]) {
        if let Err(err) = self.try_append(bytes) {
            warn!(%err, "dropping frame bytes");
        }
    }

    /// Empty the buffer, keeping its allocation for the next frame.
    #[inline]
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Write the whole content to `sink` in one call, then flush it.
    ///
    /// Read-only: the content stays until [`reset`](Self::reset). Partial
    /// writes are `write_all`'s problem, not ours.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoFailure`] if the sink rejects the write or flush.
    pub fn flush_to(&self, sink: &mut impl Write) -> Result<()> {
        sink.write_all(&self.buf)
            .and_then(|()| sink.flush())
            .map_err(|e| Error::failure("write frame", e))
    }
}

impl Write for AppendBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.try_append(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Nothing to do: real flushing is `flush_to`.
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
