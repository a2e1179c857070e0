//! Append-only payload buffer reused across bulk batches.

use bytes::{Bytes, BytesMut};
use std::io;

/// Bytes reserved per expected bulk action when sizing a buffer from a batch size.
pub const BYTES_PER_ACTION_HINT: usize = 1024;

/// Append-only byte buffer that can hand out frozen views of what was written.
///
/// [`slice`](Self::slice) splits off the written region as an immutable
/// [`Bytes`] and leaves the buffer empty. The split shares the original
/// allocation, and once every slice handed out has been dropped the next
/// growth reclaims that allocation instead of allocating again, so a steady
/// workload stops allocating after warm-up. An in-flight slice is never
/// overwritten by later writes.
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    inner: BytesMut,
}

impl GrowableBuffer {
    /// Create a buffer with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Create a buffer sized for `batch_size` bulk actions.
    pub fn for_batch(batch_size: usize) -> Self {
        Self::with_capacity(batch_size.saturating_mul(BYTES_PER_ACTION_HINT))
    }

    /// Append raw bytes, growing as needed.
    pub fn write(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.inner.extend_from_slice(bytes);
    }

    /// Append a UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Append a single byte.
    pub fn push(&mut self, byte: u8) {
        self.ensure(1);
        self.inner.extend_from_slice(&[byte]);
    }

    /// Freeze everything written since the last slice and reset the write cursor.
    ///
    /// Slicing twice without an intervening write returns an empty view.
    pub fn slice(&mut self) -> Bytes {
        self.inner.split().freeze()
    }

    /// Drop everything written after `len` bytes.
    ///
    /// Used to roll back a partially written action.
    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Number of bytes written since the last slice.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing has been written since the last slice.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Bytes that can be written before the buffer has to grow.
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// View of the bytes written since the last slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    // Grow geometrically so repeated small writes stay amortized O(1).
    fn ensure(&mut self, additional: usize) {
        let free = self.inner.capacity() - self.inner.len();
        if free < additional {
            let grow = additional.max(self.inner.capacity()).max(64);
            self.inner.reserve(grow);
        }
    }
}

impl io::Write for GrowableBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        GrowableBuffer::write(self, buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        GrowableBuffer::write(self, buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
