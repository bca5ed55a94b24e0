//! Index-separated byte buffer underlying the wire framing (§4.4, C1).
//!
//! Invariant held after every operation: `0 <= reader_index <= writer_index
//! <= capacity`. Every violation of that invariant — reading past the
//! writer index, writing past capacity on a fixed buffer, resetting a mark
//! that was never set — is the same error: [`BufferError::OutOfBounds`].

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer index out of bounds: {0}")]
    OutOfBounds(String),
}

/// Growth factor used by [`Buffer::ensure_writable`] on dynamic buffers:
/// doubles until there is enough room, then adds one more step so a
/// zero-capacity buffer can still grow from nothing.
const GROWTH_FACTOR: usize = 2;

#[derive(Debug, Clone)]
pub struct Buffer {
    data: Vec<u8>,
    reader_index: usize,
    writer_index: usize,
    mark_reader_index: Option<usize>,
    mark_writer_index: Option<usize>,
    dynamic: bool,
}

impl Buffer {
    /// A buffer that grows geometrically on `ensure_writable` instead of
    /// erroring.
    pub fn dynamic(initial_capacity: usize) -> Self {
        Self {
            data: vec![0u8; initial_capacity],
            reader_index: 0,
            writer_index: 0,
            mark_reader_index: None,
            mark_writer_index: None,
            dynamic: true,
        }
    }

    /// A buffer with a hard capacity ceiling; writes past capacity raise
    /// [`BufferError::OutOfBounds`] rather than growing.
    pub fn fixed(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            reader_index: 0,
            writer_index: 0,
            mark_reader_index: None,
            mark_writer_index: None,
            dynamic: false,
        }
    }

    /// Wraps already-written bytes as a fixed, fully-readable buffer (e.g.
    /// bytes just read off a socket).
    pub fn from_filled(bytes: Vec<u8>) -> Self {
        let writer_index = bytes.len();
        Self {
            data: bytes,
            reader_index: 0,
            writer_index,
            mark_reader_index: None,
            mark_writer_index: None,
            dynamic: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    /// Number of unread bytes.
    pub fn readable(&self) -> usize {
        self.writer_index - self.reader_index
    }

    /// Remaining room before capacity is hit.
    pub fn writable(&self) -> usize {
        self.capacity() - self.writer_index
    }

    /// A view of the unread bytes, `[reader_index, writer_index)`.
    pub fn readable_slice(&self) -> &[u8] {
        &self.data[self.reader_index..self.writer_index]
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        if self.reader_index >= self.writer_index {
            return Err(BufferError::OutOfBounds("read_u8 past writer_index".into()));
        }
        let b = self.data[self.reader_index];
        self.reader_index += 1;
        Ok(b)
    }

    /// Reads exactly `len` bytes, advancing `reader_index`.
    pub fn read_exact(&mut self, len: usize) -> Result<&[u8], BufferError> {
        if self.reader_index + len > self.writer_index {
            return Err(BufferError::OutOfBounds(format!(
                "read_exact({len}) past writer_index (readable={})",
                self.readable()
            )));
        }
        let start = self.reader_index;
        self.reader_index += len;
        Ok(&self.data[start..start + len])
    }

    pub fn skip(&mut self, len: usize) -> Result<(), BufferError> {
        if self.reader_index + len > self.writer_index {
            return Err(BufferError::OutOfBounds(format!(
                "skip({len}) past writer_index"
            )));
        }
        self.reader_index += len;
        Ok(())
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<(), BufferError> {
        self.ensure_writable(1)?;
        self.data[self.writer_index] = byte;
        self.writer_index += 1;
        Ok(())
    }

    pub fn write_slice(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.ensure_writable(bytes.len())?;
        let start = self.writer_index;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.writer_index += bytes.len();
        Ok(())
    }

    /// Grows a dynamic buffer geometrically until `additional` more bytes
    /// fit past `writer_index`; a fixed buffer instead errors.
    pub fn ensure_writable(&mut self, additional: usize) -> Result<(), BufferError> {
        if self.writable() >= additional {
            return Ok(());
        }
        if !self.dynamic {
            return Err(BufferError::OutOfBounds(format!(
                "fixed buffer cannot grow to fit {additional} more bytes (writable={})",
                self.writable()
            )));
        }
        let mut new_capacity = self.capacity().max(1);
        while new_capacity - self.writer_index < additional {
            new_capacity *= GROWTH_FACTOR;
        }
        self.data.resize(new_capacity, 0);
        Ok(())
    }

    /// Compacts `[0, reader_index)` out, leaving the readable bytes at
    /// index 0 and shifting both indices down by the old `reader_index`.
    /// Content past the new `writer_index` is left as-is (not zeroed);
    /// only the indices and the readable window are part of the contract.
    pub fn discard_read_bytes(&mut self) {
        if self.reader_index == 0 {
            return;
        }
        self.data.copy_within(self.reader_index..self.writer_index, 0);
        self.writer_index -= self.reader_index;
        self.reader_index = 0;
        self.mark_reader_index = None;
        self.mark_writer_index = None;
    }

    /// Resets both indices to zero. Content is left untouched; only the
    /// indices move, per §4.4.
    pub fn clear(&mut self) {
        self.reader_index = 0;
        self.writer_index = 0;
        self.mark_reader_index = None;
        self.mark_writer_index = None;
    }

    pub fn mark_reader_index(&mut self) {
        self.mark_reader_index = Some(self.reader_index);
    }

    pub fn reset_reader_index(&mut self) -> Result<(), BufferError> {
        let mark = self
            .mark_reader_index
            .ok_or_else(|| BufferError::OutOfBounds("reset_reader_index: no mark set".into()))?;
        self.reader_index = mark;
        Ok(())
    }

    pub fn mark_writer_index(&mut self) {
        self.mark_writer_index = Some(self.writer_index);
    }

    pub fn reset_writer_index(&mut self) -> Result<(), BufferError> {
        let mark = self
            .mark_writer_index
            .ok_or_else(|| BufferError::OutOfBounds("reset_writer_index: no mark set".into()))?;
        self.writer_index = mark;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_holds_through_reads_and_writes() {
        let mut buf = Buffer::dynamic(4);
        buf.write_slice(b"hello world").unwrap();
        assert!(buf.reader_index() <= buf.writer_index());
        assert!(buf.writer_index() <= buf.capacity());
        buf.read_exact(5).unwrap();
        assert!(buf.reader_index() <= buf.writer_index());
        assert!(buf.writer_index() <= buf.capacity());
    }

    #[test]
    fn discard_read_bytes_preserves_readable_content() {
        let mut buf = Buffer::dynamic(16);
        buf.write_slice(b"abcdefgh").unwrap();
        buf.read_exact(3).unwrap();
        let before = buf.readable_slice().to_vec();
        buf.discard_read_bytes();
        assert_eq!(buf.reader_index(), 0);
        assert_eq!(buf.writer_index(), before.len());
        assert_eq!(buf.readable_slice(), before.as_slice());
    }

    #[test]
    fn clear_zeroes_indices_but_keeps_content() {
        let mut buf = Buffer::dynamic(8);
        buf.write_slice(b"data").unwrap();
        buf.read_exact(2).unwrap();
        buf.clear();
        assert_eq!(buf.reader_index(), 0);
        assert_eq!(buf.writer_index(), 0);
        assert_eq!(&buf.data[..4], b"data");
    }

    #[test]
    fn mark_and_reset_reader_index() {
        let mut buf = Buffer::dynamic(8);
        buf.write_slice(b"abcdef").unwrap();
        buf.read_exact(2).unwrap();
        buf.mark_reader_index();
        buf.read_exact(2).unwrap();
        buf.reset_reader_index().unwrap();
        assert_eq!(buf.reader_index(), 2);
    }

    #[test]
    fn reset_without_mark_is_out_of_bounds() {
        let mut buf = Buffer::dynamic(4);
        assert!(matches!(
            buf.reset_reader_index(),
            Err(BufferError::OutOfBounds(_))
        ));
    }

    #[test]
    fn fixed_buffer_errors_instead_of_growing() {
        let mut buf = Buffer::fixed(4);
        buf.write_slice(b"abcd").unwrap();
        assert!(matches!(
            buf.write_u8(b'e'),
            Err(BufferError::OutOfBounds(_))
        ));
    }

    #[test]
    fn dynamic_buffer_grows_geometrically() {
        let mut buf = Buffer::dynamic(1);
        buf.write_slice(b"0123456789").unwrap();
        assert!(buf.capacity() >= 10);
        assert_eq!(buf.readable(), 10);
    }

    #[test]
    fn read_past_writer_index_is_out_of_bounds() {
        let mut buf = Buffer::dynamic(4);
        buf.write_slice(b"ab").unwrap();
        assert!(matches!(
            buf.read_exact(3),
            Err(BufferError::OutOfBounds(_))
        ));
    }
}
