//! Encodes/decodes [`Frame`]s against an accumulating [`Buffer`] (§4.4,
//! §6). Decoding is incremental: a partial frame returns `Ok(None)` so the
//! caller can read more bytes off the socket and try again without losing
//! already-buffered data.

use {
    crate::frame::{FrameFlags, HEADER_LEN, MAGIC},
    rpc_buffer::Buffer,
    thiserror::Error,
};

pub use crate::frame::Frame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("bad magic number in frame header")]
    BadMagic,
    #[error("body length {len} exceeds the configured payload limit {max}")]
    BodyTooLarge { len: usize, max: usize },
    #[error("buffer error: {0}")]
    Buffer(#[from] rpc_buffer::BufferError),
}

/// Default payload ceiling (§6.1 `payload`), matched against the body
/// length field; exceeding it is a [`CodecError::BodyTooLarge`] and the
/// connection is kept (§8: "body length > payload -> SERIALIZATION error
/// and connection kept").
pub const DEFAULT_PAYLOAD_MAX: usize = 8 * 1024 * 1024;

pub struct Codec {
    payload_max: usize,
}

impl Codec {
    pub fn new(payload_max: usize) -> Self {
        Self { payload_max }
    }

    pub fn encode(&self, frame: &Frame, out: &mut Buffer) -> Result<(), CodecError> {
        out.ensure_writable(HEADER_LEN + frame.body.len())?;
        out.write_slice(&MAGIC.to_be_bytes())?;
        out.write_u8(frame.flags.as_byte())?;
        out.write_u8(frame.status)?;
        out.write_slice(&frame.id.to_be_bytes())?;
        out.write_slice(&(frame.body.len() as u32).to_be_bytes())?;
        out.write_slice(&frame.body)?;
        Ok(())
    }

    /// Attempts to decode one frame from the head of `buf`. Returns
    /// `Ok(None)` when fewer than a full frame's worth of bytes are
    /// buffered; the reader index is left unadvanced in that case so a
    /// subsequent call after more bytes arrive starts from the same place.
    pub fn decode(&self, buf: &mut Buffer) -> Result<Option<Frame>, CodecError> {
        if buf.readable() < HEADER_LEN {
            return Ok(None);
        }
        buf.mark_reader_index();

        let magic = u16::from_be_bytes(buf.read_exact(2)?.try_into().unwrap());
        if magic != MAGIC {
            buf.reset_reader_index()?;
            return Err(CodecError::BadMagic);
        }
        let flags = FrameFlags::from_byte(buf.read_u8()?);
        let status = buf.read_u8()?;
        let id = u64::from_be_bytes(buf.read_exact(8)?.try_into().unwrap());
        let len = u32::from_be_bytes(buf.read_exact(4)?.try_into().unwrap()) as usize;

        if buf.readable() < len {
            buf.reset_reader_index()?;
            return Ok(None);
        }

        if len > self.payload_max {
            // The frame is structurally complete; skip its body so the
            // stream stays in sync for the next frame instead of wedging.
            buf.skip(len)?;
            return Err(CodecError::BodyTooLarge {
                len,
                max: self.payload_max,
            });
        }

        let body = buf.read_exact(len)?.to_vec();
        Ok(Some(Frame {
            flags,
            status,
            id,
            body,
        }))
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_request_frame() {
        let codec = Codec::default();
        let frame = Frame::request(42, true, false, 6, b"hello".to_vec());
        let mut buf = Buffer::dynamic(64);
        codec.encode(&frame, &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.id, frame.id);
        assert_eq!(decoded.body, frame.body);
        assert_eq!(decoded.flags, frame.flags);
    }

    #[test]
    fn partial_frame_returns_none_and_preserves_bytes() {
        let codec = Codec::default();
        let frame = Frame::request(1, true, false, 6, b"payload-body".to_vec());
        let mut full = Buffer::dynamic(64);
        codec.encode(&frame, &mut full).unwrap();
        let all_bytes = full.readable_slice().to_vec();

        let mut partial = Buffer::dynamic(64);
        partial.write_slice(&all_bytes[..all_bytes.len() - 3]).unwrap();
        assert!(codec.decode(&mut partial).unwrap().is_none());
        assert_eq!(partial.reader_index(), 0);

        partial.write_slice(&all_bytes[all_bytes.len() - 3..]).unwrap();
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded.body, frame.body);
    }

    #[test]
    fn oversized_body_errors_but_stream_stays_aligned() {
        let codec = Codec::new(4);
        let frame = Frame::request(1, true, false, 6, b"too-large-a-body".to_vec());
        let mut buf = Buffer::dynamic(64);
        Codec::default().encode(&frame, &mut buf).unwrap();

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, CodecError::BodyTooLarge { .. }));
        assert_eq!(buf.readable(), 0);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let codec = Codec::default();
        let mut buf = Buffer::dynamic(32);
        buf.write_slice(&0xFFFFu16.to_be_bytes()).unwrap();
        buf.write_slice(&[0u8; 14]).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap_err(), CodecError::BadMagic);
    }
}
