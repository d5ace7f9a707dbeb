//! Length-prefixed frame codec.
//!
//! Every message on the query transport is a 4-byte big-endian length
//! header followed by a postcard payload. Decoding is incremental: a
//! partial frame leaves the buffer untouched and yields `None`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Size of the length header in bytes.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum payload size accepted on the wire.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// A single length-delimited frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The encoded payload.
    pub payload: Bytes,
}

impl Frame {
    /// Wraps an encoded payload in a frame.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                len: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Self { payload })
    }

    /// Attempts to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a complete
    /// frame; the buffer is only consumed once the whole frame is present.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                len,
                max: MAX_FRAME_SIZE,
            });
        }

        if buf.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Self { payload }))
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.extend_from_slice(&self.payload);
    }
}
