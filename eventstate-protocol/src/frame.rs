//! Object protocol framing.
//!
//! Each message is a JSON object `{"type": ..., "body": ...}` wrapped in a
//! frame (8 bytes header + payload):
//!
//! ```text
//! +-------------+--------+---------------------+
//! | payload_len | crc32c | payload             |
//! |   4 bytes   | 4 bytes| payload_len bytes   |
//! +-------------+--------+---------------------+
//! ```
//!
//! Integers are big-endian; the CRC covers the payload only.

use crate::error::ProtocolError;
use crate::MAX_PAYLOAD_SIZE;
use bytes::{Buf, BufMut, BytesMut};
use eventstate_core::Message;

/// Size of the frame header in bytes (4+4 = 8).
pub const FRAME_HEADER_SIZE: usize = 8;

/// Encodes and decodes object protocol frames.
#[derive(Debug, Clone, Default)]
pub struct ObjectCodec;

impl ObjectCodec {
    pub fn new() -> Self {
        Self
    }

    /// Appends the framed message to `dst`.
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let payload = serde_json::to_vec(message)?;
        let payload_len = payload.len() as u32;
        if payload.len() > MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + payload.len());
        dst.put_u32(payload_len);
        dst.put_u32(crc32c::crc32c(&payload));
        dst.put_slice(&payload);
        Ok(())
    }

    /// Decodes one message from the front of `buf`.
    ///
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }
        let crc_expected = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let total_len = FRAME_HEADER_SIZE + payload_len as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len as usize).freeze();

        let crc_actual = crc32c::crc32c(&payload);
        if crc_actual != crc_expected {
            return Err(ProtocolError::CrcMismatch {
                expected: crc_expected,
                actual: crc_actual,
            });
        }

        let json = std::str::from_utf8(&payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Some(serde_json::from_str(json)?))
    }
}
