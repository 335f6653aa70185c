//! Per-connection buffering codec.

use crate::error::ProtocolError;
use crate::frame::ObjectCodec;
use crate::line::LineCodec;
use bytes::BytesMut;
use eventstate_core::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire format spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireMode {
    /// Newline-terminated text, one fixed message type.
    #[default]
    Line,
    /// Length-prefixed JSON messages carrying their own type.
    Object,
}

impl FromStr for WireMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(WireMode::Line),
            "object" => Ok(WireMode::Object),
            other => Err(ProtocolError::UnknownWireMode(other.to_string())),
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMode::Line => f.write_str("line"),
            WireMode::Object => f.write_str("object"),
        }
    }
}

#[derive(Debug, Clone)]
enum Inner {
    Line(LineCodec),
    Object(ObjectCodec),
}

/// Buffers inbound bytes and turns them into messages, and back.
#[derive(Debug, Clone)]
pub struct Codec {
    inner: Inner,
    buffer: BytesMut,
}

impl Codec {
    /// Creates a codec for `mode`; line messages are tagged with `line_type`.
    pub fn new(mode: WireMode, line_type: &str) -> Self {
        let inner = match mode {
            WireMode::Line => Inner::Line(LineCodec::new(line_type)),
            WireMode::Object => Inner::Object(ObjectCodec::new()),
        };
        Self {
            inner,
            buffer: BytesMut::with_capacity(8192),
        }
    }

    pub fn line(codec: LineCodec) -> Self {
        Self {
            inner: Inner::Line(codec),
            buffer: BytesMut::with_capacity(8192),
        }
    }

    pub fn object() -> Self {
        Self::new(WireMode::Object, "")
    }

    pub fn mode(&self) -> WireMode {
        match self.inner {
            Inner::Line(_) => WireMode::Line,
            Inner::Object(_) => WireMode::Object,
        }
    }

    /// Appends inbound data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next message from the buffer.
    pub fn decode_next(&mut self) -> Result<Option<Message>, ProtocolError> {
        match &self.inner {
            Inner::Line(codec) => codec.decode(&mut self.buffer),
            Inner::Object(codec) => codec.decode(&mut self.buffer),
        }
    }

    /// Encodes a message for writing.
    pub fn encode(&self, message: &Message) -> Result<BytesMut, ProtocolError> {
        let mut dst = BytesMut::new();
        self.encode_into(message, &mut dst)?;
        Ok(dst)
    }

    /// Encodes a message, appending to `dst`.
    pub fn encode_into(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match &self.inner {
            Inner::Line(codec) => codec.encode(message, dst),
            Inner::Object(codec) => codec.encode(message, dst),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
