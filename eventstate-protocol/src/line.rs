//! Line protocol: one message per `\n`-terminated line.
//!
//! Every decoded line becomes a message of the same fixed type whose body is
//! the line text. A trailing `\r` is dropped.

use crate::error::ProtocolError;
use crate::{DEFAULT_LINE_TYPE, MAX_LINE_LENGTH};
use bytes::{BufMut, BytesMut};
use eventstate_core::Message;

/// Encodes and decodes line protocol messages.
#[derive(Debug, Clone)]
pub struct LineCodec {
    type_name: String,
    max_length: usize,
}

impl LineCodec {
    /// Creates a codec that tags decoded lines with `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            max_length: MAX_LINE_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Type identifier of decoded messages.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Appends the message as a line to `dst`.
    ///
    /// String bodies are written as is; other bodies as compact JSON.
    pub fn encode(&self, message: &Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let text = match message.as_text() {
            Some(text) => text.to_string(),
            None => serde_json::to_string(&message.body)?,
        };
        if text.contains('\n') {
            return Err(ProtocolError::EmbeddedNewline);
        }

        dst.reserve(text.len() + 1);
        dst.put_slice(text.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }

    /// Decodes one line from the front of `buf`.
    ///
    /// Returns `Ok(None)` if no complete line is buffered yet.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        let Some(pos) = buf.iter().position(|&b| b == b'\n') else {
            if buf.len() > self.max_length {
                return Err(ProtocolError::LineTooLong {
                    len: buf.len(),
                    max: self.max_length,
                });
            }
            return Ok(None);
        };

        let line = buf.split_to(pos + 1);
        let mut text = &line[..pos];
        if text.last() == Some(&b'\r') {
            text = &text[..text.len() - 1];
        }
        if text.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                len: text.len(),
                max: self.max_length,
            });
        }

        let text = std::str::from_utf8(text).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(Some(Message::text(self.type_name.as_str(), text)))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_TYPE)
    }
}
