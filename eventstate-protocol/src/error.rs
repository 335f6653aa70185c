//! Protocol error types.

use thiserror::Error;

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("line too long: {len} bytes buffered without a terminator (max {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("line message contains a line break")]
    EmbeddedNewline,

    #[error("unknown wire mode: {0}")]
    UnknownWireMode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,
}

impl ProtocolError {
    /// Returns a stable error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::FrameTooLarge { .. } | ProtocolError::LineTooLong { .. } => {
                "MESSAGE_TOO_LARGE"
            }
            ProtocolError::CrcMismatch { .. } => "CHECKSUM_MISMATCH",
            ProtocolError::EmbeddedNewline
            | ProtocolError::Json(_)
            | ProtocolError::InvalidUtf8 => "BAD_MESSAGE",
            ProtocolError::UnknownWireMode(_) => "BAD_CONFIG",
        }
    }
}
