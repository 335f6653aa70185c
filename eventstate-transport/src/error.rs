//! Transport error types.

use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] eventstate_protocol::ProtocolError),

    #[error("machine error: {0}")]
    Core(#[from] eventstate_core::CoreError),

    #[error("connect timeout")]
    Timeout,

    #[error("connection task failed: {0}")]
    Join(String),

    #[error("server shutting down")]
    ShuttingDown,
}

impl TransportError {
    /// Returns a stable error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            TransportError::Io(_) => "IO_ERROR",
            TransportError::Protocol(e) => e.error_code(),
            TransportError::Core(e) => e.error_code(),
            TransportError::Timeout => "TIMEOUT",
            TransportError::Join(_) => "INTERNAL_ERROR",
            TransportError::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// Returns whether reconnecting may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_) | TransportError::Timeout | TransportError::ShuttingDown
        )
    }
}
