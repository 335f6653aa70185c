//! # eventstate-protocol
//!
//! Wire codecs for eventstate connections.
//!
//! This crate provides:
//! - The line protocol: newline-terminated text, one message per line
//! - The object protocol: length-prefixed, CRC32C-checked JSON messages
//! - A buffering [`Codec`] that picks one of them per connection

pub mod codec;
pub mod error;
pub mod frame;
pub mod line;

pub use codec::{Codec, WireMode};
pub use error::ProtocolError;
pub use frame::{ObjectCodec, FRAME_HEADER_SIZE};
pub use line::LineCodec;

/// Maximum object frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

/// Maximum length of a single line, terminator excluded (64 KiB).
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Type identifier given to line protocol messages by default.
pub const DEFAULT_LINE_TYPE: &str = "eventstate::Line";
