//! # eventstate
//!
//! Network protocol endpoints written as explicit finite state machines.
//!
//! The engine lives in `eventstate-core`, the wire codecs in
//! `eventstate-protocol` and the TCP binding in `eventstate-transport`; this
//! crate re-exports their main types and adds the echo demo machines.

pub mod echo;

pub use eventstate_core::{
    Context, CoreError, EventKind, MachineBuilder, MachineDefinition, MachineInstance, Message,
    MessageKey, MessageType, State,
};
pub use eventstate_protocol::{Codec, ProtocolError, WireMode};
pub use eventstate_transport::{
    connect, start_server, ClientHandle, Config, ConnectConfig, Protocol, Server, ServerConfig,
    TransportError,
};
