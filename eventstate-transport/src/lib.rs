//! # eventstate-transport
//!
//! TCP binding for eventstate machines.
//!
//! Each connection, accepted or opened, gets its own machine instance driven
//! by a single task that owns the socket, the codec and the delayed-output
//! lane. Inbound messages are dispatched in arrival order; outbound messages
//! are written in the order the machine sent them.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod lane;
pub mod protocol;
pub mod server;

pub use client::{connect, ClientHandle, ConnectConfig};
pub use config::{Config, ConfigError, MachineConfig, NetworkConfig, DEFAULT_PORT};
pub use connection::{drive, TransportStats};
pub use error::TransportError;
pub use lane::ScheduledLane;
pub use protocol::{ConnectionInfo, Protocol, Role};
pub use server::{start_server, Server, ServerConfig, ServerHandle};
