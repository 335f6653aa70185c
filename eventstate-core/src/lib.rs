//! # eventstate-core
//!
//! State machine engine for eventstate.
//!
//! This crate provides:
//! - Canonical message name derivation
//! - Machine definitions and the declaration DSL
//! - Per-connection machine instances and message dispatch
//! - Graphviz DOT export

pub mod builder;
pub mod definition;
pub mod dot;
pub mod error;
pub mod instance;
pub mod message;
pub mod name;

pub use builder::MachineBuilder;
pub use definition::{Action, EventKind, MachineDefinition, MachineDefinitionRaw, State, Transition};
pub use dot::DotExporter;
pub use error::CoreError;
pub use instance::{Context, MachineInstance, Outbox};
pub use message::{Message, MessageKey, MessageType};
pub use name::derive_message_name;
