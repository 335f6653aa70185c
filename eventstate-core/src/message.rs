//! Message values and transition keys.

use crate::error::CoreError;
use crate::name::{derive_message_name, validate_message_name};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Implemented by typed messages carried over the object protocol.
pub trait MessageType {
    /// Namespaced type identifier, e.g. `eventstate::echo::EchoMessage`.
    const TYPE_NAME: &'static str;
}

/// A decoded message: a type tag plus an arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Type identifier, resolved to a transition key via name derivation.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Message body.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub body: Value,
}

impl Message {
    pub fn new(type_name: impl Into<String>, body: Value) -> Self {
        Self {
            type_name: type_name.into(),
            body,
        }
    }

    /// Creates a message whose body is a plain string.
    pub fn text(type_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(type_name, Value::String(text.into()))
    }

    /// Creates a message of a typed message kind.
    pub fn of<T: MessageType>(body: Value) -> Self {
        Self::new(T::TYPE_NAME, body)
    }

    /// Canonical name used as the transition key.
    pub fn name(&self) -> Result<String, CoreError> {
        derive_message_name(&self.type_name)
    }

    /// Returns the body as text, if it is a JSON string.
    pub fn as_text(&self) -> Option<&str> {
        self.body.as_str()
    }
}

/// How a transition names the message that triggers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    /// A bare canonical name, used as is.
    Name(String),
    /// A type identifier, resolved through name derivation.
    Type(String),
}

impl MessageKey {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        MessageKey::Type(type_name.into())
    }

    pub fn of<T: MessageType>() -> Self {
        MessageKey::Type(T::TYPE_NAME.to_string())
    }

    /// Resolves the key to its canonical message name.
    pub fn resolve(&self) -> Result<String, CoreError> {
        match self {
            MessageKey::Name(name) => validate_message_name(name).map(str::to_string),
            MessageKey::Type(type_name) => derive_message_name(type_name),
        }
    }
}

impl From<&str> for MessageKey {
    fn from(s: &str) -> Self {
        MessageKey::Name(s.to_string())
    }
}

impl From<String> for MessageKey {
    fn from(s: String) -> Self {
        MessageKey::Name(s)
    }
}
