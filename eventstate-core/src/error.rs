//! Core error types.

use crate::definition::EventKind;
use thiserror::Error;

/// Errors from machine definition and dispatch.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid message identifier: {identifier:?}")]
    InvalidIdentifier { identifier: String },

    #[error("nested state declaration: '{inner}' declared inside '{outer}'")]
    NestedState { outer: String, inner: String },

    #[error("'{operation}' called outside of a state declaration")]
    OutsideState { operation: &'static str },

    #[error("state '{state}' is not declared (referenced by transition from '{from}')")]
    UndeclaredState { state: String, from: String },

    #[error("duplicate transition from '{state}' on {kind} '{message}'")]
    DuplicateTransition {
        state: String,
        kind: EventKind,
        message: String,
    },

    #[error("state '{state}' already has an {action} action")]
    ConflictingAction { state: String, action: &'static str },

    #[error("machine '{machine}' declares no states")]
    EmptyDefinition { machine: String },

    #[error("unhandled message '{message}' in state '{state}'")]
    UnhandledMessage { state: String, message: String },

    #[error("send chain from state '{state}' exceeded {limit} messages")]
    SendLoop { state: String, limit: usize },

    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns whether this error was raised while building a definition.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            CoreError::NestedState { .. }
                | CoreError::OutsideState { .. }
                | CoreError::UndeclaredState { .. }
                | CoreError::DuplicateTransition { .. }
                | CoreError::ConflictingAction { .. }
                | CoreError::EmptyDefinition { .. }
                | CoreError::InvalidDefinition { .. }
        )
    }

    /// Returns whether the owning connection may keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::UnhandledMessage { .. } | CoreError::InvalidIdentifier { .. }
        )
    }

    /// Returns a stable error code for logs and peers.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidIdentifier { .. } => "INVALID_IDENTIFIER",
            CoreError::NestedState { .. } => "NESTED_STATE",
            CoreError::OutsideState { .. } => "OUTSIDE_STATE",
            CoreError::UndeclaredState { .. } => "UNDECLARED_STATE",
            CoreError::DuplicateTransition { .. } => "DUPLICATE_TRANSITION",
            CoreError::ConflictingAction { .. } => "CONFLICTING_ACTION",
            CoreError::EmptyDefinition { .. } => "EMPTY_DEFINITION",
            CoreError::UnhandledMessage { .. } => "UNHANDLED_MESSAGE",
            CoreError::SendLoop { .. } => "SEND_LOOP",
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::Json(_) => "BAD_DEFINITION",
        }
    }
}
