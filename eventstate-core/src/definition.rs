//! State machine definition types.
//!
//! Definitions are normally declared in code with the DSL in
//! [`crate::builder`]. Action-free skeletons can also be loaded from JSON:
//!
//! ```json
//! {
//!   "states": ["speaking", "listening"],
//!   "transitions": [
//!     {"from": "speaking", "on": "send", "message": "echo_message", "to": "listening"},
//!     {"from": "listening", "on": "recv", "message": "echo_message", "to": "speaking"}
//!   ]
//! }
//! ```

use crate::builder::MachineBuilder;
use crate::error::CoreError;
use crate::instance::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Code run on state entry, state exit, or after a transition.
pub type Action<D> = Arc<dyn Fn(&mut Context<'_, D>) + Send + Sync>;

/// A state identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of trigger for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// The instance received a message.
    #[default]
    Recv,
    /// The instance sent a message.
    Send,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Recv => "recv",
            EventKind::Send => "send",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared state with its optional enter and exit actions.
pub struct StateDef<D> {
    pub state: State,
    pub(crate) on_enter: Option<Action<D>>,
    pub(crate) on_exit: Option<Action<D>>,
}

impl<D> StateDef<D> {
    pub(crate) fn new(state: State) -> Self {
        Self {
            state,
            on_enter: None,
            on_exit: None,
        }
    }

    pub fn has_enter_action(&self) -> bool {
        self.on_enter.is_some()
    }

    pub fn has_exit_action(&self) -> bool {
        self.on_exit.is_some()
    }
}

impl<D> fmt::Debug for StateDef<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateDef")
            .field("state", &self.state)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// A transition: `(from, kind, message) -> to`, with an optional handler.
pub struct Transition<D> {
    pub from: State,
    pub kind: EventKind,
    pub message: String,
    pub to: State,
    pub(crate) handler: Option<Action<D>>,
}

impl<D> Transition<D> {
    /// The transition as a plain tuple, in declaration terms.
    pub fn as_tuple(&self) -> (&str, EventKind, &str, &str) {
        (
            self.from.as_str(),
            self.kind,
            self.message.as_str(),
            self.to.as_str(),
        )
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }
}

impl<D> fmt::Debug for Transition<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("to", &self.to)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Raw transition as stored in a JSON skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRaw {
    pub from: String,
    #[serde(default)]
    pub on: EventKind,
    pub message: String,
    pub to: String,
}

/// Raw, action-free machine definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDefinitionRaw {
    /// All states; the first one is initial.
    pub states: Vec<String>,

    #[serde(default)]
    pub transitions: Vec<TransitionRaw>,
}

/// Validated, immutable machine definition.
///
/// Built once and shared by every instance through an `Arc`.
pub struct MachineDefinition<D> {
    name: String,
    states: Vec<StateDef<D>>,
    state_index: HashMap<State, usize>,
    transitions: Vec<Transition<D>>,
    transition_index: HashMap<(State, EventKind, String), usize>,
}

impl<D> MachineDefinition<D> {
    /// Declares a machine with the DSL and validates it.
    pub fn build<F>(name: impl Into<String>, body: F) -> Result<Self, CoreError>
    where
        F: FnOnce(&mut MachineBuilder<D>) -> Result<(), CoreError>,
    {
        let mut builder = MachineBuilder::new(name);
        body(&mut builder)?;
        builder.build()
    }

    /// Parses an action-free skeleton definition from JSON.
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: MachineDefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(name, &raw)
    }

    /// Creates a skeleton definition from raw parts.
    pub fn from_raw(name: impl Into<String>, raw: &MachineDefinitionRaw) -> Result<Self, CoreError> {
        let mut builder = MachineBuilder::new(name);
        for state in &raw.states {
            builder.state(state.as_str(), |_| Ok(()))?;
        }
        for t in &raw.transitions {
            if !raw.states.contains(&t.from) {
                return Err(CoreError::UndeclaredState {
                    state: t.from.clone(),
                    from: t.from.clone(),
                });
            }
            builder.state(t.from.as_str(), |m| {
                m.on(t.on, t.message.as_str(), t.to.as_str(), None)
            })?;
        }
        builder.build()
    }

    pub(crate) fn from_parts(
        name: String,
        states: Vec<StateDef<D>>,
        transitions: Vec<Transition<D>>,
    ) -> Result<Self, CoreError> {
        if states.is_empty() {
            return Err(CoreError::EmptyDefinition { machine: name });
        }

        let state_index: HashMap<State, usize> = states
            .iter()
            .enumerate()
            .map(|(i, s)| (s.state.clone(), i))
            .collect();

        let mut transition_index = HashMap::with_capacity(transitions.len());
        for (i, t) in transitions.iter().enumerate() {
            for referenced in [&t.from, &t.to] {
                if !state_index.contains_key(referenced) {
                    return Err(CoreError::UndeclaredState {
                        state: referenced.0.clone(),
                        from: t.from.0.clone(),
                    });
                }
            }
            let key = (t.from.clone(), t.kind, t.message.clone());
            if transition_index.insert(key, i).is_some() {
                return Err(CoreError::DuplicateTransition {
                    state: t.from.0.clone(),
                    kind: t.kind,
                    message: t.message.clone(),
                });
            }
        }

        Ok(Self {
            name,
            states,
            state_index,
            transitions,
            transition_index,
        })
    }

    /// Machine name, also used as the graph label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The initial state (the first one declared).
    pub fn initial(&self) -> &State {
        &self.states[0].state
    }

    /// Declared states, in declaration order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.iter().map(|s| &s.state)
    }

    /// Transitions, in declaration order.
    pub fn transitions(&self) -> &[Transition<D>] {
        &self.transitions
    }

    /// Returns true if the given state is declared.
    pub fn has_state(&self, state: &str) -> bool {
        self.state_index.contains_key(&State::from(state))
    }

    pub(crate) fn state_def(&self, state: &State) -> Option<&StateDef<D>> {
        self.state_index.get(state).map(|&i| &self.states[i])
    }

    /// Looks up the transition for `(state, kind, message)`.
    pub fn get_transition(
        &self,
        state: &State,
        kind: EventKind,
        message: &str,
    ) -> Option<&Transition<D>> {
        self.transition_index
            .get(&(state.clone(), kind, message.to_string()))
            .map(|&i| &self.transitions[i])
    }

    /// Message names accepted in the given state, in declaration order.
    pub fn messages_from(&self, state: &State, kind: EventKind) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|t| &t.from == state && t.kind == kind)
            .map(|t| t.message.as_str())
            .collect()
    }

    /// Returns true if no transition leaves the given state.
    pub fn is_sink(&self, state: &State) -> bool {
        !self.transitions.iter().any(|t| &t.from == state)
    }

    /// Returns the action-free skeleton of this definition.
    pub fn to_raw(&self) -> MachineDefinitionRaw {
        MachineDefinitionRaw {
            states: self.states.iter().map(|s| s.state.0.clone()).collect(),
            transitions: self
                .transitions
                .iter()
                .map(|t| TransitionRaw {
                    from: t.from.0.clone(),
                    on: t.kind,
                    message: t.message.clone(),
                    to: t.to.0.clone(),
                })
                .collect(),
        }
    }

    /// Returns the skeleton as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(self.to_raw())?)
    }
}

impl<D> fmt::Debug for MachineDefinition<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineDefinition")
            .field("name", &self.name)
            .field("states", &self.states)
            .field("transitions", &self.transitions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_definition() -> serde_json::Value {
        serde_json::json!({
            "states": ["speaking", "listening", "done"],
            "transitions": [
                {"from": "speaking", "on": "send", "message": "echo_message", "to": "listening"},
                {"from": "listening", "message": "echo_message", "to": "speaking"},
                {"from": "listening", "message": "good_bye", "to": "done"}
            ]
        })
    }

    #[test]
    fn test_parse_definition() {
        let def = MachineDefinition::<()>::from_json("client", &sample_definition()).unwrap();

        assert_eq!(def.name(), "client");
        assert_eq!(def.initial().as_str(), "speaking");
        assert_eq!(def.states().count(), 3);
        assert_eq!(def.transitions().len(), 3);
        assert_eq!(
            def.transitions()[1].as_tuple(),
            ("listening", EventKind::Recv, "echo_message", "speaking")
        );
    }

    #[test]
    fn test_transition_lookup() {
        let def = MachineDefinition::<()>::from_json("client", &sample_definition()).unwrap();

        let t = def
            .get_transition(&State::from("speaking"), EventKind::Send, "echo_message")
            .unwrap();
        assert_eq!(t.to.as_str(), "listening");

        assert!(def
            .get_transition(&State::from("speaking"), EventKind::Recv, "echo_message")
            .is_none());
        assert_eq!(
            def.messages_from(&State::from("listening"), EventKind::Recv),
            vec!["echo_message", "good_bye"]
        );
        assert!(def.is_sink(&State::from("done")));
        assert!(!def.is_sink(&State::from("speaking")));
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let def = MachineDefinition::<()>::from_json("client", &sample_definition()).unwrap();
        let again = MachineDefinition::<()>::from_json("client", &def.to_json().unwrap()).unwrap();
        assert_eq!(def.to_raw(), again.to_raw());
    }

    #[test]
    fn test_invalid_transition_target() {
        let json = serde_json::json!({
            "states": ["a", "b"],
            "transitions": [{"from": "a", "message": "go", "to": "c"}]
        });

        let result = MachineDefinition::<()>::from_json("test", &json);
        assert!(matches!(result, Err(CoreError::UndeclaredState { .. })));
    }

    #[test]
    fn test_invalid_transition_source() {
        let json = serde_json::json!({
            "states": ["a"],
            "transitions": [{"from": "z", "message": "go", "to": "a"}]
        });

        let result = MachineDefinition::<()>::from_json("test", &json);
        assert!(matches!(result, Err(CoreError::UndeclaredState { .. })));
    }

    #[test]
    fn test_empty_definition() {
        let json = serde_json::json!({"states": []});
        let result = MachineDefinition::<()>::from_json("test", &json);
        assert!(matches!(result, Err(CoreError::EmptyDefinition { .. })));
    }
}
