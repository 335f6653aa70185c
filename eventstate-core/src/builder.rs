//! Declarative DSL for machine definitions.
//!
//! ```rust
//! use eventstate_core::{EventKind, MachineDefinition};
//!
//! let def = MachineDefinition::<()>::build("Greeter", |m| {
//!     m.state("foo", |m| m.on_recv("hello", "bar"))?;
//!     m.state("bar", |m| m.on_recv("good_bye", "foo"))?;
//!     Ok(())
//! })
//! .unwrap();
//!
//! assert_eq!(
//!     def.transitions()[0].as_tuple(),
//!     ("foo", EventKind::Recv, "hello", "bar")
//! );
//! ```
//!
//! State bodies cannot declare further states: the builder tracks the open
//! state scope and fails with [`CoreError::NestedState`] on entry.

use crate::definition::{Action, EventKind, MachineDefinition, State, StateDef, Transition};
use crate::error::CoreError;
use crate::instance::Context;
use crate::message::MessageKey;
use std::collections::HashMap;
use std::sync::Arc;

/// Accumulates states and transitions while a definition is declared.
pub struct MachineBuilder<D> {
    name: String,
    states: Vec<StateDef<D>>,
    state_index: HashMap<State, usize>,
    transitions: Vec<Transition<D>>,
    /// Index of the state whose body is running, if any.
    scope: Option<usize>,
    /// Nesting violation, kept so `build` fails even if the caller drops it.
    nested: Option<(String, String)>,
}

impl<D> MachineBuilder<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            state_index: HashMap::new(),
            transitions: Vec::new(),
            scope: None,
            nested: None,
        }
    }

    /// Declares `name` (or re-opens it) and runs `body` scoped to it.
    ///
    /// The first state ever declared is the initial state.
    pub fn state<F>(&mut self, name: impl Into<State>, body: F) -> Result<&mut Self, CoreError>
    where
        F: FnOnce(&mut Self) -> Result<(), CoreError>,
    {
        let state = name.into();
        if let Some(outer) = self.scope {
            let outer = self.states[outer].state.0.clone();
            self.nested.get_or_insert_with(|| (outer.clone(), state.0.clone()));
            return Err(CoreError::NestedState {
                outer,
                inner: state.0,
            });
        }

        let index = match self.state_index.get(&state) {
            Some(&i) => i,
            None => {
                self.states.push(StateDef::new(state.clone()));
                self.state_index.insert(state, self.states.len() - 1);
                self.states.len() - 1
            }
        };

        self.scope = Some(index);
        let result = body(self);
        self.scope = None;
        result?;

        Ok(self)
    }

    /// Transition on receiving `message`, from the enclosing state to `to`.
    pub fn on_recv(
        &mut self,
        message: impl Into<MessageKey>,
        to: impl Into<State>,
    ) -> Result<(), CoreError> {
        self.on(EventKind::Recv, message, to, None)
    }

    /// Like [`on_recv`](Self::on_recv), running `handler` after entering `to`.
    pub fn on_recv_with<F>(
        &mut self,
        message: impl Into<MessageKey>,
        to: impl Into<State>,
        handler: F,
    ) -> Result<(), CoreError>
    where
        F: Fn(&mut Context<'_, D>) + Send + Sync + 'static,
    {
        self.on(EventKind::Recv, message, to, Some(Arc::new(handler)))
    }

    /// Transition on sending `message`, from the enclosing state to `to`.
    pub fn on_send(
        &mut self,
        message: impl Into<MessageKey>,
        to: impl Into<State>,
    ) -> Result<(), CoreError> {
        self.on(EventKind::Send, message, to, None)
    }

    /// Registers the enter action of the enclosing state.
    pub fn on_enter<F>(&mut self, action: F) -> Result<(), CoreError>
    where
        F: Fn(&mut Context<'_, D>) + Send + Sync + 'static,
    {
        let state = self.scoped_state("on_enter")?;
        if state.on_enter.is_some() {
            return Err(CoreError::ConflictingAction {
                state: state.state.0.clone(),
                action: "enter",
            });
        }
        state.on_enter = Some(Arc::new(action));
        Ok(())
    }

    /// Registers the exit action of the enclosing state.
    pub fn on_exit<F>(&mut self, action: F) -> Result<(), CoreError>
    where
        F: Fn(&mut Context<'_, D>) + Send + Sync + 'static,
    {
        let state = self.scoped_state("on_exit")?;
        if state.on_exit.is_some() {
            return Err(CoreError::ConflictingAction {
                state: state.state.0.clone(),
                action: "exit",
            });
        }
        state.on_exit = Some(Arc::new(action));
        Ok(())
    }

    /// Registers a transition of any kind from the enclosing state.
    pub fn on(
        &mut self,
        kind: EventKind,
        message: impl Into<MessageKey>,
        to: impl Into<State>,
        handler: Option<Action<D>>,
    ) -> Result<(), CoreError> {
        let from = self.scoped_state(kind.as_str())?.state.clone();
        let message = message.into().resolve()?;

        if self
            .transitions
            .iter()
            .any(|t| t.from == from && t.kind == kind && t.message == message)
        {
            return Err(CoreError::DuplicateTransition {
                state: from.0,
                kind,
                message,
            });
        }

        self.transitions.push(Transition {
            from,
            kind,
            message,
            to: to.into(),
            handler,
        });
        Ok(())
    }

    /// Transitions declared so far, in declaration order.
    pub fn transitions(&self) -> &[Transition<D>] {
        &self.transitions
    }

    /// Returns true while a state body is running.
    pub fn in_state(&self) -> bool {
        self.scope.is_some()
    }

    /// Validates the declarations and freezes them into a definition.
    pub fn build(self) -> Result<MachineDefinition<D>, CoreError> {
        if let Some((outer, inner)) = self.nested {
            return Err(CoreError::NestedState { outer, inner });
        }
        MachineDefinition::from_parts(self.name, self.states, self.transitions)
    }

    fn scoped_state(&mut self, operation: &'static str) -> Result<&mut StateDef<D>, CoreError> {
        match self.scope {
            Some(i) => Ok(&mut self.states[i]),
            None => Err(CoreError::OutsideState { operation }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsl_basic() {
        let mut t = MachineBuilder::<()>::new("MachineDSLTester");
        t.state("foo", |t| t.on_recv("hello", "bar")).unwrap();
        t.state("bar", |t| t.on_recv("good_bye", "foo")).unwrap();

        let transitions: Vec<_> = t.transitions().iter().map(|t| t.as_tuple()).collect();
        assert_eq!(
            transitions,
            vec![
                ("foo", EventKind::Recv, "hello", "bar"),
                ("bar", EventKind::Recv, "good_bye", "foo"),
            ]
        );

        let def = t.build().unwrap();
        assert_eq!(def.initial().as_str(), "foo");
        assert_eq!(def.transitions().len(), 2);
    }

    #[test]
    fn test_dsl_no_nested_states() {
        let mut t = MachineBuilder::<()>::new("MachineDSLTester");
        let result = t.state("foo", |t| {
            t.state("bar", |_| Ok(()))?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(CoreError::NestedState { ref outer, ref inner }) if outer == "foo" && inner == "bar"
        ));
        // The failed scope is closed again.
        assert!(!t.in_state());
    }

    #[test]
    fn test_discarded_nested_state_error_still_fails_build() {
        let result = MachineDefinition::<()>::build("Swallow", |m| {
            m.state("foo", |m| {
                let _ = m.state("bar", |_| Ok(()));
                Ok(())
            })?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(CoreError::NestedState { ref outer, ref inner }) if outer == "foo" && inner == "bar"
        ));
    }

    #[test]
    fn test_nested_state_fails_even_with_actions() {
        let result = MachineDefinition::<()>::build("Nested", |m| {
            m.state("outer", |m| {
                m.on_enter(|_| {})?;
                m.state("inner", |m| m.on_recv("ping", "outer"))?;
                Ok(())
            })?;
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::NestedState { .. })));
    }

    #[test]
    fn test_declarations_outside_state() {
        let mut t = MachineBuilder::<()>::new("Loose");
        assert!(matches!(
            t.on_recv("hello", "bar"),
            Err(CoreError::OutsideState { operation: "recv" })
        ));
        assert!(matches!(
            t.on_enter(|_| {}),
            Err(CoreError::OutsideState { operation: "on_enter" })
        ));
    }

    #[test]
    fn test_type_keys_are_derived() {
        let def = MachineDefinition::<()>::build("Typed", |m| {
            m.state("idle", |m| {
                m.on_recv(MessageKey::of_type("Proto::StartSession"), "busy")
            })?;
            m.state("busy", |_| Ok(()))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            def.transitions()[0].as_tuple(),
            ("idle", EventKind::Recv, "start_session", "busy")
        );
    }

    #[test]
    fn test_undeclared_target_rejected_at_build() {
        let result = MachineDefinition::<()>::build("Dangling", |m| {
            m.state("a", |m| m.on_recv("go", "nowhere"))?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(CoreError::UndeclaredState { ref state, .. }) if state == "nowhere"
        ));
    }

    #[test]
    fn test_duplicate_transition_rejected() {
        let result = MachineDefinition::<()>::build("Dup", |m| {
            m.state("a", |m| {
                m.on_recv("go", "a")?;
                m.on_recv("go", "a")
            })?;
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::DuplicateTransition { .. })));

        // Same name under a different event kind is fine.
        let result = MachineDefinition::<()>::build("SendAndRecv", |m| {
            m.state("a", |m| {
                m.on_recv("go", "a")?;
                m.on_send("go", "a")
            })?;
            Ok(())
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_reopened_state_keeps_transitions() {
        let def = MachineDefinition::<()>::build("Reopen", |m| {
            m.state("a", |m| m.on_recv("one", "b"))?;
            m.state("b", |m| m.on_enter(|_| {}))?;
            m.state("a", |m| m.on_recv("two", "b"))?;
            Ok(())
        })
        .unwrap();

        assert_eq!(def.states().count(), 2);
        assert_eq!(
            def.messages_from(&State::from("a"), EventKind::Recv),
            vec!["one", "two"]
        );
    }

    #[test]
    fn test_conflicting_actions_rejected() {
        let result = MachineDefinition::<()>::build("Conflict", |m| {
            m.state("a", |m| m.on_exit(|_| {}))?;
            m.state("a", |m| m.on_exit(|_| {}))?;
            Ok(())
        });
        assert!(matches!(
            result,
            Err(CoreError::ConflictingAction { action: "exit", .. })
        ));
    }
}
