//! Machine instances: one live execution of a definition per connection.

use crate::definition::{Action, EventKind, MachineDefinition, State, Transition};
use crate::dot::DotExporter;
use crate::error::CoreError;
use crate::message::Message;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of sends flushed for a single trigger.
pub const MAX_CHAINED_SENDS: usize = 1024;

/// Output accumulated by an instance, drained by the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outbox {
    /// Messages to write now, in order.
    pub messages: Vec<Message>,
    /// Messages to send once their delay elapses, in scheduling order.
    pub scheduled: Vec<(Duration, Message)>,
    /// The instance asked for its connection to be closed.
    pub close: bool,
}

impl Outbox {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.scheduled.is_empty() && !self.close
    }
}

/// What an action sees while it runs.
pub struct Context<'a, D> {
    state: &'a State,
    message: Option<&'a Message>,
    data: &'a mut D,
    sends: &'a mut VecDeque<Message>,
    outbox: &'a mut Outbox,
}

impl<'a, D> Context<'a, D> {
    /// Current state of the instance.
    pub fn state(&self) -> &State {
        self.state
    }

    /// Message that triggered the running transition, if any.
    pub fn message(&self) -> Option<&Message> {
        self.message
    }

    pub fn data(&self) -> &D {
        self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        self.data
    }

    /// Sends a message once the running transition is complete.
    pub fn send(&mut self, message: Message) {
        self.sends.push_back(message);
    }

    /// Sends a message after `delay`; the transport owns the timer.
    pub fn send_after(&mut self, delay: Duration, message: Message) {
        self.outbox.scheduled.push((delay, message));
    }

    /// Asks the transport to close the connection after pending writes.
    pub fn close(&mut self) {
        self.outbox.close = true;
    }
}

/// A running state machine bound to one connection.
pub struct MachineInstance<D> {
    definition: Arc<MachineDefinition<D>>,
    current: State,
    data: D,
    sends: VecDeque<Message>,
    outbox: Outbox,
}

impl<D> MachineInstance<D> {
    /// Creates an instance and enters the initial state.
    pub fn new(definition: Arc<MachineDefinition<D>>, data: D) -> Result<Self, CoreError> {
        let current = definition.initial().clone();
        let mut instance = Self {
            definition: Arc::clone(&definition),
            current,
            data,
            sends: VecDeque::new(),
            outbox: Outbox::default(),
        };

        if let Some(enter) = definition
            .state_def(&instance.current)
            .and_then(|s| s.on_enter.as_ref())
        {
            instance.run_action(enter, None);
        }
        instance.flush_sends(&definition)?;

        tracing::debug!(
            "[{}] Started in state '{}'",
            definition.name(),
            instance.current
        );
        Ok(instance)
    }

    /// Dispatches a decoded message by its canonical name.
    pub fn dispatch(&mut self, message: &Message) -> Result<(), CoreError> {
        let name = message.name()?;
        self.recv_named(&name, Some(message))
    }

    /// Dispatches a bare message name with no message value.
    pub fn recv(&mut self, name: &str) -> Result<(), CoreError> {
        self.recv_named(name, None)
    }

    fn recv_named(&mut self, name: &str, message: Option<&Message>) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);
        let Some(transition) = definition.get_transition(&self.current, EventKind::Recv, name)
        else {
            return Err(CoreError::UnhandledMessage {
                state: self.current.0.clone(),
                message: name.to_string(),
            });
        };

        self.apply(&definition, transition, message);
        self.flush_sends(&definition)
    }

    /// Sends a message: queues it for writing and fires the matching send
    /// transition of the current state, if any.
    pub fn send(&mut self, message: Message) -> Result<(), CoreError> {
        let definition = Arc::clone(&self.definition);
        self.sends.push_back(message);
        self.flush_sends(&definition)
    }

    /// exit(from), then the state change, then enter(to), then the handler.
    fn apply(
        &mut self,
        definition: &MachineDefinition<D>,
        transition: &Transition<D>,
        message: Option<&Message>,
    ) {
        if let Some(exit) = definition
            .state_def(&self.current)
            .and_then(|s| s.on_exit.as_ref())
        {
            self.run_action(exit, message);
        }

        tracing::debug!(
            "[{}] {} -> {} on {} '{}'",
            definition.name(),
            self.current,
            transition.to,
            transition.kind,
            transition.message
        );
        self.current = transition.to.clone();

        if let Some(enter) = definition
            .state_def(&self.current)
            .and_then(|s| s.on_enter.as_ref())
        {
            self.run_action(enter, message);
        }

        if let Some(handler) = transition.handler.as_ref() {
            self.run_action(handler, message);
        }
    }

    fn flush_sends(&mut self, definition: &MachineDefinition<D>) -> Result<(), CoreError> {
        let mut flushed = 0;
        while let Some(message) = self.sends.pop_front() {
            flushed += 1;
            if flushed > MAX_CHAINED_SENDS {
                self.sends.clear();
                return Err(CoreError::SendLoop {
                    state: self.current.0.clone(),
                    limit: MAX_CHAINED_SENDS,
                });
            }

            let name = match message.name() {
                Ok(name) => name,
                Err(e) => {
                    self.sends.clear();
                    return Err(e);
                }
            };
            self.outbox.messages.push(message.clone());

            match definition.get_transition(&self.current, EventKind::Send, &name) {
                Some(transition) => self.apply(definition, transition, Some(&message)),
                None => tracing::trace!(
                    "[{}] Sent '{}' in state '{}' without transition",
                    definition.name(),
                    name,
                    self.current
                ),
            }
        }
        Ok(())
    }

    fn run_action(&mut self, action: &Action<D>, message: Option<&Message>) {
        let mut ctx = Context {
            state: &self.current,
            message,
            data: &mut self.data,
            sends: &mut self.sends,
            outbox: &mut self.outbox,
        };
        action(&mut ctx);
    }

    /// Drains the output accumulated so far.
    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }

    /// Returns true if an action asked for the connection to close.
    pub fn close_requested(&self) -> bool {
        self.outbox.close
    }

    pub fn current_state(&self) -> &State {
        &self.current
    }

    pub fn definition(&self) -> &Arc<MachineDefinition<D>> {
        &self.definition
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut D {
        &mut self.data
    }

    pub fn into_data(self) -> D {
        self.data
    }

    /// Renders the definition with the current state highlighted.
    pub fn to_dot(&self, attributes: &[&str]) -> String {
        DotExporter::new(&self.definition)
            .current(self.current.as_str())
            .attributes(attributes.iter().copied())
            .render()
    }
}
