//! Echo machines.
//!
//! A family of small protocols used by the binary and the integration tests:
//! servers that repeat every noise they hear, and a client that makes noises
//! one at a time and records what comes back.

use eventstate_core::{CoreError, MachineDefinition, Message, MessageKey, MessageType};
use eventstate_protocol::WireMode;
use eventstate_transport::Protocol;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// The only message the echo machines exchange. Its body is the noise.
#[derive(Debug, Clone, Copy)]
pub struct EchoMessage;

impl MessageType for EchoMessage {
    const TYPE_NAME: &'static str = "eventstate::echo::EchoMessage";
}

/// Builds an echo message carrying `noise`.
pub fn echo_message(noise: impl Into<String>) -> Message {
    Message::text(EchoMessage::TYPE_NAME, noise)
}

/// Log shared by every connection of a [`logging_echo_server`].
pub type EchoLog = Arc<Mutex<Vec<String>>>;

pub const ECHO_SERVER: &str = "eventstate::echo::EchoServer";
pub const LOGGING_ECHO_SERVER: &str = "eventstate::echo::LoggingEchoServer";
pub const DELAYED_ECHO_SERVER: &str = "eventstate::echo::DelayedEchoServer";
pub const ECHO_CLIENT: &str = "eventstate::echo::EchoClient";

/// listening --recv echo_message--> echoing --send echo_message--> listening.
///
/// Entering `echoing` sends the received noise straight back.
pub fn echo_server() -> Result<MachineDefinition<()>, CoreError> {
    MachineDefinition::<()>::build(ECHO_SERVER, |m| {
        m.state("listening", |m| {
            m.on_recv(MessageKey::of::<EchoMessage>(), "echoing")?;
            Ok(())
        })?;
        m.state("echoing", |m| {
            m.on_enter(|ctx| {
                if let Some(noise) = ctx.message().cloned() {
                    ctx.send(noise);
                }
            })?;
            m.on_send(MessageKey::of::<EchoMessage>(), "listening")?;
            Ok(())
        })?;
        Ok(())
    })
}

/// [`echo_server`] that also writes every enter and exit to a shared log.
pub fn logging_echo_server() -> Result<MachineDefinition<EchoLog>, CoreError> {
    MachineDefinition::<EchoLog>::build(LOGGING_ECHO_SERVER, |m| {
        m.state("listening", |m| {
            m.on_enter(|ctx| ctx.data().lock().push("entering listening state".into()))?;
            m.on_recv(MessageKey::of::<EchoMessage>(), "echoing")?;
            m.on_exit(|ctx| ctx.data().lock().push("exiting listening state".into()))?;
            Ok(())
        })?;
        m.state("echoing", |m| {
            m.on_enter(|ctx| {
                let Some(noise) = ctx.message().cloned() else {
                    return;
                };
                let text = noise.as_text().unwrap_or_default();
                ctx.data().lock().push(format!("echoing {}", text));
                ctx.send(noise);
            })?;
            m.on_send(MessageKey::of::<EchoMessage>(), "listening")?;
            m.on_exit(|ctx| ctx.data().lock().push("exiting echoing state".into()))?;
            Ok(())
        })?;
        Ok(())
    })
}

/// Echoes each noise after `delay`, staying in `listening` throughout.
pub fn delayed_echo_server(delay: Duration) -> Result<MachineDefinition<()>, CoreError> {
    MachineDefinition::<()>::build(DELAYED_ECHO_SERVER, |m| {
        m.state("listening", |m| {
            m.on_recv_with(MessageKey::of::<EchoMessage>(), "listening", move |ctx| {
                if let Some(noise) = ctx.message().cloned() {
                    ctx.send_after(delay, noise);
                }
            })?;
            m.on_send(MessageKey::of::<EchoMessage>(), "listening")?;
            Ok(())
        })?;
        Ok(())
    })
}

/// Side data of an [`echo_client`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EchoClientData {
    /// Noises still to make, front first.
    pub noises: VecDeque<String>,
    /// Echoes heard so far.
    pub recorder: Vec<String>,
}

impl EchoClientData {
    pub fn new<I, S>(noises: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            noises: noises.into_iter().map(Into::into).collect(),
            recorder: Vec::new(),
        }
    }
}

/// speaking --send echo_message--> listening --recv echo_message--> speaking.
///
/// Entering `speaking` makes the next noise, or closes the connection once
/// there are none left.
pub fn echo_client() -> Result<MachineDefinition<EchoClientData>, CoreError> {
    MachineDefinition::<EchoClientData>::build(ECHO_CLIENT, |m| {
        m.state("speaking", |m| {
            m.on_enter(|ctx| match ctx.data_mut().noises.pop_front() {
                Some(noise) => ctx.send(echo_message(noise)),
                None => ctx.close(),
            })?;
            m.on_send(MessageKey::of::<EchoMessage>(), "listening")?;
            Ok(())
        })?;
        m.state("listening", |m| {
            m.on_recv_with(MessageKey::of::<EchoMessage>(), "speaking", |ctx| {
                let echo = ctx
                    .message()
                    .and_then(|msg| msg.as_text())
                    .map(str::to_string);
                if let Some(echo) = echo {
                    ctx.data_mut().recorder.push(echo);
                }
            })?;
            Ok(())
        })?;
        Ok(())
    })
}

fn echo_protocol<D>(
    definition: MachineDefinition<D>,
    wire: WireMode,
    make_data: impl Fn(&eventstate_transport::ConnectionInfo) -> D + Send + Sync + 'static,
) -> Protocol<D> {
    Protocol::new(Arc::new(definition), make_data)
        .with_wire_mode(wire)
        .with_line_type(EchoMessage::TYPE_NAME)
}

/// Serves [`echo_server`].
pub fn echo_server_protocol(wire: WireMode) -> Result<Protocol<()>, CoreError> {
    Ok(echo_protocol(echo_server()?, wire, |_| ()))
}

/// Serves [`logging_echo_server`]; every connection appends to `log`.
pub fn logging_echo_server_protocol(
    wire: WireMode,
    log: EchoLog,
) -> Result<Protocol<EchoLog>, CoreError> {
    Ok(echo_protocol(logging_echo_server()?, wire, move |_| {
        Arc::clone(&log)
    }))
}

/// Serves [`delayed_echo_server`].
pub fn delayed_echo_server_protocol(
    wire: WireMode,
    delay: Duration,
) -> Result<Protocol<()>, CoreError> {
    Ok(echo_protocol(delayed_echo_server(delay)?, wire, |_| ()))
}

/// Runs [`echo_client`]; every connection makes the same `noises`.
pub fn echo_client_protocol(
    wire: WireMode,
    noises: Vec<String>,
) -> Result<Protocol<EchoClientData>, CoreError> {
    Ok(echo_protocol(echo_client()?, wire, move |_| {
        EchoClientData::new(noises.iter().cloned())
    }))
}
