//! Protocol roles: what runs on each connection.

use eventstate_core::{CoreError, MachineDefinition, MachineInstance};
use eventstate_protocol::{Codec, WireMode, DEFAULT_LINE_TYPE};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted by a server.
    Server,
    /// Opened by `connect`.
    Client,
}

/// Identity of one connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Unique connection ID.
    pub id: String,
    /// Remote address.
    pub peer: SocketAddr,
    pub role: Role,
}

impl ConnectionInfo {
    pub fn new(peer: SocketAddr, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            peer,
            role,
        }
    }
}

type DataFactory<D> = Arc<dyn Fn(&ConnectionInfo) -> D + Send + Sync>;

/// A machine definition plus everything needed to run it on a connection.
///
/// One `Protocol` serves every connection; the definition is shared, the
/// side data is created per connection.
pub struct Protocol<D> {
    definition: Arc<MachineDefinition<D>>,
    wire_mode: WireMode,
    line_type: String,
    make_data: DataFactory<D>,
}

impl<D> Protocol<D> {
    pub fn new<F>(definition: Arc<MachineDefinition<D>>, make_data: F) -> Self
    where
        F: Fn(&ConnectionInfo) -> D + Send + Sync + 'static,
    {
        Self {
            definition,
            wire_mode: WireMode::default(),
            line_type: DEFAULT_LINE_TYPE.to_string(),
            make_data: Arc::new(make_data),
        }
    }

    pub fn with_wire_mode(mut self, wire_mode: WireMode) -> Self {
        self.wire_mode = wire_mode;
        self
    }

    /// Sets the type identifier given to line protocol messages.
    pub fn with_line_type(mut self, line_type: impl Into<String>) -> Self {
        self.line_type = line_type.into();
        self
    }

    pub fn definition(&self) -> &Arc<MachineDefinition<D>> {
        &self.definition
    }

    pub fn wire_mode(&self) -> WireMode {
        self.wire_mode
    }

    /// Creates a fresh codec for one connection.
    pub fn codec(&self) -> Codec {
        Codec::new(self.wire_mode, &self.line_type)
    }

    /// Creates the instance for a new connection, entering its initial state.
    pub fn instantiate(&self, info: &ConnectionInfo) -> Result<MachineInstance<D>, CoreError> {
        MachineInstance::new(Arc::clone(&self.definition), (self.make_data)(info))
    }
}

impl<D> Clone for Protocol<D> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            wire_mode: self.wire_mode,
            line_type: self.line_type.clone(),
            make_data: Arc::clone(&self.make_data),
        }
    }
}

impl<D> fmt::Debug for Protocol<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol")
            .field("machine", &self.definition.name())
            .field("wire_mode", &self.wire_mode)
            .field("line_type", &self.line_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instantiate_uses_factory() {
        let def = MachineDefinition::<String>::build("Named", |m| {
            m.state("idle", |_| Ok(()))?;
            Ok(())
        })
        .unwrap();
        let protocol = Protocol::new(Arc::new(def), |info| info.peer.to_string())
            .with_wire_mode(WireMode::Object);

        let info = ConnectionInfo::new("10.0.0.1:4000".parse().unwrap(), Role::Server);
        let instance = protocol.instantiate(&info).unwrap();
        assert_eq!(instance.data(), "10.0.0.1:4000");
        assert_eq!(instance.current_state().as_str(), "idle");
        assert_eq!(protocol.codec().mode(), WireMode::Object);
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let peer = "127.0.0.1:1".parse().unwrap();
        let a = ConnectionInfo::new(peer, Role::Client);
        let b = ConnectionInfo::new(peer, Role::Client);
        assert_ne!(a.id, b.id);
    }
}
