//! TCP client: connects out and drives one machine instance on the socket.

use crate::connection::{drive, TransportStats};
use crate::error::TransportError;
use crate::protocol::{ConnectionInfo, Protocol, Role};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Client connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server address.
    pub addr: SocketAddr,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Idle timeout once connected (`None` = never).
    pub idle_timeout: Option<Duration>,
}

impl ConnectConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// A running client connection.
pub struct ClientHandle<D> {
    info: ConnectionInfo,
    stats: Arc<TransportStats>,
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<D, TransportError>>,
}

impl<D> ClientHandle<D> {
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Asks the connection to close; `wait` then returns the side data.
    pub fn close(&self) {
        let _ = self.shutdown.send(());
    }

    /// Waits for the connection to end and returns the instance's side data.
    pub async fn wait(self) -> Result<D, TransportError> {
        let ClientHandle { task, shutdown, .. } = self;
        let result = task
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?;
        drop(shutdown);
        result
    }
}

/// Connects to `config.addr` and runs `protocol` on a background task.
pub async fn connect<D: Send + 'static>(
    config: ConnectConfig,
    protocol: Protocol<D>,
) -> Result<ClientHandle<D>, TransportError> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
        .await
        .map_err(|_| TransportError::Timeout)??;
    stream.set_nodelay(true)?;

    let info = ConnectionInfo::new(stream.peer_addr()?, Role::Client);
    tracing::info!(
        "[{}] Connected, running '{}'",
        info.peer,
        protocol.definition().name()
    );

    let stats = Arc::new(TransportStats::default());
    stats.connections_total.fetch_add(1, Ordering::Relaxed);
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

    let task = {
        let info = info.clone();
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let result = drive(
                stream,
                &info,
                &protocol,
                config.idle_timeout,
                &mut shutdown_rx,
                &stats,
            )
            .await;
            if let Err(ref e) = result {
                tracing::warn!("[{}] Connection error: {} ({})", info.peer, e, e.error_code());
                stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!("[{}] Disconnected", info.peer);
            result
        })
    };

    Ok(ClientHandle {
        info,
        stats,
        shutdown: shutdown_tx,
        task,
    })
}
