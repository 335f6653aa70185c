//! TCP server: accepts connections and drives one machine instance on each.

use crate::config::NetworkConfig;
use crate::connection::{drive, TransportStats};
use crate::error::TransportError;
use crate::protocol::{ConnectionInfo, Protocol, Role};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout (`None` = never).
    pub idle_timeout: Option<Duration>,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl From<&NetworkConfig> for ServerConfig {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            bind_addr: network.bind_addr,
            idle_timeout: network.idle_timeout(),
            max_connections: network.max_connections,
        }
    }
}

/// TCP server running one protocol.
pub struct Server<D> {
    config: ServerConfig,
    protocol: Protocol<D>,
    connections: Arc<DashMap<String, ConnectionInfo>>,
    stats: Arc<TransportStats>,
    shutdown: broadcast::Sender<()>,
    stopping: AtomicBool,
    running: AtomicBool,
}

impl<D: Send + 'static> Server<D> {
    /// Creates a new server.
    pub fn new(config: ServerConfig, protocol: Protocol<D>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            protocol,
            connections: Arc::new(DashMap::new()),
            stats: Arc::new(TransportStats::default()),
            shutdown: shutdown_tx,
            stopping: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> Result<TcpListener, TransportError> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Binds and serves until shutdown.
    pub async fn run(&self) -> Result<(), TransportError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accepts connections on `listener` until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), TransportError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        // A shutdown sent before the subscription above is only visible here.
        if self.stopping.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            "Serving '{}' on {} ({})",
            self.protocol.definition().name(),
            listener.local_addr()?,
            self.protocol.wire_mode()
        );

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.connections.len() >= self.config.max_connections {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            let mut conn_shutdown = match self.admit() {
                                Ok(rx) => rx,
                                Err(e) => {
                                    tracing::debug!("Rejecting {}: {}", addr, e);
                                    break;
                                }
                            };

                            let info = ConnectionInfo::new(addr, Role::Server);
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
                            self.connections.insert(info.id.clone(), info.clone());

                            let protocol = self.protocol.clone();
                            let connections = Arc::clone(&self.connections);
                            let stats = Arc::clone(&self.stats);
                            let idle_timeout = self.config.idle_timeout;

                            tokio::spawn(async move {
                                tracing::info!("Client connected: {}", addr);

                                let result = drive(
                                    tcp_stream,
                                    &info,
                                    &protocol,
                                    idle_timeout,
                                    &mut conn_shutdown,
                                    &stats,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::warn!("[{}] Connection error: {} ({})", addr, e, e.error_code());
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                connections.remove(&info.id);
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Subscribes a new connection to the shutdown signal. Fails once
    /// shutdown has started, since the broadcast may already be gone.
    fn admit(&self) -> Result<broadcast::Receiver<()>, TransportError> {
        let rx = self.shutdown.subscribe();
        if self.stopping.load(Ordering::SeqCst) {
            return Err(TransportError::ShuttingDown);
        }
        Ok(rx)
    }

    /// Initiates server shutdown; open connections are closed too.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Returns the currently open connections.
    pub fn active_connections(&self) -> Vec<ConnectionInfo> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    pub fn protocol(&self) -> &Protocol<D> {
        &self.protocol
    }
}

/// A server running on a background task.
pub struct ServerHandle<D> {
    local_addr: SocketAddr,
    server: Arc<Server<D>>,
    task: JoinHandle<Result<(), TransportError>>,
}

impl<D: Send + 'static> ServerHandle<D> {
    /// Address the server actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn server(&self) -> &Arc<Server<D>> {
        &self.server
    }

    /// Signals shutdown and waits for the accept loop to stop.
    pub async fn shutdown(self) -> Result<(), TransportError> {
        self.server.shutdown();
        self.task
            .await
            .map_err(|e| TransportError::Join(e.to_string()))?
    }
}

/// Binds `config.bind_addr` and serves `protocol` on a background task.
pub async fn start_server<D: Send + 'static>(
    config: ServerConfig,
    protocol: Protocol<D>,
) -> Result<ServerHandle<D>, TransportError> {
    let server = Arc::new(Server::new(config, protocol));
    let listener = server.bind().await?;
    let local_addr = listener.local_addr()?;

    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    Ok(ServerHandle {
        local_addr,
        server,
        task,
    })
}
