//! Connection driver: runs one machine instance over one byte stream.
//!
//! The driver owns the stream, the codec, the instance and the scheduled
//! lane. All four live on a single task, so dispatch for a connection is
//! strictly sequential and never needs a lock.

use crate::error::TransportError;
use crate::lane::ScheduledLane;
use crate::protocol::{ConnectionInfo, Protocol};
use bytes::BytesMut;
use eventstate_core::{CoreError, MachineInstance};
use eventstate_protocol::Codec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::Instant;

const READ_BUFFER_SIZE: usize = 8192;

/// Counters shared by every connection of a server or client.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub messages_received: AtomicU64,
    pub messages_sent: AtomicU64,
    pub unhandled_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl TransportStats {
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn unhandled(&self) -> u64 {
        self.unhandled_total.load(Ordering::Relaxed)
    }
}

/// Runs `protocol` over `stream` until the peer hangs up, the machine asks
/// to close, the idle timeout fires, or `shutdown` is signalled.
///
/// Returns the instance's side data. Pending delayed output is dropped with
/// the driver.
pub async fn drive<D, S>(
    mut stream: S,
    info: &ConnectionInfo,
    protocol: &Protocol<D>,
    idle_timeout: Option<Duration>,
    shutdown: &mut broadcast::Receiver<()>,
    stats: &TransportStats,
) -> Result<D, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let peer = info.peer;
    tracing::debug!(
        "[{}] Running '{}' ({:?}, id={})",
        peer,
        protocol.definition().name(),
        info.role,
        info.id
    );

    let mut instance = protocol.instantiate(info)?;
    let mut codec = protocol.codec();
    let mut lane = ScheduledLane::new();
    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut last_activity = Instant::now();

    if flush(&mut stream, &codec, &mut instance, &mut lane, info, stats).await? {
        return Ok(instance.into_data());
    }

    loop {
        let deadline = lane.next_deadline();
        let idle = idle_timeout.unwrap_or(Duration::MAX);

        tokio::select! {
            biased;

            // Delayed output whose time has come
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for message in lane.pop_due(Instant::now()) {
                    instance.send(message)?;
                }
            }

            // Inbound data
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        tracing::debug!("[{}] Connection closed by peer", peer);
                        if !lane.is_empty() {
                            tracing::debug!("[{}] Dropping {} delayed messages", peer, lane.len());
                        }
                        return Ok(instance.into_data());
                    }
                    Ok(n) => {
                        tracing::trace!("[{}] Received {} bytes", peer, n);
                        codec.extend(&buf[..n]);
                        last_activity = Instant::now();
                    }
                    Err(e) => {
                        tracing::debug!("[{}] Read error: {}", peer, e);
                        return Err(TransportError::Io(e));
                    }
                }

                while let Some(message) = codec.decode_next()? {
                    stats.messages_received.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = instance.dispatch(&message) {
                        handle_dispatch_error(e, info, stats)?;
                    }
                    if flush(&mut stream, &codec, &mut instance, &mut lane, info, stats).await? {
                        return Ok(instance.into_data());
                    }
                }
            }

            // Idle timeout, only while nothing is scheduled
            _ = tokio::time::sleep(idle), if idle_timeout.is_some() && lane.is_empty() => {
                if last_activity.elapsed() >= idle {
                    tracing::debug!("[{}] Idle timeout", peer);
                    return Ok(instance.into_data());
                }
            }

            _ = shutdown.recv() => {
                tracing::debug!("[{}] Shutdown signal received", peer);
                return Ok(instance.into_data());
            }
        }

        if flush(&mut stream, &codec, &mut instance, &mut lane, info, stats).await? {
            return Ok(instance.into_data());
        }
    }
}

/// Unhandled messages and bad message names are logged and skipped; anything
/// else ends the connection.
fn handle_dispatch_error(
    error: CoreError,
    info: &ConnectionInfo,
    stats: &TransportStats,
) -> Result<(), TransportError> {
    if !error.is_recoverable() {
        return Err(error.into());
    }
    if matches!(error, CoreError::UnhandledMessage { .. }) {
        stats.unhandled_total.fetch_add(1, Ordering::Relaxed);
    }
    tracing::warn!("[{}] {} ({})", info.peer, error, error.error_code());
    Ok(())
}

/// Writes the instance's pending output and schedules its delayed output.
/// Returns true once the connection has been closed.
async fn flush<D, S>(
    stream: &mut S,
    codec: &Codec,
    instance: &mut MachineInstance<D>,
    lane: &mut ScheduledLane,
    info: &ConnectionInfo,
    stats: &TransportStats,
) -> Result<bool, TransportError>
where
    S: AsyncWrite + Unpin,
{
    let outbox = instance.take_outbox();
    if outbox.is_empty() {
        return Ok(false);
    }

    if !outbox.messages.is_empty() {
        let mut out = BytesMut::new();
        for message in &outbox.messages {
            codec.encode_into(message, &mut out)?;
        }
        tracing::trace!(
            "[{}] Writing {} messages ({} bytes)",
            info.peer,
            outbox.messages.len(),
            out.len()
        );
        stream.write_all(&out).await?;
        stats
            .messages_sent
            .fetch_add(outbox.messages.len() as u64, Ordering::Relaxed);
    }

    for (delay, message) in outbox.scheduled {
        lane.schedule(delay, message);
    }

    if outbox.close {
        tracing::debug!("[{}] Machine closed the connection", info.peer);
        stream.shutdown().await?;
        return Ok(true);
    }

    Ok(false)
}
