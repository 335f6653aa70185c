//! Server and client talking over real sockets.

use eventstate_core::{MachineDefinition, Message};
use eventstate_protocol::WireMode;
use eventstate_transport::{connect, start_server, ConnectConfig, Protocol, ServerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const PING: &str = "Net::Ping";

/// Answers every ping with the same text.
fn ponger() -> Protocol<()> {
    let def = MachineDefinition::<()>::build("Net::Ponger", |m| {
        m.state("ready", |m| {
            m.on_recv_with("ping", "ready", |ctx| {
                if let Some(reply) = ctx.message().cloned() {
                    ctx.send(reply);
                }
            })?;
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    Protocol::new(Arc::new(def), |_| ()).with_line_type(PING)
}

/// Sends `count` pings one at a time, then closes.
fn pinger(count: usize, wire: WireMode) -> Protocol<Vec<String>> {
    let def = MachineDefinition::<Vec<String>>::build("Net::Pinger", |m| {
        m.state("pinging", |m| {
            m.on_enter(move |ctx| {
                let sent = ctx.data().len();
                if sent < count {
                    ctx.send(Message::text(PING, format!("ping-{}", sent)));
                } else {
                    ctx.close();
                }
            })?;
            m.on_send("ping", "waiting")?;
            Ok(())
        })?;
        m.state("waiting", |m| {
            m.on_recv_with("ping", "pinging", |_| {})?;
            m.on_exit(|ctx| {
                if let Some(text) = ctx.message().and_then(|msg| msg.as_text()) {
                    let text = text.to_string();
                    ctx.data_mut().push(text);
                }
            })?;
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    Protocol::new(Arc::new(def), |_| Vec::new())
        .with_wire_mode(wire)
        .with_line_type(PING)
}

#[tokio::test]
async fn test_ping_pong_line() {
    let server = start_server(ServerConfig::new("127.0.0.1:0".parse().unwrap()), ponger())
        .await
        .unwrap();

    let client = connect(ConnectConfig::new(server.local_addr()), pinger(3, WireMode::Line))
        .await
        .unwrap();
    let replies = client.wait().await.unwrap();
    assert_eq!(replies, vec!["ping-0", "ping-1", "ping-2"]);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ping_pong_object() {
    let server = start_server(
        ServerConfig::new("127.0.0.1:0".parse().unwrap()),
        ponger().with_wire_mode(WireMode::Object),
    )
    .await
    .unwrap();

    let client = connect(ConnectConfig::new(server.local_addr()), pinger(2, WireMode::Object))
        .await
        .unwrap();
    assert_eq!(client.info().role, eventstate_transport::Role::Client);
    let replies = client.wait().await.unwrap();
    assert_eq!(replies, vec!["ping-0", "ping-1"]);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unhandled_message_keeps_connection_open() {
    let def = MachineDefinition::<Arc<Mutex<u32>>>::build("Net::Picky", |m| {
        m.state("ready", |m| {
            m.on_recv_with("ping", "ready", |ctx| {
                *ctx.data().lock() += 1;
                ctx.send(Message::text(PING, "pong"));
            })?;
            Ok(())
        })?;
        Ok(())
    })
    .unwrap();
    let count = Arc::new(Mutex::new(0));
    let shared = Arc::clone(&count);
    // Line messages are all typed as pings; a different line type makes them unhandled.
    let picky = Protocol::new(Arc::new(def), move |_| Arc::clone(&shared)).with_line_type("Net::Other");

    let server = start_server(ServerConfig::new("127.0.0.1:0".parse().unwrap()), picky)
        .await
        .unwrap();

    let mut stream = TcpStream::connect(server.local_addr()).await.unwrap();
    stream.write_all(b"hello\nagain\n").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(server.server().active_connections().len(), 1);
    assert_eq!(server.server().stats().unhandled(), 2);
    assert_eq!(*count.lock(), 0);

    drop(stream);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_raw_line_client() {
    let server = start_server(ServerConfig::new("127.0.0.1:0".parse().unwrap()), ponger())
        .await
        .unwrap();

    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write.write_all(b"one\r\ntwo\n").await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "one");
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "two");

    server.shutdown().await.unwrap();
}
