//! End-to-end runs of the echo machines over TCP.

use eventstate::echo::{self, EchoLog};
use eventstate::{connect, start_server, ConnectConfig, Protocol, ServerConfig, WireMode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

fn noises() -> Vec<String> {
    vec!["foo".into(), "bar".into(), "baz".into()]
}

async fn run_server_and_client<D: Send + 'static>(
    server_protocol: Protocol<D>,
    wire: WireMode,
) -> Vec<String> {
    let server = start_server(ServerConfig::new("127.0.0.1:0".parse().unwrap()), server_protocol)
        .await
        .unwrap();

    let client_protocol = echo::echo_client_protocol(wire, noises()).unwrap();
    let client = connect(ConnectConfig::new(server.local_addr()), client_protocol)
        .await
        .unwrap();
    let data = client.wait().await.unwrap();

    server.shutdown().await.unwrap();
    data.recorder
}

fn expected_log() -> Vec<String> {
    let mut log = vec!["entering listening state".to_string()];
    for noise in ["foo", "bar", "baz"] {
        log.push("exiting listening state".into());
        log.push(format!("echoing {}", noise));
        log.push("exiting echoing state".into());
        log.push("entering listening state".into());
    }
    log
}

#[tokio::test]
async fn test_echo_basic() {
    let recorder = run_server_and_client(
        echo::echo_server_protocol(WireMode::Line).unwrap(),
        WireMode::Line,
    )
    .await;
    assert_eq!(recorder, vec!["foo", "bar", "baz"]);
}

#[tokio::test]
async fn test_delayed_echo() {
    let delay = Duration::from_millis(100);
    let started = Instant::now();
    let recorder = run_server_and_client(
        echo::delayed_echo_server_protocol(WireMode::Line, delay).unwrap(),
        WireMode::Line,
    )
    .await;

    assert_eq!(recorder, vec!["foo", "bar", "baz"]);
    assert!(started.elapsed() >= delay * 3);
}

#[tokio::test]
async fn test_delayed_echo_keeps_pipelined_order() {
    let delay = Duration::from_millis(100);
    let server = start_server(
        ServerConfig::new("127.0.0.1:0".parse().unwrap()),
        echo::delayed_echo_server_protocol(WireMode::Line, delay).unwrap(),
    )
    .await
    .unwrap();

    let stream = TcpStream::connect(server.local_addr()).await.unwrap();
    let (read, mut write) = stream.into_split();
    write.write_all(b"foo\nbar\nbaz\n").await.unwrap();

    let mut lines = BufReader::new(read).lines();
    let mut echoed = Vec::new();
    for _ in 0..3 {
        echoed.push(lines.next_line().await.unwrap().unwrap());
    }
    assert_eq!(echoed, vec!["foo", "bar", "baz"]);

    drop(write);
    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_echo_with_event_state_client() {
    let log = EchoLog::default();
    let recorder = run_server_and_client(
        echo::logging_echo_server_protocol(WireMode::Line, Arc::clone(&log)).unwrap(),
        WireMode::Line,
    )
    .await;

    assert_eq!(recorder, vec!["foo", "bar", "baz"]);
    assert_eq!(*log.lock(), expected_log());
}

#[tokio::test]
async fn test_echo_with_object_protocol_client() {
    let log = EchoLog::default();
    let recorder = run_server_and_client(
        echo::logging_echo_server_protocol(WireMode::Object, Arc::clone(&log)).unwrap(),
        WireMode::Object,
    )
    .await;

    assert_eq!(recorder, vec!["foo", "bar", "baz"]);
    assert_eq!(*log.lock(), expected_log());
}

#[tokio::test]
async fn test_concurrent_clients_are_independent() {
    let server = start_server(
        ServerConfig::new("127.0.0.1:0".parse().unwrap()),
        echo::echo_server_protocol(WireMode::Object).unwrap(),
    )
    .await
    .unwrap();

    let mut clients = Vec::new();
    for i in 0..4 {
        let words: Vec<String> = (0..5).map(|j| format!("c{}-{}", i, j)).collect();
        let protocol = echo::echo_client_protocol(WireMode::Object, words.clone()).unwrap();
        let client = connect(ConnectConfig::new(server.local_addr()), protocol)
            .await
            .unwrap();
        clients.push((client, words));
    }

    for (client, words) in clients {
        assert_eq!(client.wait().await.unwrap().recorder, words);
    }

    server.shutdown().await.unwrap();
}

#[test]
fn test_print_state_machine_dot() {
    let dot = echo::echo_client().unwrap().to_dot(None, &["rankdir=LR;"]);
    assert_eq!(
        dot,
        "digraph \"eventstate::echo::EchoClient\" {\n\
         \x20 rankdir=LR;\n\
         \x20 speaking [peripheries=2];\n\
         \x20 speaking -> listening [color=red,label=\"echo_message\"];\n\
         \x20 listening -> speaking [color=blue,label=\"echo_message\"];\n\
         }\n"
    );
}
