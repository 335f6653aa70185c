//! Machine engine benchmarks: building definitions and dispatching messages.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use eventstate::echo::{self, EchoClientData};
use eventstate_core::{MachineDefinition, MachineInstance, Message};
use std::sync::Arc;

/// A ring of `n` states, each passing `tick` to the next.
fn ring(n: usize) -> MachineDefinition<u64> {
    MachineDefinition::<u64>::build("Bench::Ring", |m| {
        for i in 0..n {
            let next = format!("s{}", (i + 1) % n);
            m.state(format!("s{}", i), |m| {
                m.on_enter(|ctx| *ctx.data_mut() += 1)?;
                m.on_recv("tick", next)?;
                Ok(())
            })?;
        }
        Ok(())
    })
    .unwrap()
}

fn bench_build_definition(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_definition");

    for size in [4, 64, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(ring(size)));
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    for size in [4, 64, 512] {
        let def = Arc::new(ring(size));
        let tick = Message::new("Bench::Tick", serde_json::Value::Null);

        group.bench_with_input(BenchmarkId::from_parameter(size), &def, |b, def| {
            let mut instance = MachineInstance::new(Arc::clone(def), 0).unwrap();
            b.iter(|| {
                instance.dispatch(black_box(&tick)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_echo_roundtrip(c: &mut Criterion) {
    let server_def = Arc::new(echo::echo_server().unwrap());
    let client_def = Arc::new(echo::echo_client().unwrap());

    c.bench_function("echo_roundtrip", |b| {
        b.iter(|| {
            let mut server = MachineInstance::new(Arc::clone(&server_def), ()).unwrap();
            let mut client = MachineInstance::new(
                Arc::clone(&client_def),
                EchoClientData::new(["foo", "bar", "baz"]),
            )
            .unwrap();

            while !client.close_requested() {
                for message in client.take_outbox().messages {
                    server.dispatch(&message).unwrap();
                }
                for message in server.take_outbox().messages {
                    client.dispatch(&message).unwrap();
                }
            }
            black_box(client.into_data())
        });
    });
}

fn bench_to_dot(c: &mut Criterion) {
    let def = ring(64);
    c.bench_function("to_dot_ring_64", |b| {
        b.iter(|| black_box(def.to_dot(None, &["rankdir=LR;"])));
    });

    let client = echo::echo_client().unwrap();
    c.bench_function("to_dot_echo_client", |b| {
        b.iter(|| black_box(client.to_dot(Some("listening"), &[])));
    });
}

criterion_group!(
    benches,
    bench_build_definition,
    bench_dispatch,
    bench_echo_roundtrip,
    bench_to_dot
);
criterion_main!(benches);
