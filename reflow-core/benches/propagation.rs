//! Benchmarks for change propagation
//!
//! Run with: cargo bench -p reflow-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reflow_core::{args, Failure, Reactive, Runtime, Signature, Value, Wrapped};
use std::hint::black_box;
use tokio::task::LocalSet;

fn step() -> Reactive {
    Reactive::sync("step", Signature::of(["x"]), |call| {
        Ok::<_, Failure>(Value::new(call.get::<u64>("x")? + 1))
    })
}

fn executor() -> (tokio::runtime::Runtime, LocalSet) {
    let tokio = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");
    (tokio, LocalSet::new())
}

/// A single chain `source -> step -> step -> ...`.
fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/chain");
    let (tokio, local) = executor();

    for depth in [1, 10, 100] {
        let runtime = Runtime::new();
        let source = runtime.cell(0u64);
        let step = step();
        let mut tail: Wrapped = source.as_wrapped();
        for _ in 0..depth {
            tail = step.call(&runtime, args![&tail]).expect("chain node");
        }

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, _| {
            b.iter(|| {
                n += 1;
                let value = n;
                local.block_on(&tokio, async {
                    source.set(value);
                    runtime.settle().await;
                });
                black_box(tail.inner())
            })
        });
    }

    group.finish();
}

/// Many independent nodes observing one cell.
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/fan_out");
    let (tokio, local) = executor();

    for width in [10, 100, 1000] {
        let runtime = Runtime::new();
        let source = runtime.cell(0u64);
        let step = step();
        let nodes: Vec<Wrapped> = (0..width)
            .map(|_| step.call(&runtime, args![&source]).expect("fan-out node"))
            .collect();

        let mut n = 0u64;
        group.bench_with_input(BenchmarkId::new("width", width), &width, |b, _| {
            b.iter(|| {
                n += 1;
                let value = n;
                local.block_on(&tokio, async {
                    source.set(value);
                    runtime.settle().await;
                });
                black_box(nodes.len())
            })
        });
    }

    group.finish();
}

/// A burst of writes to the inputs of one node, coalesced into one update.
fn bench_batch(c: &mut Criterion) {
    let (tokio, local) = executor();
    let runtime = Runtime::new();
    let a = runtime.cell(0u64);
    let b = runtime.cell(0u64);
    let add = Reactive::sync("add", Signature::of(["a", "b"]), |call| {
        Ok::<_, Failure>(Value::new(call.get::<u64>("a")? + call.get::<u64>("b")?))
    });
    let sum = add.call(&runtime, args![&a, &b]).expect("sum node");

    let mut n = 0u64;
    c.bench_function("propagation/batch_of_16", |bencher| {
        bencher.iter(|| {
            let start = n;
            n += 8;
            local.block_on(&tokio, async {
                for value in start + 1..=start + 8 {
                    a.set(value);
                    b.set(value);
                }
                runtime.settle().await;
            });
            black_box(sum.inner())
        })
    });
}

criterion_group!(benches, bench_chain, bench_fan_out, bench_batch);
criterion_main!(benches);
